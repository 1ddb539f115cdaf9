//! GraphQL operations of the customer portal.

/// Operation name of the contact/account lookup.
pub const GET_CONTACT_INFO: &str = "GetContactInfo";

/// Operation name of the daily/monthly/yearly usage query.
pub const GET_INTERVAL_DATA: &str = "GetIntervalData";

/// Operation name of the hourly usage query.
pub const GET_HOURLY_DATA: &str = "GetHourlyData";

/// Account lookup by account-holder e-mail.
pub const GET_CONTACT_INFO_QUERY: &str = r"
query GetContactInfo($input: GetContactInfoInput!) {
  GetContactInfo(input: $input) {
    accounts {
      id
      number
      customerId
      customerOrientatedBalance
      closed
      system
      hasSolar
      supplyAddress {
        buildingName
        buildingName2
        lotNumber
        flatType
        flatNumber
        floorType
        floorNumber
        houseNumber
        houseNumber2
        houseSuffix
        houseSuffix2
        streetSuffix
        streetName
        streetType
        suburb
        state
        postcode
        countryCode
        country
        addressType
        __typename
      }
      __typename
    }
    __typename
  }
}
";

/// Shared selection of solar and export entries.
macro_rules! usage_fragment {
    () => {
        r"
fragment UsageV2DataParts on UsageV2Data {
  solar {
    periodFrom
    periodTo
    consumption
    readType
    charge {
      value
      type
      __typename
    }
    __typename
  }
  export {
    periodFrom
    periodTo
    consumption
    readType
    charge {
      value
      type
      __typename
    }
    __typename
  }
  __typename
}
"
    };
}

/// Daily, monthly and yearly usage of one account.
pub const GET_INTERVAL_DATA_QUERY: &str = concat!(
    r"
query GetIntervalData($input: GetIntervalDataInput!) {
  GetIntervalData(input: $input) {
    daily {
      ...UsageV2DataParts
      __typename
    }
    monthly {
      ...UsageV2DataParts
      __typename
    }
    yearly {
      ...UsageV2DataParts
      __typename
    }
    __typename
  }
}
",
    usage_fragment!()
);

/// Hourly usage of one account over a date range.
pub const GET_HOURLY_DATA_QUERY: &str = concat!(
    r"
query GetHourlyData($input: GetHourlyDataInput!) {
  GetHourlyData(input: $input) {
    ...UsageV2DataParts
    __typename
  }
}
",
    usage_fragment!()
);
