//! End-to-end tests of the data client against a mock portal.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use ovolink_api::{reduce_hourly, reduce_interval, ApiEndpoints, OvoApiClient};
use ovolink_core::{AccountId, CredentialSet, HourlySeriesKind};
use ovolink_fetch::{
    AuthEndpoints, AuthGuard, AuthTransport, CredentialAcquirer, ErrorKind, FetchError, HttpClient,
    TokenStore,
};

fn id_token() -> String {
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#),
        URL_SAFE_NO_PAD.encode(br#"{"email":"me@example.com"}"#)
    )
}

fn client(server: &mockito::Server, credentials: CredentialSet) -> OvoApiClient {
    let http = HttpClient::new().unwrap();
    let transport = AuthTransport::new(http.clone(), AuthEndpoints::with_base_url(&server.url()));
    let guard = AuthGuard::new(
        CredentialAcquirer::new(transport),
        TokenStore::with_credentials(credentials),
    );
    OvoApiClient::with_endpoints(http, Arc::new(guard), ApiEndpoints::with_base_url(&server.url()))
}

#[tokio::test]
async fn test_expired_token_is_refreshed_before_fetch() {
    let mut server = mockito::Server::new_async().await;
    let refresh = server
        .mock("POST", "/oauth/token")
        .match_body(mockito::Matcher::PartialJsonString(
            r#"{"grant_type":"refresh_token","refresh_token":"old-refresh"}"#.to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"access_token":"fresh","id_token":"{}","expires_in":3600}}"#,
            id_token()
        ))
        .create_async()
        .await;
    let data = server
        .mock("POST", "/graphql")
        .match_header("authorization", "Bearer fresh")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"data":{"GetIntervalData":{
                "daily":{"solar":[{"periodFrom":"2024-03-01","consumption":12.5,"charge":{"value":0,"type":"DEBIT"}}],
                         "export":[{"periodFrom":"2024-03-01","consumption":3,"charge":{"value":0.9,"type":"DEBIT"}}]},
                "monthly":{"solar":[],"export":[]},
                "yearly":{"solar":[],"export":[]}}}}"#,
        )
        .create_async()
        .await;

    let expired = CredentialSet::new(
        "stale",
        id_token(),
        Some("old-refresh".into()),
        Utc::now() - Duration::minutes(1),
    );
    let api = client(&server, expired);

    let interval = api.fetch_interval_data(&AccountId::new("42")).await.unwrap();
    let (daily, monthly, _) = reduce_interval(&interval);
    assert!((daily.solar_consumption - 12.5).abs() < f64::EPSILON);
    assert!((daily.grid_consumption - 3.0).abs() < f64::EPSILON);
    assert!(monthly.is_empty());

    let held = api.guard().credentials().await.unwrap();
    assert_eq!(held.access_token, "fresh");
    assert_eq!(held.refresh_token.as_deref(), Some("old-refresh"));

    refresh.assert_async().await;
    data.assert_async().await;
}

#[tokio::test]
async fn test_unauthorized_data_call_is_auth_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/graphql")
        .with_status(401)
        .with_body("unauthorized")
        .create_async()
        .await;

    let api = client(
        &server,
        CredentialSet::new("a", id_token(), None, Utc::now() + Duration::hours(1)),
    );
    let err = api.fetch_interval_data(&AccountId::new("42")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
}

#[tokio::test]
async fn test_server_error_is_communication_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/graphql")
        .with_status(502)
        .with_body("bad gateway")
        .create_async()
        .await;

    let api = client(
        &server,
        CredentialSet::new("a", id_token(), None, Utc::now() + Duration::hours(1)),
    );
    let err = api.test_connection(&AccountId::new("42")).await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 502, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_hourly_batch_split() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/graphql")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"data":{"GetHourlyData":{
                "solar":[{"periodFrom":"2024-03-01T10:00:00Z","consumption":1.5}],
                "export":[
                    {"periodFrom":"2024-03-01T10:00:00Z","consumption":0.4,"charge":{"value":0.1,"type":"CREDIT"}},
                    {"periodFrom":"2024-03-01T11:00:00Z","consumption":null,"charge":{"value":0.2,"type":"OFF_PEAK"}}
                ]}}}"#,
        )
        .create_async()
        .await;

    let api = client(
        &server,
        CredentialSet::new("a", id_token(), None, Utc::now() + Duration::hours(1)),
    );
    let today = Utc::now().date_naive();
    let hourly = api
        .fetch_hourly_data(&AccountId::new("42"), today - Duration::days(7), today)
        .await
        .unwrap();
    let series = reduce_hourly(&hourly);

    assert_eq!(series.count(HourlySeriesKind::ReturnToGrid), 1);
    assert_eq!(series.count(HourlySeriesKind::Grid), 1);
    assert!(series.grid_total.abs() < f64::EPSILON);
    assert!((series.return_to_grid_total - 0.4).abs() < f64::EPSILON);
}
