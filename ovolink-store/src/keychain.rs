//! Account password storage in the system keychain.
//!
//! Used only when the user opts in, so the scripted login can run again
//! unattended after the refresh token is rejected.
//!
//! - macOS: Keychain Services
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring, KDE Wallet)
//!
//! ## Usage
//!
//! ```ignore
//! use ovolink_store::keychain;
//!
//! keychain::store_password("me@example.com", &password)?;
//! if let Some(password) = keychain::get_password("me@example.com") {
//!     acquirer.password_login("me@example.com", &password).await?;
//! }
//! ```

use keyring::Entry;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Keychain service name.
pub const SERVICE: &str = "ovolink";

fn entry(username: &str) -> Result<Entry, StoreError> {
    Entry::new(SERVICE, username)
        .map_err(|e| StoreError::Keychain(format!("Failed to create keychain entry: {e}")))
}

/// Stores the password of `username`.
///
/// # Errors
///
/// `StoreError::Keychain` if the keychain is unavailable.
pub fn store_password(username: &str, password: &str) -> Result<(), StoreError> {
    entry(username)?
        .set_password(password)
        .map_err(|e| StoreError::Keychain(format!("Failed to store password: {e}")))?;
    debug!(username, "Password stored in keychain");
    Ok(())
}

/// Reads the password of `username`; `None` if absent or empty.
pub fn get_password(username: &str) -> Option<String> {
    let entry = entry(username).ok()?;
    match entry.get_password() {
        Ok(password) if !password.is_empty() => Some(password),
        Ok(_) | Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(username, error = %e, "Keychain read failed");
            None
        }
    }
}

/// Deletes the password of `username`; a missing entry is not an error.
///
/// # Errors
///
/// `StoreError::Keychain` for any other failure.
pub fn delete_password(username: &str) -> Result<(), StoreError> {
    match entry(username)?.delete_credential() {
        Ok(()) => {
            debug!(username, "Password deleted from keychain");
            Ok(())
        }
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(StoreError::Keychain(format!("Failed to delete password: {e}"))),
    }
}
