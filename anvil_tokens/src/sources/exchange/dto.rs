//! DTOs for interacting with token exchange endpoints

use serde::Deserialize;

/// The body of a successful token exchange
///
/// Both fields are validated by [`ExchangedToken::validate`][crate::ExchangedToken::validate]
/// rather than at deserialization so that an empty or missing value is reported as such.
#[derive(Debug, Deserialize)]
pub(super) struct ExchangeResponse {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub expires_at: String,
}
