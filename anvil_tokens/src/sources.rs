//! Token sources

use async_trait::async_trait;

use crate::{AccessToken, AuthenticationError, IdentityHintRef, LocalToken, LocalTokenError};

#[cfg(feature = "command")]
mod command;
pub mod exchange;

#[cfg(feature = "command")]
#[cfg_attr(docsrs, doc(cfg(feature = "command")))]
pub use command::CommandTokenSource;

/// A source of short-lived identity tokens from the local trust agent
#[async_trait]
pub trait LocalTokenSource: Send + Sync {
    /// Requests an identity token, optionally for the principal named by `identity_hint`
    async fn fetch_local_token(
        &self,
        identity_hint: Option<&IdentityHintRef>,
    ) -> Result<LocalToken, LocalTokenError>;
}

/// A source of downstream access tokens
///
/// Every call derives a fresh token; sources do not cache.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Derives a new access token
    async fn derive_credential(&self) -> Result<AccessToken, AuthenticationError>;
}

/// A local token source that always returns the same token
#[derive(Clone, Debug)]
pub struct ConstLocalTokenSource {
    token: LocalToken,
}

impl ConstLocalTokenSource {
    /// Constructs a new source from a token
    pub fn new(token: impl Into<LocalToken>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl LocalTokenSource for ConstLocalTokenSource {
    async fn fetch_local_token(
        &self,
        _: Option<&IdentityHintRef>,
    ) -> Result<LocalToken, LocalTokenError> {
        if self.token.as_str().is_empty() {
            return Err(LocalTokenError::Empty);
        }

        Ok(self.token.clone())
    }
}
