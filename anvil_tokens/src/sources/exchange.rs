//! A token source that exchanges a local identity token with a remote endpoint

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;

use super::{CredentialSource, LocalTokenSource};
use crate::{
    clock::{Clock, System},
    AccessToken, AuthenticationError, DeriveError, ExchangeEndpoint, ExchangedToken,
    IdentityHint, LocalTokenRef,
};

mod dto;

/// A credential source that exchanges an identity token from the local trust agent
/// for a downstream access token
///
/// Each exchange runs two steps:
///
/// 1. ask the [`LocalTokenSource`] for an identity token, scoped to the identity hint
///    if one is configured;
/// 2. `GET` the exchange endpoint with that identity token as a bearer credential,
///    expecting `200 OK` and a JSON body with a non-empty `token` and a future-dated
///    `expires_at` timestamp.
///
/// A failure at either step is reported as an [`AuthenticationError`].
#[derive(Debug)]
pub struct TokenExchangeSource<L, C = System> {
    client: reqwest::Client,
    endpoint: ExchangeEndpoint,
    identity_hint: Option<IdentityHint>,
    local_source: L,
    clock: C,
}

impl<L> TokenExchangeSource<L, System> {
    /// Constructs a new exchange source using a default HTTP client and the system clock
    pub fn new(endpoint: ExchangeEndpoint, local_source: L) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            identity_hint: None,
            local_source,
            clock: System,
        }
    }
}

impl<L, C> TokenExchangeSource<L, C> {
    /// Requests local identity tokens for a specific principal
    pub fn with_identity_hint(mut self, identity_hint: impl Into<IdentityHint>) -> Self {
        self.identity_hint = Some(identity_hint.into());
        self
    }

    /// Sets the HTTP client used to call the exchange endpoint
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Sets a custom clock to be used
    ///
    /// Useful for testing purposes
    pub fn with_clock<D>(self, clock: D) -> TokenExchangeSource<L, D> {
        TokenExchangeSource {
            client: self.client,
            endpoint: self.endpoint,
            identity_hint: self.identity_hint,
            local_source: self.local_source,
            clock,
        }
    }

    /// The endpoint tokens are exchanged with
    #[inline]
    pub fn endpoint(&self) -> &ExchangeEndpoint {
        &self.endpoint
    }

    /// The identity hint passed to the local token source, if any
    #[inline]
    pub fn identity_hint(&self) -> Option<&IdentityHint> {
        self.identity_hint.as_ref()
    }
}

impl<L: LocalTokenSource, C: Clock> TokenExchangeSource<L, C> {
    /// Performs both steps of the exchange, returning the validated token
    #[tracing::instrument(
        err(Debug),
        skip(self),
        fields(
            endpoint = %self.endpoint,
            identity_hint = self.identity_hint.as_ref().map(|h| h.as_str()),
        ),
    )]
    pub async fn exchange(&self) -> Result<ExchangedToken, AuthenticationError> {
        self.try_exchange()
            .await
            .map_err(|error| AuthenticationError::new(self.endpoint.clone(), error))
    }

    async fn try_exchange(&self) -> Result<ExchangedToken, DeriveError> {
        let local_token = self
            .local_source
            .fetch_local_token(self.identity_hint.as_deref())
            .await?;

        let body = self.request_exchange(&local_token).await?;
        let resp: dto::ExchangeResponse = serde_json::from_slice(&body)?;

        let now = self.clock.now();
        let token = ExchangedToken::validate(&resp.token, &resp.expires_at, now)?;

        tracing::info!(
            expires_at = %token.expires_at(),
            expires_in_secs = token.until_expired_at(now).num_seconds(),
            "received new access token"
        );

        Ok(token)
    }

    async fn request_exchange(&self, local_token: &LocalTokenRef) -> Result<Bytes, DeriveError> {
        tracing::trace!("requesting token from exchange endpoint");

        let resp = self
            .client
            .get(self.endpoint.as_url().clone())
            .bearer_auth(local_token.as_str())
            .send()
            .await
            .map_err(DeriveError::RequestSend)?;

        tracing::debug!(
            response.status = resp.status().as_u16(),
            "received response from token exchange endpoint"
        );

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.map_err(DeriveError::BodyRead)?;
            return Err(DeriveError::UnexpectedStatus { status, body });
        }

        resp.bytes().await.map_err(DeriveError::BodyRead)
    }
}

#[async_trait]
impl<L, C> CredentialSource for TokenExchangeSource<L, C>
where
    L: LocalTokenSource,
    C: Clock + Send + Sync,
{
    async fn derive_credential(&self) -> Result<AccessToken, AuthenticationError> {
        self.exchange().await.map(ExchangedToken::into_access_token)
    }
}
