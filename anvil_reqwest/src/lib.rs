//! Middleware to authenticate outgoing requests with a refreshable bearer token
//!
//! When using [`ClientWithMiddleware`](reqwest_middleware::ClientWithMiddleware),
//! include the [`TokenRefreshAuthenticator`] in the middleware stack to attach a
//! downstream access token to each outbound request. The token is derived on first use
//! from a [`CredentialSource`], typically a
//! [`TokenExchangeSource`](anvil_tokens::sources::exchange::TokenExchangeSource), and kept
//! until a service rejects it.
//!
//! If the service responds with `401 Unauthorized` or `403 Forbidden`, the authenticator
//! discards its token, derives a new one, and resends the request exactly once. The
//! response to the resent request is returned whatever its status, and the rejected
//! response is recorded in its [retry history](ResponseHistoryExt::retry_history).
//!
//! ```
//! use anvil_reqwest::TokenRefreshAuthenticator;
//! use anvil_tokens::{sources, ExchangeEndpoint};
//! use reqwest::Client;
//! use reqwest_middleware::ClientBuilder;
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() {
//! let token_source = sources::exchange::TokenExchangeSource::new(
//!     ExchangeEndpoint::production(),
//!     sources::CommandTokenSource::gcloud(),
//! );
//!
//! let client = ClientBuilder::new(Client::default())
//!     .with(TokenRefreshAuthenticator::new(token_source))
//!     .build();
//!
//! let req = client
//!     .get("https://gen3.theanvil.io/api/v0/submission/");
//! # async move { req
//!     .send()
//!     .await
//!     .unwrap();
//! # };
//! # }
//! ```
//!
//! By default every request passing through the middleware is authenticated. The
//! middleware can also be configured to authenticate only some requests, which is
//! useful when one middleware stack talks to several backends. Requests that are not
//! authenticated are passed along untouched and are never retried.
//!
//! ```
//! use anvil_reqwest::{ExactHostMatch, HttpsOnly, TokenRefreshAuthenticator};
//! use predicates::prelude::PredicateBooleanExt;
//! # use anvil_tokens::{sources, ExchangeEndpoint};
//! # let token_source = sources::exchange::TokenExchangeSource::new(
//! #     ExchangeEndpoint::production(),
//! #     sources::CommandTokenSource::gcloud(),
//! # );
//!
//! TokenRefreshAuthenticator::new(token_source)
//!     .with_predicate(HttpsOnly.and(ExactHostMatch::new("gen3.theanvil.io")));
//! ```
//!
//! A single authenticator may be shared between tasks. Its token and the derivation of a
//! new one are guarded by one lock, so concurrent requests that find no token wait for a
//! single derivation instead of each performing their own.

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

use std::fmt;

use anvil_tokens::{
    sources::{exchange::TokenExchangeSource, CommandTokenSource, CredentialSource},
    AccessToken, AccessTokenRef, AuthenticationError, ConfigurationError, ExchangeEndpoint,
    IdentityHint,
};
use bytes::{BufMut, Bytes, BytesMut};
use http::Extensions;
use predicates::{constant::BooleanPredicate, prelude::*, reflection};
use reqwest::{header, Request, Response, StatusCode, Url, Version};
use reqwest_middleware::{Error, Middleware, Next};
use tokio::sync::Mutex;

/// A middleware that authenticates outgoing requests, refreshing its token when a
/// request is rejected
#[derive(Debug)]
pub struct TokenRefreshAuthenticator<S, P = BooleanPredicate> {
    source: S,
    credential: Mutex<Option<AccessToken>>,
    predicate: P,
}

impl<S> TokenRefreshAuthenticator<S, BooleanPredicate> {
    /// Construct a new authenticator from a credential source
    ///
    /// No token is derived until the first request is sent. By default, every request
    /// is authenticated. To change this behavior, provide a custom predicate with
    /// [`with_predicate()`][Self::with_predicate()].
    pub fn new(source: S) -> Self {
        Self {
            source,
            credential: Mutex::new(None),
            predicate: predicate::always(),
        }
    }
}

impl TokenRefreshAuthenticator<TokenExchangeSource<CommandTokenSource>, BooleanPredicate> {
    /// Construct an authenticator that exchanges tokens from the local `gcloud`
    /// installation with the given endpoint
    ///
    /// `identity_hint` selects the `gcloud` account to use when more than one is
    /// signed in. Fails if `endpoint` is blank or not an absolute URL.
    pub fn from_endpoint(
        endpoint: &str,
        identity_hint: Option<IdentityHint>,
    ) -> Result<Self, ConfigurationError> {
        let source = TokenExchangeSource::new(
            ExchangeEndpoint::parse(endpoint)?,
            CommandTokenSource::gcloud(),
        );

        let source = match identity_hint {
            Some(hint) => source.with_identity_hint(hint),
            None => source,
        };

        Ok(Self::new(source))
    }
}

impl<S, P> TokenRefreshAuthenticator<S, P> {
    /// Replaces the default predicate with a custom predicate
    pub fn with_predicate<Q>(self, predicate: Q) -> TokenRefreshAuthenticator<S, Q> {
        TokenRefreshAuthenticator {
            source: self.source,
            credential: self.credential,
            predicate,
        }
    }

    /// The source used to derive new tokens
    #[inline]
    pub fn credential_source(&self) -> &S {
        &self.source
    }

    /// Whether a token is currently held
    pub async fn has_credential(&self) -> bool {
        self.credential.lock().await.is_some()
    }
}

impl<S: CredentialSource, P> TokenRefreshAuthenticator<S, P> {
    /// Gets the current token, deriving one if none is held
    pub async fn current_token(&self) -> Result<AccessToken, AuthenticationError> {
        let mut credential = self.credential.lock().await;
        if let Some(token) = &*credential {
            return Ok(token.clone());
        }

        tracing::debug!("no access token held, deriving a new one");
        let token = self.source.derive_credential().await?;
        *credential = Some(token.clone());
        Ok(token)
    }

    /// Discards `rejected` and derives a new token
    ///
    /// If the held token has already been replaced since `rejected` was handed out,
    /// the replacement is returned without deriving again. If derivation fails, no
    /// token is held afterwards.
    async fn refresh_token(
        &self,
        rejected: &AccessToken,
    ) -> Result<AccessToken, AuthenticationError> {
        let mut credential = self.credential.lock().await;
        if let Some(current) = credential.take() {
            if current != *rejected {
                tracing::debug!("access token already refreshed, reusing it");
                *credential = Some(current.clone());
                return Ok(current);
            }
        }

        tracing::debug!("discarded rejected access token, deriving a new one");
        let token = self.source.derive_credential().await?;
        *credential = Some(token.clone());
        Ok(token)
    }
}

fn bearer_header(
    token: &AccessTokenRef,
) -> Result<header::HeaderValue, header::InvalidHeaderValue> {
    let mut header_value = BytesMut::with_capacity(token.as_str().len() + 7);
    header_value.put_slice(b"Bearer ");
    header_value.put_slice(token.as_str().as_bytes());
    let mut value = header::HeaderValue::from_maybe_shared(header_value.freeze())?;
    value.set_sensitive(true);
    Ok(value)
}

#[inline]
fn is_unauthorized(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

#[async_trait::async_trait]
impl<S, P> Middleware for TokenRefreshAuthenticator<S, P>
where
    S: CredentialSource + 'static,
    P: Predicate<Request> + Send + Sync + 'static,
{
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        if !self.predicate.eval(&req) {
            return next.run(req, extensions).await;
        }

        let token = self.current_token().await.map_err(Error::middleware)?;
        req.headers_mut().insert(
            header::AUTHORIZATION,
            bearer_header(&token).map_err(Error::middleware)?,
        );

        let retry = req.try_clone();
        let mut response = next.clone().run(req, extensions).await?;

        if !is_unauthorized(response.status()) {
            return Ok(response);
        }

        let Some(mut retry) = retry else {
            tracing::warn!(
                response.status = response.status().as_u16(),
                "request was not authorized but its body cannot be resent"
            );
            return Ok(response);
        };

        let mut history = RetryHistory::take_from(&mut response);
        let prior = PriorResponse::drain(response).await;

        tracing::debug!(
            response.status = prior.status().as_u16(),
            url = %prior.url(),
            "request was not authorized, retrying with a new access token"
        );

        let token = self.refresh_token(&token).await.map_err(Error::middleware)?;
        retry.headers_mut().insert(
            header::AUTHORIZATION,
            bearer_header(&token).map_err(Error::middleware)?,
        );

        let mut response = next.run(retry, extensions).await?;

        history.0.push(prior);
        response.extensions_mut().insert(history);

        Ok(response)
    }
}

/// A snapshot of a response that was rejected and then retried
///
/// The body of the rejected response is read in full before the request is resent so
/// that its connection can be reused.
#[derive(Clone, Debug)]
pub struct PriorResponse {
    status: StatusCode,
    version: Version,
    url: Url,
    headers: header::HeaderMap,
    body: Bytes,
}

impl PriorResponse {
    async fn drain(response: Response) -> Self {
        let status = response.status();
        let version = response.version();
        let url = response.url().clone();
        let headers = response.headers().clone();

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(error) => {
                tracing::debug!(%error, "unable to read body of rejected response");
                Bytes::new()
            }
        };

        Self {
            status,
            version,
            url,
            headers,
            body,
        }
    }

    /// The status of the rejected response
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The HTTP version of the rejected response
    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    /// The final URL of the rejected response
    #[inline]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The headers of the rejected response
    #[inline]
    pub fn headers(&self) -> &header::HeaderMap {
        &self.headers
    }

    /// The body of the rejected response
    ///
    /// Empty if the body could not be read.
    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

#[derive(Clone, Debug, Default)]
struct RetryHistory(Vec<PriorResponse>);

impl RetryHistory {
    fn take_from(response: &mut Response) -> Self {
        response
            .extensions_mut()
            .remove::<RetryHistory>()
            .unwrap_or_default()
    }
}

/// Access to the responses that were rejected before a response was obtained
pub trait ResponseHistoryExt {
    /// The rejected responses, oldest first
    ///
    /// Empty if the request was not retried.
    fn retry_history(&self) -> &[PriorResponse];
}

impl ResponseHistoryExt for Response {
    fn retry_history(&self) -> &[PriorResponse] {
        self.extensions()
            .get::<RetryHistory>()
            .map(|history| history.0.as_slice())
            .unwrap_or_default()
    }
}

/// Describes which attribute of a request made a predicate disagree with `expected`
fn mismatch<'a>(
    predicate: &'a dyn reflection::PredicateReflection,
    result: bool,
    expected: bool,
    attribute: &'static str,
    value: impl FnOnce() -> String,
) -> Option<reflection::Case<'a>> {
    if result == expected {
        return None;
    }

    let product = reflection::Product::new(attribute, value());
    Some(reflection::Case::new(Some(predicate), result).add_product(product))
}

/// Only authenticate requests sent over HTTPS
#[derive(Clone, Copy, Debug)]
pub struct HttpsOnly;

impl Predicate<Request> for HttpsOnly {
    #[inline]
    fn eval(&self, req: &Request) -> bool {
        req.url().scheme() == "https"
    }

    fn find_case(&self, expected: bool, req: &Request) -> Option<reflection::Case> {
        mismatch(self, self.eval(req), expected, "scheme", || req.url().scheme().to_owned())
    }
}

impl reflection::PredicateReflection for HttpsOnly {}
impl fmt::Display for HttpsOnly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("scheme is https")
    }
}

/// Only authenticate requests sent to one host
///
/// Hosts are compared without regard to ASCII case.
#[derive(Clone, Debug)]
pub struct ExactHostMatch {
    host: String,
}

impl ExactHostMatch {
    /// Construct a new predicate from a host string
    pub fn new(host: impl Into<String>) -> Self {
        let mut host = host.into();
        host.make_ascii_lowercase();
        Self { host }
    }
}

impl Predicate<Request> for ExactHostMatch {
    #[inline]
    fn eval(&self, req: &Request) -> bool {
        req.url()
            .host_str()
            .map_or(false, |host| host.eq_ignore_ascii_case(&self.host))
    }

    fn find_case(&self, expected: bool, req: &Request) -> Option<reflection::Case> {
        mismatch(self, self.eval(req), expected, "host", || {
            req.url().host_str().unwrap_or("<no host>").to_owned()
        })
    }
}

impl reflection::PredicateReflection for ExactHostMatch {}
impl fmt::Display for ExactHostMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host == {}", self.host)
    }
}
