use std::{io, process::ExitStatus, string::FromUtf8Error};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::ExchangeEndpoint;

/// An invalid token exchange endpoint
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// No endpoint was provided
    #[error("a token exchange endpoint is required")]
    Empty,
    /// The endpoint is not an absolute URL
    #[error("token exchange endpoint `{url}` is not a valid URL")]
    InvalidUrl {
        /// The rejected value
        url: String,
        /// The underlying parse error
        source: url::ParseError,
    },
}

/// An error while asking the local credential helper for an identity token
#[derive(Debug, Error)]
pub enum LocalTokenError {
    /// The helper process could not be started
    #[error("unable to run credential helper `{program}`")]
    Spawn {
        /// The program that was run
        program: String,
        /// The underlying I/O error
        source: io::Error,
    },
    /// The helper process exited unsuccessfully
    #[error("credential helper exited with {status}: {stderr}")]
    Failed {
        /// The exit status of the helper
        status: ExitStatus,
        /// Anything the helper wrote to standard error
        stderr: String,
    },
    /// The helper wrote something other than UTF-8 to standard output
    #[error("credential helper output was not valid UTF-8")]
    NotUtf8(#[from] FromUtf8Error),
    /// The helper did not produce a token
    #[error("credential helper returned an empty token")]
    Empty,
}

/// A failure in one of the steps of deriving a downstream access token
#[derive(Debug, Error)]
pub enum DeriveError {
    /// Unable to obtain a local identity token
    #[error("error obtaining a local identity token")]
    LocalHelper(#[from] LocalTokenError),
    /// Unable to send the exchange request
    #[error("error sending request to token exchange endpoint")]
    RequestSend(#[source] reqwest::Error),
    /// The exchange endpoint responded with something other than `200 OK`
    #[error("token exchange endpoint responded with {status}: {body}")]
    UnexpectedStatus {
        /// The response status
        status: reqwest::StatusCode,
        /// The response body
        body: String,
    },
    /// Unable to read the response
    #[error("error reading response body")]
    BodyRead(#[source] reqwest::Error),
    /// Unable to deserialize the exchanged token
    #[error("error deserializing exchanged token")]
    TokenBody(#[from] serde_json::Error),
    /// The exchanged token was empty
    #[error("exchanged token is empty")]
    EmptyToken,
    /// The exchanged token cannot be used as a bearer credential
    #[error("exchanged token contains characters not allowed in a bearer credential")]
    MalformedToken,
    /// The expiry of the exchanged token was empty
    #[error("exchanged token has no expiry")]
    EmptyExpiry,
    /// The expiry of the exchanged token is not an ISO-8601 timestamp
    #[error("exchanged token expiry `{value}` is not an ISO-8601 timestamp")]
    InvalidExpiry {
        /// The rejected value
        value: String,
        /// The underlying parse error
        source: chrono::ParseError,
    },
    /// The exchanged token has already expired
    #[error("exchanged token expired at {expires_at}")]
    Expired {
        /// When the token expired
        expires_at: DateTime<Utc>,
    },
}

/// Failure to obtain a downstream access token from an exchange endpoint
#[derive(Debug, Error)]
#[error("failed to authenticate to {endpoint}")]
pub struct AuthenticationError {
    endpoint: ExchangeEndpoint,
    source: DeriveError,
}

impl AuthenticationError {
    /// Constructs a new authentication error
    pub fn new(endpoint: ExchangeEndpoint, source: impl Into<DeriveError>) -> Self {
        Self {
            endpoint,
            source: source.into(),
        }
    }

    /// The endpoint that the token was to be derived from
    #[inline]
    pub fn endpoint(&self) -> &ExchangeEndpoint {
        &self.endpoint
    }

    /// The step that failed
    #[inline]
    pub fn failure(&self) -> &DeriveError {
        &self.source
    }
}
