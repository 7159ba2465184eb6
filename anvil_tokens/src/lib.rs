//! Credential derivation for clients of AnVIL data federation services
//!
//! Services fronted by the Gen3 "fence" expect a bearer token of their own. A
//! signed-in user does not hold one directly; instead, the user's local trust agent
//! (such as `gcloud`) mints a short-lived identity token, and that identity token is
//! exchanged with a Terra endpoint for a fence access token.
//!
//! This crate models that exchange as two pluggable steps:
//!
//! * a [`LocalTokenSource`][sources::LocalTokenSource], which asks the local trust agent
//!   for an identity token, optionally for a specific principal, and
//! * a [`TokenExchangeSource`][sources::exchange::TokenExchangeSource], which presents
//!   that identity token to the exchange endpoint and validates the token it returns.
//!
//! Any failure along the way is reported as a single [`AuthenticationError`] naming the
//! endpoint and carrying the underlying cause.
//!
//! ```
//! use anvil_tokens::{sources, ExchangeEndpoint, IdentityHint};
//!
//! # fn main() -> Result<(), anvil_tokens::ConfigurationError> {
//! let endpoint = ExchangeEndpoint::parse(
//!     "https://broad-bond-prod.appspot.com/api/link/v1/fence/accesstoken",
//! )?;
//!
//! let source = sources::exchange::TokenExchangeSource::new(
//!     endpoint,
//!     sources::ConstLocalTokenSource::new("local-identity-token"),
//! )
//! .with_identity_hint(IdentityHint::from_static("someone@example.com"));
//! # let _ = source;
//! # Ok(())
//! # }
//! ```
//!
//! Tokens derived here are not cached or persisted; holding on to the current token
//! and refreshing it when a service rejects it is the job of the consumer, such as the
//! `anvil_reqwest` middleware.
//!
//! # Features
//!
//! * `command` (default): Provides [`CommandTokenSource`][sources::CommandTokenSource],
//!   which runs a local credential helper process.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod braids;
pub mod clock;
mod endpoint;
mod error;
pub mod sources;
mod tokens;

pub use braids::*;
pub use endpoint::ExchangeEndpoint;
pub use error::{AuthenticationError, ConfigurationError, DeriveError, LocalTokenError};
pub use tokens::ExchangedToken;
