use std::{fmt, str::FromStr};

use url::Url;

use crate::ConfigurationError;

const PRODUCTION_FENCE_TOKEN_URL: &str =
    "https://broad-bond-prod.appspot.com/api/link/v1/fence/accesstoken";
const DEVELOPMENT_FENCE_TOKEN_URL: &str =
    "https://firecloud-orchestration.dsde-dev.broadinstitute.org/api/link/v1/fence/accesstoken";

/// The remote endpoint that exchanges a local identity token for a downstream access token
///
/// An endpoint is fixed for the lifetime of whatever holds it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExchangeEndpoint(Url);

impl ExchangeEndpoint {
    /// Parses an endpoint from a URL string
    ///
    /// Fails if the string is blank or is not an absolute URL.
    pub fn parse(url: &str) -> Result<Self, ConfigurationError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ConfigurationError::Empty);
        }

        let url = Url::parse(url).map_err(|source| ConfigurationError::InvalidUrl {
            url: url.to_owned(),
            source,
        })?;

        Ok(Self(url))
    }

    /// The exchange endpoint of the production Terra environment
    pub fn production() -> Self {
        Self(Url::parse(PRODUCTION_FENCE_TOKEN_URL).expect("valid production URL"))
    }

    /// The exchange endpoint of the development Terra environment
    pub fn development() -> Self {
        Self(Url::parse(DEVELOPMENT_FENCE_TOKEN_URL).expect("valid development URL"))
    }

    /// The endpoint's URL
    #[inline]
    pub fn as_url(&self) -> &Url {
        &self.0
    }
}

impl From<Url> for ExchangeEndpoint {
    #[inline]
    fn from(url: Url) -> Self {
        Self(url)
    }
}

impl FromStr for ExchangeEndpoint {
    type Err = ConfigurationError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ExchangeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_an_absolute_url() {
        let endpoint = ExchangeEndpoint::parse("https://example/exchange").unwrap();
        assert_eq!(endpoint.as_url().host_str(), Some("example"));
        assert_eq!(endpoint.as_url().path(), "/exchange");
    }

    #[test]
    fn rejects_an_empty_url() {
        assert!(matches!(
            ExchangeEndpoint::parse(""),
            Err(ConfigurationError::Empty)
        ));
        assert!(matches!(
            ExchangeEndpoint::parse("   "),
            Err(ConfigurationError::Empty)
        ));
    }

    #[test]
    fn rejects_a_relative_url() {
        assert!(matches!(
            "/api/link/v1/fence/accesstoken".parse::<ExchangeEndpoint>(),
            Err(ConfigurationError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn well_known_environments_are_distinct() {
        assert_ne!(
            ExchangeEndpoint::production(),
            ExchangeEndpoint::development()
        );
        assert_eq!(
            ExchangeEndpoint::production().to_string(),
            PRODUCTION_FENCE_TOKEN_URL
        );
    }
}
