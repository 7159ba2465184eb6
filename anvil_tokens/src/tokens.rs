use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

use crate::{AccessToken, AccessTokenRef, DeriveError};

/// A downstream access token as returned by the exchange endpoint
///
/// Only the access token itself is retained by consumers; the expiry is validated
/// when the token is received but nothing is scheduled against it.
#[derive(Debug)]
pub struct ExchangedToken {
    token: AccessToken,
    expires_at: DateTime<Utc>,
}

impl ExchangedToken {
    /// Validates a raw token and expiry as of `now`
    ///
    /// The token must be non-empty and usable as a bearer credential. The expiry must
    /// be an ISO-8601 timestamp strictly after `now`.
    pub fn validate(
        token: &str,
        expires_at: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, DeriveError> {
        if token.is_empty() {
            return Err(DeriveError::EmptyToken);
        }

        if !token.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(DeriveError::MalformedToken);
        }

        if expires_at.is_empty() {
            return Err(DeriveError::EmptyExpiry);
        }

        let expires_at =
            parse_expiry(expires_at).map_err(|source| DeriveError::InvalidExpiry {
                value: expires_at.to_owned(),
                source,
            })?;

        if expires_at <= now {
            return Err(DeriveError::Expired { expires_at });
        }

        Ok(Self {
            token: AccessToken::new(token.to_owned()),
            expires_at,
        })
    }

    /// Gets the access token
    #[inline]
    pub fn access_token(&self) -> &AccessTokenRef {
        &self.token
    }

    /// Gets the time at which the token expires
    #[inline]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Gets how much longer the token would be valid as of the provided time
    #[inline]
    pub fn until_expired_at(&self, time: DateTime<Utc>) -> Duration {
        if time < self.expires_at {
            self.expires_at - time
        } else {
            Duration::zero()
        }
    }

    /// Discards the expiry, keeping only the access token
    #[inline]
    pub fn into_access_token(self) -> AccessToken {
        self.token
    }
}

/// Parses an ISO-8601 timestamp
///
/// Seconds may be omitted, the offset may be written as `Z`, `+HH:MM` or `+HHMM`,
/// and a bare date means midnight. Timestamps without an offset are taken to be in UTC.
fn parse_expiry(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    const OFFSET_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%dT%H:%M%z",
        "%Y-%m-%d %H:%M:%S%.f%z",
        "%Y-%m-%d %H:%M%z",
    ];
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];

    let rfc3339 = match DateTime::parse_from_rfc3339(value) {
        Ok(time) => return Ok(time.with_timezone(&Utc)),
        Err(error) => error,
    };

    let with_offset = match value.strip_suffix(|c: char| c == 'Z' || c == 'z') {
        Some(local) => format!("{}+0000", local),
        None => value.to_owned(),
    };

    let offset = OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(&with_offset, format).ok())
        .map(|time| time.with_timezone(&Utc));

    let naive = || {
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(value, "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
            .map(|naive| naive.and_utc())
    };

    offset.or_else(naive).ok_or(rfc3339)
}
