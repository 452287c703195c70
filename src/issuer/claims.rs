//! Token claims and the clock they are stamped with.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ProjectId, UserId};

/// Lifetime of an access token, in seconds.
pub const TOKEN_TTL_SECONDS: i64 = 5 * 60;

/// Source of the issuance time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant, for deterministic expiry checks.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// The signed assertion set. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Name of this authority
    pub iss: String,
    /// Project the token is scoped to
    pub aud: String,
    /// Authenticated user's opaque id
    pub sub: String,
    /// Issued at (seconds since epoch)
    pub iat: i64,
    /// Expiry (seconds since epoch), always `iat` + 5 minutes
    pub exp: i64,
}

impl Claims {
    /// Build the claims for a token. Pure in its inputs.
    pub fn new(
        issuer: &str,
        audience: &ProjectId,
        subject: &UserId,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let expiry = issued_at + Duration::seconds(TOKEN_TTL_SECONDS);
        Self {
            iss: issuer.to_string(),
            aud: audience.to_string(),
            sub: subject.to_string(),
            iat: issued_at.timestamp(),
            exp: expiry.timestamp(),
        }
    }
}
