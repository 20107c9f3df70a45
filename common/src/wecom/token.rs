// Cached access token

use chrono::{DateTime, Duration, Utc};

/// Seconds shaved off the platform's stated lifetime to absorb clock skew
/// and in-flight latency
pub const EXPIRY_MARGIN_SECONDS: i64 = 300;

/// Lifetime assumed when the platform omits `expires_in`
pub const DEFAULT_EXPIRES_IN_SECONDS: i64 = 7200;

/// Bearer token owned by a single client
#[derive(Debug, Clone)]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Token issued at `issued_at` with the platform's stated lifetime.
    ///
    /// A negative lifetime counts as zero. `None` when the expiry cannot be
    /// represented.
    pub fn issued(
        value: String,
        expires_in_seconds: i64,
        issued_at: DateTime<Utc>,
    ) -> Option<Self> {
        let lifetime = expires_in_seconds
            .max(0)
            .saturating_sub(EXPIRY_MARGIN_SECONDS);
        let expires_at = Duration::try_seconds(lifetime)
            .and_then(|margin| issued_at.checked_add_signed(margin))?;

        Some(Self { value, expires_at })
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
