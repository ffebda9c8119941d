//! Authentication modes (spec.md §4.1, "Authentication").
//!
//! v1 embeds the shared key and hardware key in every request. v2 exchanges
//! them once at `register` for a bearer token with an explicit expiry, and
//! refreshes proactively at 80% of that interval.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub enum AuthMode {
    SharedKey,
    Token(TokenState),
}

#[derive(Debug, Clone)]
pub struct TokenState {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_in: chrono::Duration,
}

impl TokenState {
    pub fn new(token: String, issued_at: DateTime<Utc>, expires_in_secs: i64) -> Self {
        Self {
            token,
            issued_at,
            expires_in: chrono::Duration::seconds(expires_in_secs),
        }
    }

    /// True once 80% of the token's lifetime has elapsed, per spec.md's
    /// "refresh proactively at 80% of the interval".
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        let elapsed = now - self.issued_at;
        let threshold = (self.expires_in * 4) / 5;
        elapsed >= threshold
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn refresh_triggers_at_eighty_percent() {
        let issued = Utc::now();
        let token = TokenState::new("abc".into(), issued, 1000);
        assert!(!token.needs_refresh(issued + chrono::Duration::seconds(799)));
        assert!(token.needs_refresh(issued + chrono::Duration::seconds(800)));
    }
}
