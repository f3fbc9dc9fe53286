// Anti-CSRF state nonces for the Bling authorization flow

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use std::time::Duration;
use tracing::debug;

use crate::bling::database::OrderDatabase;

const DEFAULT_STATE_TTL: Duration = Duration::from_secs(600); // 10 minutes

/// Single-use nonce store gating the connect/callback flow. Consuming a
/// nonce always deletes it; only fresh nonces are accepted, which bounds the
/// window in which a leaked `state` parameter is replayable.
#[derive(Clone)]
pub struct StateGuard {
    db: OrderDatabase,
    ttl: Duration,
}

impl StateGuard {
    pub fn new(db: OrderDatabase) -> Self {
        Self {
            db,
            ttl: DEFAULT_STATE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Generate and persist a fresh state nonce.
    pub fn issue(&self) -> Result<String> {
        let state = random_state();
        self.db.insert_oauth_state(&state, Utc::now())?;
        debug!(state = %state, "Issued OAuth state");
        Ok(state)
    }

    /// Single-use check: the nonce is deleted whether or not it is still
    /// fresh, and `true` is returned only within the TTL window.
    pub fn consume(&self, state: &str) -> Result<bool> {
        let Some(created_at) = self.db.take_oauth_state(state)? else {
            return Ok(false);
        };
        let ttl = ChronoDuration::from_std(self.ttl)
            .unwrap_or_else(|_| ChronoDuration::seconds(600));
        let fresh = Utc::now() - created_at <= ttl;
        if !fresh {
            debug!(state = %state, "Rejected expired OAuth state");
        }
        Ok(fresh)
    }
}

fn random_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_guard(ttl: Duration) -> (tempfile::TempDir, StateGuard) {
        let dir = tempfile::tempdir().unwrap();
        let db = OrderDatabase::new(dir.path().join("orders.redb")).unwrap();
        (dir, StateGuard::new(db).with_ttl(ttl))
    }

    #[test]
    fn issued_states_are_random_hex() {
        let (_dir, guard) = temp_guard(DEFAULT_STATE_TTL);
        let a = guard.issue().unwrap();
        let b = guard.issue().unwrap();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn consume_is_single_use() {
        let (_dir, guard) = temp_guard(DEFAULT_STATE_TTL);
        let state = guard.issue().unwrap();
        assert!(guard.consume(&state).unwrap());
        assert!(!guard.consume(&state).unwrap());
    }

    #[test]
    fn unknown_state_is_rejected() {
        let (_dir, guard) = temp_guard(DEFAULT_STATE_TTL);
        assert!(!guard.consume("deadbeefdeadbeefdeadbeefdeadbeef").unwrap());
    }

    #[test]
    fn expired_state_is_consumed_but_rejected() {
        let (_dir, guard) = temp_guard(Duration::from_millis(50));
        let state = guard.issue().unwrap();
        std::thread::sleep(Duration::from_millis(80));
        assert!(!guard.consume(&state).unwrap());
        // The expired nonce was still removed.
        assert!(!guard.consume(&state).unwrap());
    }
}
