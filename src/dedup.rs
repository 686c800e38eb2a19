//! Event Dedup Guard — short-lived suppression of duplicate platform events.
//!
//! Membership callbacks can be redelivered within a few seconds of the
//! original. Keys live in an in-memory map and expire after a fixed window;
//! expiry happens lazily on access, so no background timer is needed and the
//! guard is deterministic under test (see `should_process_at`).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default suppression window for redelivered membership events.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

pub struct DedupGuard {
    window: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl DedupGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` (and marks the key seen) if this key has not been seen
    /// within the window; `false` if it is a probable redelivery.
    pub fn should_process(&self, key: &str) -> bool {
        self.should_process_at(key, Instant::now())
    }

    /// Clock-injected core of [`should_process`]; tests drive `now` directly.
    pub fn should_process_at(&self, key: &str, now: Instant) -> bool {
        let mut seen = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        seen.retain(|_, marked| now.duration_since(*marked) < self.window);

        if seen.contains_key(key) {
            return false;
        }
        seen.insert(key.to_string(), now);
        true
    }

    /// Dedup key for chat-level events.
    pub fn chat_key(chat_id: i64) -> String {
        format!("chat:{chat_id}")
    }

    /// Dedup key for per-user membership events.
    pub fn member_key(chat_id: i64, user_id: i64) -> String {
        format!("chat:{chat_id}:user:{user_id}")
    }
}

impl Default for DedupGuard {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
