//! Nonce cache for signed reports
//!
//! A nonce is accepted once per merchant inside the tolerance window. Older
//! entries are pruned on insert; their timestamps would be rejected as stale
//! anyway.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub struct NonceCache {
    window: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl NonceCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Record a nonce; `false` if it was already used inside the window
    pub fn check_and_insert(&self, merchant_key: &str, nonce: &str) -> bool {
        self.check_and_insert_at(merchant_key, nonce, Instant::now())
    }

    fn check_and_insert_at(&self, merchant_key: &str, nonce: &str, now: Instant) -> bool {
        let mut seen = self.seen.lock();
        seen.retain(|_, at| now.saturating_duration_since(*at) < self.window);

        let key = format!("{}:{}", merchant_key, nonce);
        if seen.contains_key(&key) {
            return false;
        }
        seen.insert(key, now);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
