// One-vote-per-voter markers with expiry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Short-lived key/value marker store used to reject repeat votes. Backed by
/// process memory here; a shared cache can implement the same trait.
pub trait VoteMarkerStore: Send + Sync {
    /// Set `key` until `expires_at` unless a live marker already exists.
    /// Returns true if this call created the marker.
    fn set_if_absent(&self, key: &str, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool;

    /// Drop a marker, e.g. when the vote it guarded could not be recorded.
    fn release(&self, key: &str);

    /// Evict markers that expired before `now`. Returns how many went.
    /// Stores with native expiry can leave this as a no-op.
    fn purge_expired(&self, _now: DateTime<Utc>) -> usize {
        0
    }
}

/// Marker key for a voter on a match. Voter identities are hashed so the
/// store never holds them in the clear.
pub fn vote_marker_key(match_id: i64, voter_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(voter_id.as_bytes());
    format!("vote:{match_id}:{}", hex::encode(hasher.finalize()))
}

/// Thread-safe in-memory marker store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMarkerStore {
    inner: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
}

impl InMemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live markers (for testing/diagnostics).
    pub fn live_count(&self, now: DateTime<Utc>) -> usize {
        let map = self.inner.lock().unwrap();
        map.values().filter(|expires_at| **expires_at > now).count()
    }
}

impl VoteMarkerStore for InMemoryMarkerStore {
    fn set_if_absent(&self, key: &str, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let mut map = self.inner.lock().unwrap();
        match map.get(key) {
            Some(existing) if *existing > now => false,
            _ => {
                map.insert(key.to_string(), expires_at);
                true
            }
        }
    }

    fn release(&self, key: &str) {
        let mut map = self.inner.lock().unwrap();
        map.remove(key);
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut map = self.inner.lock().unwrap();
        let before = map.len();
        map.retain(|_, expires_at| *expires_at > now);
        before - map.len()
    }
}
