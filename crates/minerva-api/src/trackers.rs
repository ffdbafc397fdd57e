use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use minerva_types::api::PresenceUser;
use tokio::time::Instant;
use tracing::debug;

/// In-memory presence map with per-entry TTL, keyed by (name, colonia).
/// Backs both the "who is typing" indicator and the active-users counter;
/// only the TTL differs. Entries expire silently, nothing is persisted.
pub struct PresenceTracker {
    ttl: Duration,
    entries: Mutex<HashMap<(String, String), Instant>>,
}

impl PresenceTracker {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Record or refresh a presence mark.
    pub fn mark_active(&self, user_name: &str, user_colonia: &str) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            (user_name.to_string(), user_colonia.to_string()),
            Instant::now(),
        );
    }

    /// Explicitly drop a presence mark before it expires.
    pub fn clear(&self, user_name: &str, user_colonia: &str) {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(&(user_name.to_string(), user_colonia.to_string()));
    }

    /// Current live entries. Expired entries are dropped on the way out, so
    /// readers never observe stale presence even between sweeps.
    pub fn list(&self) -> Vec<PresenceUser> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, seen| now.duration_since(*seen) < self.ttl);
        let mut users: Vec<PresenceUser> = entries
            .keys()
            .map(|(name, colonia)| PresenceUser {
                user_name: name.clone(),
                user_colonia: colonia.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.user_name.cmp(&b.user_name));
        users
    }

    pub fn count(&self) -> usize {
        self.list().len()
    }

    /// Drop expired entries. `list` already self-cleans; the periodic sweep
    /// just keeps the map from holding dead keys while nobody polls.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, seen| now.duration_since(*seen) < self.ttl);
        let expired = before - entries.len();
        if expired > 0 {
            debug!("presence sweep dropped {} expired entrie(s)", expired);
        }
    }

    pub fn spawn_sweep(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                tracker.sweep();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn typing_marks_expire_after_ttl() {
        let tracker = PresenceTracker::new(Duration::from_secs(5));
        tracker.mark_active("Ana", "CSN-1");
        tracker.mark_active("Luis", "Montserrat");
        assert_eq!(tracker.count(), 2);

        tokio::time::advance(Duration::from_secs(3)).await;
        // refresh keeps one entry alive past the original deadline
        tracker.mark_active("Ana", "CSN-1");

        tokio::time::advance(Duration::from_secs(3)).await;
        let live = tracker.list();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].user_name, "Ana");

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(tracker.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_clear_drops_entry_immediately() {
        let tracker = PresenceTracker::new(Duration::from_secs(30));
        tracker.mark_active("Rosa", "CSN-2");
        assert_eq!(tracker.count(), 1);
        tracker.clear("Rosa", "CSN-2");
        assert_eq!(tracker.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn same_name_different_colonia_are_distinct() {
        let tracker = PresenceTracker::new(Duration::from_secs(30));
        tracker.mark_active("Ana", "CSN-1");
        tracker.mark_active("Ana", "CSN-3");
        assert_eq!(tracker.count(), 2);
    }
}
