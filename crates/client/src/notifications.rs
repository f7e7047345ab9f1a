//! Unread notification ledger
//!
//! Per-room unread counters for badge display. The per-room map is the only
//! state; the total is summed on every read so it cannot drift from it.
//!
//! Known gaps, both accepted:
//! - pushes are counted as delivered, so a duplicated `message:notification`
//!   counts twice;
//! - a snapshot that lands after a push received during its fetch overwrites
//!   that push (last writer wins).

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use loners_protocol::{ServerEvent, UnreadNotification};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::http::ApiClient;
use crate::push::{EventHub, Subscription};

/// Plain per-room counts; an absent room counts as zero
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnreadCounts {
    rooms: BTreeMap<String, u32>,
}

impl UnreadCounts {
    /// Group a server snapshot by room
    pub fn from_notifications(notifications: &[UnreadNotification]) -> Self {
        let mut rooms = BTreeMap::new();
        for notification in notifications {
            *rooms.entry(notification.event.clone()).or_insert(0) += 1;
        }
        Self { rooms }
    }

    pub fn get(&self, room_id: &str) -> u32 {
        self.rooms.get(room_id).copied().unwrap_or(0)
    }

    pub fn increment(&mut self, room_id: &str) -> u32 {
        let count = self.rooms.entry(room_id.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn reset(&mut self, room_id: &str) {
        self.rooms.insert(room_id.to_string(), 0);
    }

    pub fn total(&self) -> u64 {
        self.rooms.values().map(|&c| u64::from(c)).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.rooms.iter().map(|(room, &count)| (room.as_str(), count))
    }
}

impl FromIterator<(String, u32)> for UnreadCounts {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        Self {
            rooms: iter.into_iter().collect(),
        }
    }
}

/// Shared ledger; one per signed-in client
pub struct UnreadLedger {
    counts: Mutex<UnreadCounts>,
    total_tx: watch::Sender<u64>,
    api: ApiClient,
}

impl UnreadLedger {
    pub fn new(api: ApiClient) -> Arc<Self> {
        let (total_tx, _) = watch::channel(0);
        Arc::new(Self {
            counts: Mutex::new(UnreadCounts::default()),
            total_tx,
            api,
        })
    }

    /// Overwrite everything with `counts`; no merge with prior state
    pub fn replace_all(&self, counts: UnreadCounts) {
        let mut current = self.lock();
        *current = counts;
        self.publish(&current);
    }

    /// Count one more unread message in `room_id`
    pub fn increment(&self, room_id: &str) -> u32 {
        let mut current = self.lock();
        let count = current.increment(room_id);
        self.publish(&current);
        count
    }

    /// Reset locally, then tell the server. The local reset stands even if
    /// the server call fails; that failure is only logged.
    pub async fn mark_read(&self, room_id: &str) {
        {
            let mut current = self.lock();
            current.reset(room_id);
            self.publish(&current);
        }
        if let Err(err) = self.api.mark_room_read(room_id).await {
            warn!(
                component = "notifications",
                event = "notifications.mark_read.failed",
                room_id = %room_id,
                error = %err,
                "Server did not record read state"
            );
        }
    }

    pub fn count(&self, room_id: &str) -> u32 {
        self.lock().get(room_id)
    }

    pub fn total(&self) -> u64 {
        self.lock().total()
    }

    pub fn snapshot(&self) -> UnreadCounts {
        self.lock().clone()
    }

    /// Latest total, updated after every mutation
    pub fn watch_total(&self) -> watch::Receiver<u64> {
        self.total_tx.subscribe()
    }

    /// Fetch the server snapshot and apply it. On failure the ledger keeps
    /// its previous state and the error goes to the caller.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let unread = self.api.unread_notifications().await?;
        let counts = UnreadCounts::from_notifications(&unread);
        debug!(
            component = "notifications",
            event = "notifications.snapshot.applied",
            rooms = counts.rooms.len(),
            total = counts.total(),
        );
        self.replace_all(counts);
        Ok(())
    }

    /// Count every `message:notification` from `hub` until the returned
    /// subscription is dropped
    pub fn attach(self: &Arc<Self>, hub: &Arc<EventHub>) -> Subscription {
        let ledger = Arc::downgrade(self);
        hub.on_event(move |event| {
            if let ServerEvent::MessageNotification(notification) = event {
                if let Some(ledger) = ledger.upgrade() {
                    ledger.increment(&notification.event_id);
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, UnreadCounts> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, counts: &UnreadCounts) {
        self.total_tx.send_replace(counts.total());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStore;
    use crate::storage::LocalStore;
    use loners_protocol::MessageNotification;

    fn offline_ledger() -> Arc<UnreadLedger> {
        let session = Arc::new(SessionStore::restore(Arc::new(LocalStore::in_memory())));
        // Port 9 (discard) is never served in test environments
        let api = ApiClient::with_http(reqwest::Client::new(), "http://127.0.0.1:9/api", session);
        UnreadLedger::new(api)
    }

    fn counts(pairs: &[(&str, u32)]) -> UnreadCounts {
        pairs.iter().map(|(r, c)| ((*r).to_string(), *c)).collect()
    }

    fn notification(room: &str) -> ServerEvent {
        ServerEvent::MessageNotification(MessageNotification {
            event_id: room.into(),
            from: "ana".into(),
            text: "hey".into(),
        })
    }

    #[test]
    fn increments_since_last_reset() {
        let mut c = UnreadCounts::default();
        assert_eq!(c.get("A"), 0);
        c.increment("A");
        c.increment("A");
        c.reset("A");
        c.increment("A");
        assert_eq!(c.get("A"), 1);
        assert_eq!(c.total(), 1);
    }

    #[test]
    fn snapshot_grouped_by_room() {
        let raw = serde_json::json!([
            {"_id": "n1", "event": "A"},
            {"_id": "n2", "event": "B"},
            {"_id": "n3", "event": "A"}
        ]);
        let notifications: Vec<UnreadNotification> = serde_json::from_value(raw).unwrap();
        let c = UnreadCounts::from_notifications(&notifications);
        assert_eq!(c, counts(&[("A", 2), ("B", 1)]));
    }

    #[test]
    fn total_matches_sum_of_rooms() {
        let mut c = counts(&[("A", 4), ("B", 0), ("C", 7)]);
        c.increment("D");
        let sum: u64 = c.iter().map(|(_, n)| u64::from(n)).sum();
        assert_eq!(c.total(), sum);
        assert_eq!(c.total(), 12);
    }

    #[tokio::test]
    async fn ledger_walkthrough() {
        let ledger = offline_ledger();
        assert_eq!(ledger.total(), 0);

        ledger.replace_all(counts(&[("A", 2), ("B", 1)]));
        assert_eq!(ledger.total(), 3);

        ledger.increment("A");
        assert_eq!(ledger.total(), 4);
        assert_eq!(ledger.count("A"), 3);

        // server unreachable: local reset still applies
        ledger.mark_read("A").await;
        assert_eq!(ledger.count("A"), 0);
        assert_eq!(ledger.total(), 1);
    }

    #[test]
    fn replace_all_discards_prior_state() {
        let ledger = offline_ledger();
        ledger.increment("old");
        ledger.increment("old");
        ledger.replace_all(counts(&[("B", 5)]));
        assert_eq!(ledger.count("old"), 0);
        assert_eq!(ledger.total(), 5);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_counts() {
        let ledger = offline_ledger();
        ledger.replace_all(counts(&[("A", 2)]));
        assert!(ledger.refresh().await.is_err());
        assert_eq!(ledger.count("A"), 2);
    }

    #[test]
    fn attached_ledger_counts_pushes_until_detached() {
        let ledger = offline_ledger();
        let hub = EventHub::new();
        let sub = ledger.attach(&hub);

        hub.dispatch(&notification("A"));
        hub.dispatch(&notification("A"));
        hub.dispatch(&notification("B"));
        hub.dispatch(&ServerEvent::Other {
            name: "typing".into(),
            args: Vec::new(),
        });
        assert_eq!(ledger.count("A"), 2);
        assert_eq!(ledger.total(), 3);

        drop(sub);
        hub.dispatch(&notification("A"));
        assert_eq!(ledger.count("A"), 2);
    }

    #[test]
    fn watchers_see_new_totals() {
        let ledger = offline_ledger();
        let rx = ledger.watch_total();
        ledger.increment("A");
        ledger.increment("B");
        assert_eq!(*rx.borrow(), 2);
    }
}
