//! Correlation store: which relayed copy corresponds to which original
//! message.

use crate::storage::KvStore;
use crate::telegram::ChatRef;
use std::sync::Arc;
use std::time::Duration;

const RELAY_KEY_PREFIX: &str = "relay:";

fn relay_key(relayed_id: i64) -> String {
    format!("{RELAY_KEY_PREFIX}{relayed_id}")
}

/// Where a relayed copy came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageOrigin {
    pub chat: ChatRef,
    pub message_id: i64,
}

/// Maps relayed-copy message ids to their origin, with bounded retention:
/// per-entry TTL plus a soft cap on live entries, evicting oldest-first.
pub struct CorrelationStore {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
    max_entries: usize,
}

impl CorrelationStore {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration, max_entries: usize) -> Self {
        Self {
            kv,
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Record that relayed copy `relayed_id` came from `origin`.
    ///
    /// Failures are logged, not propagated: by the time this runs the relay
    /// itself already succeeded, and a lost correlation only degrades future
    /// replies to "source unavailable".
    pub fn put(&self, relayed_id: i64, origin: &MessageOrigin) {
        let value = format!("{}_{}", origin.chat, origin.message_id);
        if let Err(e) = self.kv.put(&relay_key(relayed_id), &value, Some(self.ttl)) {
            tracing::warn!("Failed to store correlation for copy {relayed_id}: {e}");
            return;
        }
        tracing::debug!("Stored correlation {relayed_id} -> {value}");
        self.evict_over_cap();
    }

    /// Look up the origin of relayed copy `relayed_id`. Absent keys and
    /// malformed values both come back as `None`.
    pub fn get(&self, relayed_id: i64) -> Option<MessageOrigin> {
        let key = relay_key(relayed_id);
        let raw = match self.kv.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Correlation lookup for copy {relayed_id} failed: {e}");
                return None;
            }
        };

        match decode_origin(&raw) {
            Some(origin) => Some(origin),
            None => {
                tracing::warn!("Malformed correlation value for copy {relayed_id}: '{raw}'");
                None
            }
        }
    }

    /// Best-effort cap enforcement: drop the oldest entries (listing order is
    /// insertion order) until at most `max_entries` remain. Concurrent puts
    /// may transiently exceed the cap; that is fine.
    fn evict_over_cap(&self) {
        let keys = match self.kv.list(RELAY_KEY_PREFIX) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!("Correlation cleanup listing failed: {e}");
                return;
            }
        };
        if keys.len() <= self.max_entries {
            return;
        }
        let excess = keys.len() - self.max_entries;
        for key in keys.into_iter().take(excess) {
            if let Err(e) = self.kv.delete(&key) {
                tracing::warn!("Correlation cleanup failed to evict '{key}': {e}");
            } else {
                tracing::debug!("Evicted correlation entry '{key}' over cap");
            }
        }
    }
}

fn decode_origin(raw: &str) -> Option<MessageOrigin> {
    let mut parts = raw.split('_');
    let (chat, message_id) = (parts.next()?, parts.next()?);
    if parts.next().is_some() || chat.is_empty() {
        return None;
    }
    let message_id: i64 = message_id.parse().ok()?;
    Some(MessageOrigin {
        chat: ChatRef::parse(chat),
        message_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKv;

    fn store(ttl: Duration, cap: usize) -> (Arc<MemoryKv>, CorrelationStore) {
        let kv = Arc::new(MemoryKv::new());
        let store = CorrelationStore::new(kv.clone(), ttl, cap);
        (kv, store)
    }

    fn origin(chat: ChatRef, message_id: i64) -> MessageOrigin {
        MessageOrigin { chat, message_id }
    }

    #[test]
    fn put_then_get_roundtrips_numeric_and_handle_chats() {
        let (_kv, store) = store(Duration::from_secs(60), 10);

        store.put(100, &origin(ChatRef::Id(42), 7));
        store.put(101, &origin(ChatRef::Handle("@channel".into()), 9));
        store.put(102, &origin(ChatRef::Id(-1_000_123), 11));

        assert_eq!(store.get(100), Some(origin(ChatRef::Id(42), 7)));
        assert_eq!(
            store.get(101),
            Some(origin(ChatRef::Handle("@channel".into()), 9))
        );
        assert_eq!(store.get(102), Some(origin(ChatRef::Id(-1_000_123), 11)));
        assert_eq!(store.get(999), None);
    }

    #[test]
    fn exceeding_the_cap_evicts_exactly_the_oldest() {
        let (_kv, store) = store(Duration::from_secs(60), 3);

        for id in 1..=5 {
            store.put(id, &origin(ChatRef::Id(id), id));
        }

        // Two oldest gone, three newest alive.
        assert_eq!(store.get(1), None);
        assert_eq!(store.get(2), None);
        assert!(store.get(3).is_some());
        assert!(store.get(4).is_some());
        assert!(store.get(5).is_some());
    }

    #[test]
    fn entries_expire_after_ttl() {
        let (_kv, store) = store(Duration::from_millis(30), 10);
        store.put(100, &origin(ChatRef::Id(42), 7));
        assert!(store.get(100).is_some());

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(store.get(100), None);
    }

    #[test]
    fn malformed_values_decode_to_not_found() {
        let (kv, store) = store(Duration::from_secs(60), 10);

        kv.put("relay:1", "no-separator", None).unwrap();
        kv.put("relay:2", "42_not-a-number", None).unwrap();
        kv.put("relay:3", "a_b_c", None).unwrap();
        kv.put("relay:4", "_7", None).unwrap();

        for id in 1..=4 {
            assert_eq!(store.get(id), None, "relay:{id} should be not-found");
        }
    }
}
