use super::KvStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::Duration;

struct Entry {
    key: String,
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// In-process [`KvStore`] with the same insertion-order and TTL semantics as
/// the sqlite backend. Used by tests.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<Vec<Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

fn live(entry: &Entry, now: DateTime<Utc>) -> bool {
    entry.expires_at.is_none_or(|at| at > now)
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Utc::now();
        let entries = self.entries.lock();
        Ok(entries
            .iter()
            .find(|e| e.key == key && live(e, now))
            .map(|e| e.value.clone()))
    }

    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at =
            ttl.map(|ttl| Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default());
        let mut entries = self.entries.lock();
        entries.retain(|e| e.key != key);
        entries.push(Entry {
            key: key.to_string(),
            value: value.to_string(),
            expires_at,
        });
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().retain(|e| e.key != key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let now = Utc::now();
        let entries = self.entries.lock();
        Ok(entries
            .iter()
            .filter(|e| e.key.starts_with(prefix) && live(e, now))
            .map(|e| e.key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn behaves_like_the_sqlite_backend() {
        let kv = MemoryKv::new();
        kv.put("relay:1", "a", None).unwrap();
        kv.put("relay:2", "b", None).unwrap();
        kv.put("relay:1", "a2", None).unwrap();

        assert_eq!(kv.list("relay:").unwrap(), vec!["relay:2", "relay:1"]);
        assert_eq!(kv.get("relay:1").unwrap().as_deref(), Some("a2"));

        kv.delete("relay:2").unwrap();
        assert_eq!(kv.get("relay:2").unwrap(), None);
    }

    #[test]
    fn ttl_expires_entries() {
        let kv = MemoryKv::new();
        kv.put("k", "v", Some(Duration::from_millis(20))).unwrap();
        assert!(kv.get("k").unwrap().is_some());
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(kv.get("k").unwrap(), None);
    }
}
