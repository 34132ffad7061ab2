//! Injected key-value storage capability.
//!
//! Every durable piece of state (correlation entries, the blacklist, pending
//! deferred tasks) lives behind the [`KvStore`] trait so deployments can pick
//! a backend and tests can run fully in-process.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryKv;
pub use sqlite::SqliteKv;

use anyhow::Result;
use std::time::Duration;

/// A flat string key-value store with per-entry expiry.
///
/// `list` returns live keys in insertion order; a replaced key counts as a
/// fresh insertion. Expired entries are invisible to `get` and `list`.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}
