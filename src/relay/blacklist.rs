//! Blocked-sender set, stored as one JSON array under a fixed key.

use crate::storage::KvStore;
use anyhow::{Context, Result};
use std::sync::Arc;

const BLACKLIST_KEY: &str = "black_list";

pub struct Blacklist {
    kv: Arc<dyn KvStore>,
}

impl Blacklist {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Read errors come back as an empty list: a broken store must never
    /// block relaying.
    pub fn members(&self) -> Vec<i64> {
        match self.kv.get(BLACKLIST_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("Malformed blacklist record, treating as empty: {e}");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to read blacklist, treating as empty: {e}");
                Vec::new()
            }
        }
    }

    pub fn contains(&self, user_id: i64) -> bool {
        self.members().contains(&user_id)
    }

    /// Idempotent: adding a present id is success.
    pub fn add(&self, user_id: i64) -> Result<()> {
        let mut members = self.members();
        if members.contains(&user_id) {
            tracing::info!("User {user_id} already blacklisted");
            return Ok(());
        }
        members.push(user_id);
        self.write(&members)?;
        tracing::info!("User {user_id} added to blacklist");
        Ok(())
    }

    /// Idempotent: removing an absent id is success.
    pub fn remove(&self, user_id: i64) -> Result<()> {
        let mut members = self.members();
        let before = members.len();
        members.retain(|&id| id != user_id);
        if members.len() == before {
            tracing::info!("User {user_id} not in blacklist");
            return Ok(());
        }
        self.write(&members)?;
        tracing::info!("User {user_id} removed from blacklist");
        Ok(())
    }

    fn write(&self, members: &[i64]) -> Result<()> {
        self.kv
            .put(BLACKLIST_KEY, &serde_json::to_string(members)?, None)
            .context("Failed to write blacklist")
    }
}
