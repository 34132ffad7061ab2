//! Deferred one-shot tasks with durable, per-identity timers.
//!
//! Each task is addressed by a deterministic identity derived from its action
//! and parameters, so re-scheduling the same work replaces the pending timer
//! instead of duplicating it. A fired timer consumes its persisted record
//! whether the effect succeeds or fails: liveness over completeness, callers
//! needing retries must re-schedule.

use crate::storage::KvStore;
use crate::telegram::{BotApi, ChatRef};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const TASK_KEY_PREFIX: &str = "task:";
const DELETE_MESSAGE_ACTION: &str = "deleteMessage";

fn task_key(identity: &str) -> String {
    format!("{TASK_KEY_PREFIX}{identity}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteMessageParams {
    pub chat: ChatRef,
    pub message_id: i64,
}

/// The closed set of actions a deferred task can perform.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskAction {
    DeleteMessage(DeleteMessageParams),
}

impl TaskAction {
    pub fn delete_message(chat: ChatRef, message_id: i64) -> Self {
        Self::DeleteMessage(DeleteMessageParams { chat, message_id })
    }

    fn name(&self) -> &'static str {
        match self {
            Self::DeleteMessage(_) => DELETE_MESSAGE_ACTION,
        }
    }

    fn params(&self) -> Value {
        match self {
            Self::DeleteMessage(params) => {
                serde_json::to_value(params).unwrap_or(Value::Null)
            }
        }
    }

    /// Stable identity: same action + same parameters address the same timer.
    /// Struct fields serialize in declaration order, so the JSON is
    /// deterministic.
    pub fn identity(&self) -> String {
        format!("{}-{}", self.name(), self.params())
    }

    fn from_record(action: &str, params: &Value) -> Option<Self> {
        match action {
            DELETE_MESSAGE_ACTION => serde_json::from_value(params.clone())
                .ok()
                .map(Self::DeleteMessage),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct TaskRecord {
    action: String,
    params: Value,
    run_at: DateTime<Utc>,
}

/// Schedules and fires deferred tasks. One instance per process; each task
/// identity maps to at most one armed timer inside it.
pub struct TaskScheduler {
    kv: Arc<dyn KvStore>,
    api: Arc<dyn BotApi>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TaskScheduler {
    pub fn new(kv: Arc<dyn KvStore>, api: Arc<dyn BotApi>) -> Arc<Self> {
        Arc::new(Self {
            kv,
            api,
            timers: Mutex::new(HashMap::new()),
        })
    }

    /// Persist the task and arm its wake timer, replacing any pending timer
    /// for the same identity (last write wins). Returns the absolute wake
    /// time.
    pub fn schedule(
        self: &Arc<Self>,
        action: &TaskAction,
        delay: Duration,
    ) -> Result<DateTime<Utc>> {
        let identity = action.identity();
        let run_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        let record = TaskRecord {
            action: action.name().to_string(),
            params: action.params(),
            run_at,
        };
        self.kv
            .put(&task_key(&identity), &serde_json::to_string(&record)?, None)
            .with_context(|| format!("Failed to persist deferred task '{identity}'"))?;

        tracing::debug!("Armed deferred task '{identity}' for {run_at}");
        self.arm(identity, delay);
        Ok(run_at)
    }

    /// Re-arm timers for tasks that were persisted by a previous process.
    /// Overdue tasks fire immediately. Returns how many were re-armed.
    pub fn restore(self: &Arc<Self>) -> Result<usize> {
        let keys = self
            .kv
            .list(TASK_KEY_PREFIX)
            .context("Failed to list persisted deferred tasks")?;
        let now = Utc::now();
        let mut restored = 0;

        for key in keys {
            let identity = key[TASK_KEY_PREFIX.len()..].to_string();
            let Ok(Some(raw)) = self.kv.get(&key) else {
                continue;
            };
            let delay = match serde_json::from_str::<TaskRecord>(&raw) {
                Ok(record) => (record.run_at - now).to_std().unwrap_or(Duration::ZERO),
                Err(e) => {
                    tracing::warn!("Dropping unreadable deferred task '{identity}': {e}");
                    let _ = self.kv.delete(&key);
                    continue;
                }
            };
            self.arm(identity, delay);
            restored += 1;
        }

        Ok(restored)
    }

    fn arm(self: &Arc<Self>, identity: String, delay: Duration) {
        let scheduler = Arc::clone(self);
        let fire_identity = identity.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.fire(&fire_identity).await;
        });
        if let Some(previous) = self.timers.lock().insert(identity, handle) {
            previous.abort();
        }
    }

    /// Wake handling: consume the persisted record, dispatch the action, and
    /// unconditionally free the task state. A missing record means the task
    /// was already consumed; an effect failure is logged and swallowed.
    async fn fire(&self, identity: &str) {
        let key = task_key(identity);
        let record = match self.kv.get(&key) {
            Ok(Some(raw)) => serde_json::from_str::<TaskRecord>(&raw).ok(),
            Ok(None) => {
                self.timers.lock().remove(identity);
                return;
            }
            Err(e) => {
                tracing::warn!("Failed to read deferred task '{identity}': {e}");
                None
            }
        };

        if let Some(record) = record {
            match TaskAction::from_record(&record.action, &record.params) {
                Some(TaskAction::DeleteMessage(params)) => {
                    if let Err(e) = self
                        .api
                        .delete_message(&params.chat, params.message_id)
                        .await
                    {
                        tracing::warn!(
                            "Deferred delete of message {} in {} failed: {e}",
                            params.message_id,
                            params.chat
                        );
                    }
                }
                None => {
                    tracing::warn!("Unknown deferred task action: {}", record.action);
                }
            }
        }

        // State is freed no matter what happened above, so an identity can
        // never get stuck.
        if let Err(e) = self.kv.delete(&key) {
            tracing::warn!("Failed to clear deferred task '{identity}': {e}");
        }
        self.timers.lock().remove(identity);
    }
}
