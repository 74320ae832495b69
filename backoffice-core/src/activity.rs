//! Activity log for panel mutations.
//!
//! Entries are recorded after the mutation they describe. Recording is
//! best-effort: a failing sink is logged and never fails the request.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::warn;

use crate::context::AdminContext;
use crate::error::{Metadata, Result};

pub const PANEL_TRANSITION: &str = "panel.transition";
pub const PANEL_TRANSITION_BLOCKED: &str = "panel.transition.blocked";
pub const PANEL_TRANSLATION_CREATED: &str = "panel.translation.created";
pub const PANEL_COMMAND_DISPATCHED: &str = "panel.command.dispatched";
pub const TRANSLATION_ASSIGNMENT_CHANGED: &str = "translation.assignment.changed";

/// Maximum entries retained by [`MemoryActivitySink`] before pruning.
const MAX_ACTIVITY_ENTRIES: usize = 10_000;

/// An entry in the activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Unique entry ID
    pub id: String,
    /// Who performed the action
    pub actor_id: String,
    /// Dotted verb, e.g. `panel.transition`
    pub verb: String,
    pub object_type: String,
    pub object_id: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(
        ctx: &AdminContext,
        verb: impl Into<String>,
        object_type: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            actor_id: ctx.user_id().to_string(),
            verb: verb.into(),
            object_type: object_type.into(),
            object_id: object_id.into(),
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Destination for activity entries.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn record(&self, ctx: &AdminContext, entry: ActivityEntry) -> Result<()>;
}

/// Record an entry, logging instead of failing.
pub async fn record_best_effort(
    sink: Option<&dyn ActivitySink>,
    ctx: &AdminContext,
    entry: ActivityEntry,
) {
    let Some(sink) = sink else {
        return;
    };
    let verb = entry.verb.clone();
    if let Err(e) = sink.record(ctx, entry).await {
        warn!(verb = %verb, error = %e, "Failed to record activity");
    }
}

/// Bounded in-memory activity log (newest first).
pub struct MemoryActivitySink {
    entries: Arc<RwLock<VecDeque<ActivityEntry>>>,
    max_entries: usize,
}

impl MemoryActivitySink {
    pub fn new() -> Self {
        Self::with_max_entries(MAX_ACTIVITY_ENTRIES)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries,
        }
    }

    /// Get recent entries.
    pub async fn recent(&self, limit: usize) -> Vec<ActivityEntry> {
        let entries = self.entries.read().await;
        entries.iter().take(limit).cloned().collect()
    }

    /// Entries with the given verb, newest first.
    pub async fn by_verb(&self, verb: &str) -> Vec<ActivityEntry> {
        let entries = self.entries.read().await;
        entries.iter().filter(|e| e.verb == verb).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

impl Default for MemoryActivitySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActivitySink for MemoryActivitySink {
    async fn record(&self, _ctx: &AdminContext, entry: ActivityEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.push_front(entry);

        // Prune if over limit
        while entries.len() > self.max_entries {
            entries.pop_back();
        }
        Ok(())
    }
}
