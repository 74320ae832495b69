//! Assignment persistence with explicit version checks.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;

use backoffice_core::{AdminContext, AdminError, Metadata, Result};

use super::assignment::{AssignmentStatus, TranslationAssignment};
use crate::locale::normalize_locale;

/// Queue listing filter. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentFilter {
    #[serde(default)]
    pub status: Option<AssignmentStatus>,
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub translation_group_id: Option<String>,
    #[serde(default)]
    pub target_locale: Option<String>,
}

impl AssignmentFilter {
    pub fn matches(&self, assignment: &TranslationAssignment) -> bool {
        self.status.map_or(true, |s| assignment.status == s)
            && self
                .assignee_id
                .as_deref()
                .map_or(true, |a| assignment.assignee_id == a)
            && self
                .translation_group_id
                .as_deref()
                .map_or(true, |g| assignment.translation_group_id == g)
            && self
                .target_locale
                .as_deref()
                .map_or(true, |l| {
                    normalize_locale(&assignment.target_locale) == normalize_locale(l)
                })
    }
}

/// Assignment storage.
///
/// `update` must fail with a `version_mismatch` conflict when the stored
/// version differs from `expected_version`, and bump the version by one on
/// success. Non-terminal assignments are unique on their active key.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    async fn create(
        &self,
        ctx: &AdminContext,
        assignment: TranslationAssignment,
    ) -> Result<TranslationAssignment>;

    async fn get(&self, ctx: &AdminContext, id: &str) -> Result<TranslationAssignment>;

    async fn list(
        &self,
        ctx: &AdminContext,
        filter: &AssignmentFilter,
    ) -> Result<Vec<TranslationAssignment>>;

    async fn update(
        &self,
        ctx: &AdminContext,
        assignment: TranslationAssignment,
        expected_version: u64,
    ) -> Result<TranslationAssignment>;
}

fn duplicate_active(key: &str, existing_id: &str) -> AdminError {
    let mut meta = Metadata::new();
    meta.insert("active_uniqueness_key".into(), json!(key));
    meta.insert("existing_id".into(), json!(existing_id));
    AdminError::conflict(
        "duplicate_assignment",
        format!("an active assignment already exists for {key}"),
        meta,
    )
}

#[derive(Default)]
struct Store {
    /// Insertion order
    assignments: Vec<TranslationAssignment>,
    /// Active uniqueness key -> assignment id
    active: HashMap<String, String>,
}

impl Store {
    fn position(&self, id: &str) -> Option<usize> {
        self.assignments.iter().position(|a| a.id == id)
    }
}

/// In-memory assignment repository.
#[derive(Default)]
pub struct MemoryAssignmentRepository {
    store: RwLock<Store>,
}

impl MemoryAssignmentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.assignments.len()
    }
}

#[async_trait]
impl AssignmentRepository for MemoryAssignmentRepository {
    async fn create(
        &self,
        ctx: &AdminContext,
        mut assignment: TranslationAssignment,
    ) -> Result<TranslationAssignment> {
        ctx.check_cancelled()?;
        let mut store = self.store.write().await;

        if assignment.id.is_empty() {
            assignment.id = uuid::Uuid::new_v4().to_string();
        }
        if store.position(&assignment.id).is_some() {
            return Err(AdminError::conflict(
                "duplicate_id",
                format!("assignment {} already exists", assignment.id),
                Metadata::new(),
            ));
        }
        if assignment.is_active() {
            let key = assignment.active_uniqueness_key();
            if let Some(existing) = store.active.get(&key) {
                return Err(duplicate_active(&key, existing));
            }
            store.active.insert(key, assignment.id.clone());
        }

        let now = Utc::now();
        assignment.version = 0;
        assignment.created_at = now;
        assignment.updated_at = now;
        store.assignments.push(assignment.clone());
        Ok(assignment)
    }

    async fn get(&self, ctx: &AdminContext, id: &str) -> Result<TranslationAssignment> {
        ctx.check_cancelled()?;
        let store = self.store.read().await;
        store
            .position(id)
            .map(|i| store.assignments[i].clone())
            .ok_or_else(|| AdminError::not_found("translation_assignment", id))
    }

    async fn list(
        &self,
        ctx: &AdminContext,
        filter: &AssignmentFilter,
    ) -> Result<Vec<TranslationAssignment>> {
        ctx.check_cancelled()?;
        let store = self.store.read().await;
        Ok(store
            .assignments
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    async fn update(
        &self,
        ctx: &AdminContext,
        mut assignment: TranslationAssignment,
        expected_version: u64,
    ) -> Result<TranslationAssignment> {
        ctx.check_cancelled()?;
        let mut store = self.store.write().await;
        let index = store
            .position(&assignment.id)
            .ok_or_else(|| {
                AdminError::not_found("translation_assignment", assignment.id.as_str())
            })?;

        let current = &store.assignments[index];
        if current.version != expected_version {
            return Err(AdminError::version_mismatch(
                "translation_assignment",
                &assignment.id,
                expected_version,
                current.version,
            ));
        }

        let old_key = current.is_active().then(|| current.active_uniqueness_key());
        let new_key = assignment.is_active().then(|| assignment.active_uniqueness_key());
        if let Some(key) = &new_key {
            if let Some(existing) = store.active.get(key) {
                if *existing != assignment.id {
                    return Err(duplicate_active(key, existing));
                }
            }
        }
        if let Some(key) = old_key {
            store.active.remove(&key);
        }
        if let Some(key) = new_key {
            store.active.insert(key, assignment.id.clone());
        }

        assignment.version = expected_version + 1;
        assignment.created_at = store.assignments[index].created_at;
        assignment.updated_at = Utc::now();
        store.assignments[index] = assignment.clone();
        Ok(assignment)
    }
}
