//! Repository contract and the in-memory reference store.
//!
//! Repositories own records; callers always receive copies. The memory store
//! keeps insertion order, runs the [`crate::filter`] pipeline for `list`, and
//! applies the CMS update merge rules:
//!
//! - omitted keys keep their stored value, present keys replace, `null`
//!   removes the key;
//! - when a patch touches content (`_schema`, `blocks`, `data`, or any
//!   non-reserved key) the nested `data` object is rebuilt: replaced outright
//!   when the patch declares `_schema`, deep-merged otherwise.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::context::AdminContext;
use crate::error::{AdminError, Result};
use crate::filter::{apply_list_options, ListOptions};
use crate::record::{self, Record};

/// A page of records plus the total match count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListResult {
    pub records: Vec<Record>,
    pub total: usize,
}

/// Input for a repository-native translation create.
#[derive(Debug, Clone)]
pub struct CreateTranslationInput {
    /// Record the translation was cloned from
    pub source: Record,
    /// Prepared translation record (locale, group, slug and path set)
    pub translation: Record,
    pub target_locale: String,
}

/// CRUD over untyped records.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn list(&self, ctx: &AdminContext, opts: &ListOptions) -> Result<ListResult>;

    async fn get(&self, ctx: &AdminContext, id: &str) -> Result<Record>;

    async fn create(&self, ctx: &AdminContext, record: Record) -> Result<Record>;

    async fn update(&self, ctx: &AdminContext, id: &str, patch: Record) -> Result<Record>;

    async fn delete(&self, ctx: &AdminContext, id: &str) -> Result<()>;

    /// Repository-native translation creation, when supported.
    fn translation_creator(&self) -> Option<&dyn TranslationCreator> {
        None
    }
}

/// Repositories that can mint locale siblings themselves.
#[async_trait]
pub trait TranslationCreator: Send + Sync {
    async fn create_translation(
        &self,
        ctx: &AdminContext,
        input: CreateTranslationInput,
    ) -> Result<Record>;
}

// ============================================================================
// Merge rules
// ============================================================================

/// Keys that describe the record rather than its content.
pub const RESERVED_KEYS: &[&str] = &[
    "id",
    "status",
    "locale",
    "translation_group_id",
    "available_locales",
    "slug",
    "path",
    "title",
    "created_at",
    "updated_at",
    "published_at",
    "created_by",
    "updated_by",
];

const SCHEMA_KEY: &str = "_schema";
const BLOCKS_KEY: &str = "blocks";

fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Recursive merge; `null` in `patch` removes the key.
pub fn deep_merge(base: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        match value {
            Value::Null => {
                base.remove(key);
            }
            Value::Object(patch_obj) => match base.get_mut(key) {
                Some(Value::Object(base_obj)) => deep_merge(base_obj, patch_obj),
                _ => {
                    base.insert(key.clone(), value.clone());
                }
            },
            other => {
                base.insert(key.clone(), other.clone());
            }
        }
    }
}

/// Apply a patch to a stored record.
pub fn merge_record(existing: &Record, patch: &Record) -> Record {
    let mut merged = existing.as_map().clone();

    for (key, value) in patch.iter() {
        if key == record::DATA {
            continue;
        }
        if value.is_null() {
            merged.remove(key);
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }

    let touches_data = patch
        .keys()
        .any(|k| k == SCHEMA_KEY || k == BLOCKS_KEY || k == record::DATA || !is_reserved(k));
    if !touches_data {
        return Record::from(merged);
    }

    let patch_data = patch.get(record::DATA).and_then(Value::as_object);
    let mut data = if patch.contains_key(SCHEMA_KEY) {
        patch_data.cloned().unwrap_or_default()
    } else {
        let mut base = existing.data().cloned().unwrap_or_default();
        if let Some(patch_data) = patch_data {
            deep_merge(&mut base, patch_data);
        }
        base
    };

    // Content keys sent at the top level are mirrored into `data` for
    // records that keep their content there.
    if existing.data().is_some() || patch_data.is_some() {
        for (key, value) in patch.iter() {
            if key == record::DATA || key == SCHEMA_KEY || is_reserved(key) {
                continue;
            }
            if value.is_null() {
                data.remove(key);
            } else {
                data.insert(key.clone(), value.clone());
            }
        }
    }

    if matches!(patch.get(record::DATA), Some(Value::Null)) {
        merged.remove(record::DATA);
    } else if existing.data().is_some() || patch_data.is_some() {
        merged.insert(record::DATA.to_string(), Value::Object(data));
    }

    Record::from(merged)
}

// ============================================================================
// Memory repository
// ============================================================================

/// In-memory repository with insertion-ordered storage.
pub struct MemoryRepository {
    resource: String,
    records: Arc<RwLock<Vec<Record>>>,
    next_id: AtomicU64,
    /// Enforce unique `slug`/`path` per locale
    unique_paths: bool,
}

impl MemoryRepository {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            records: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
            unique_paths: true,
        }
    }

    /// Disable slug/path uniqueness checks.
    pub fn without_path_uniqueness(mut self) -> Self {
        self.unique_paths = false;
        self
    }

    /// Seed records without running create-time checks.
    pub async fn seed(&self, records: impl IntoIterator<Item = Record>) {
        let mut stored = self.records.write().await;
        stored.extend(records);
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Snapshot of every stored record.
    pub async fn snapshot(&self) -> Vec<Record> {
        self.records.read().await.clone()
    }

    /// Next `<resource>_<n>` id not already held by a stored record.
    fn mint_id(&self, records: &[Record]) -> String {
        loop {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            let id = format!("{}_{}", self.resource.trim_end_matches('s'), n);
            if !records.iter().any(|r| r.id().as_deref() == Some(id.as_str())) {
                return id;
            }
        }
    }

    /// Insert under an already-held write lock.
    fn insert_locked(&self, records: &mut Vec<Record>, mut record: Record) -> Result<Record> {
        let id = match record.id() {
            Some(id) => {
                if records.iter().any(|r| r.id().as_deref() == Some(id.as_str())) {
                    return Err(AdminError::conflict(
                        "duplicate_id",
                        format!("{} {} already exists", self.resource, id),
                        Map::new(),
                    ));
                }
                id
            }
            None => {
                let id = self.mint_id(records);
                record.insert(record::ID, id.clone());
                id
            }
        };
        self.check_paths(records, &record, None)?;

        if !record.contains_key("created_at") {
            record.insert("created_at", Utc::now().to_rfc3339());
        }
        records.push(record.clone());
        debug!(resource = %self.resource, id = %id, "Record created");
        Ok(record)
    }

    fn check_paths(
        &self,
        records: &[Record],
        candidate: &Record,
        skip_id: Option<&str>,
    ) -> Result<()> {
        if !self.unique_paths {
            return Ok(());
        }
        let locale = candidate.locale().unwrap_or_default();
        for field in ["path", "slug"] {
            let Some(value) = candidate.str_field(field) else {
                continue;
            };
            let taken = records.iter().any(|other| {
                other.id().as_deref() != skip_id
                    && other.str_field(field) == Some(value)
                    && other.locale().unwrap_or_default() == locale
            });
            if taken {
                return Err(AdminError::path_conflict(field, value, locale));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn list(&self, ctx: &AdminContext, opts: &ListOptions) -> Result<ListResult> {
        ctx.check_cancelled()?;
        let records = self.records.read().await.clone();
        let (records, total) = apply_list_options(records, opts);
        Ok(ListResult { records, total })
    }

    async fn get(&self, ctx: &AdminContext, id: &str) -> Result<Record> {
        ctx.check_cancelled()?;
        let records = self.records.read().await;
        records
            .iter()
            .find(|r| r.id().as_deref() == Some(id))
            .cloned()
            .ok_or_else(|| AdminError::not_found(&self.resource, id))
    }

    async fn create(&self, ctx: &AdminContext, record: Record) -> Result<Record> {
        ctx.check_cancelled()?;
        let mut records = self.records.write().await;
        self.insert_locked(&mut records, record)
    }

    async fn update(&self, ctx: &AdminContext, id: &str, patch: Record) -> Result<Record> {
        ctx.check_cancelled()?;
        let mut records = self.records.write().await;
        let index = records
            .iter()
            .position(|r| r.id().as_deref() == Some(id))
            .ok_or_else(|| AdminError::not_found(&self.resource, id))?;

        let mut merged = merge_record(&records[index], &patch);
        // The id is not patchable.
        merged.insert(record::ID, id.to_string());
        self.check_paths(&records, &merged, Some(id))?;
        merged.insert("updated_at", Utc::now().to_rfc3339());

        records[index] = merged.clone();
        debug!(resource = %self.resource, id = %id, "Record updated");
        Ok(merged)
    }

    async fn delete(&self, ctx: &AdminContext, id: &str) -> Result<()> {
        ctx.check_cancelled()?;
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id().as_deref() != Some(id));
        if records.len() == before {
            return Err(AdminError::not_found(&self.resource, id));
        }
        debug!(resource = %self.resource, id = %id, "Record deleted");
        Ok(())
    }

    fn translation_creator(&self) -> Option<&dyn TranslationCreator> {
        Some(self)
    }
}

#[async_trait]
impl TranslationCreator for MemoryRepository {
    async fn create_translation(
        &self,
        ctx: &AdminContext,
        input: CreateTranslationInput,
    ) -> Result<Record> {
        let group = input
            .translation
            .translation_group_id()
            .map(str::to_string)
            .or_else(|| input.source.group_or_id())
            .unwrap_or_default();
        let locale = input.target_locale.to_lowercase();

        ctx.check_cancelled()?;
        let mut records = self.records.write().await;
        let exists = records.iter().any(|r| {
            r.group_or_id().as_deref() == Some(group.as_str())
                && r.locale().map(str::to_lowercase).as_deref() == Some(locale.as_str())
        });
        if exists {
            return Err(AdminError::translation_already_exists(&group, &locale));
        }
        self.insert_locked(&mut records, input.translation)
    }
}
