//! Export, validate and apply of exchange rows against panel repositories.
//!
//! ```text
//!   export(filter) ──► rows ──► translators ──► validate(rows)
//!                                                   │
//!                                                   ▼
//!                                      apply(rows, options) ──► repositories
//! ```
//!
//! Every row is checked against the current source text hash. Apply polls
//! the request's cancel signal between rows and stops at the first failed
//! row unless `continue_on_error` is set.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use backoffice_core::permissions::{
    authorize, TRANSLATIONS_EXPORT, TRANSLATIONS_IMPORT_APPLY, TRANSLATIONS_IMPORT_VALIDATE,
};
use backoffice_core::record::{lookup_in, value_to_string, DATA};
use backoffice_core::{
    AdminContext, AdminError, Authorizer, CreateTranslationInput, FeatureGate, FeatureKey,
    ListOptions, Predicate, Record, Repository, Result,
};

use super::codec::ExchangeFormat;
use super::row::{
    compute_source_hash, ExchangeResult, ExchangeRow, RowResult, ROW_CONTENT_STATUSES,
};
use crate::jobs::{ExchangeJob, JobKind, JobProgress, JobStore, DEFAULT_POLL_BASE};
use crate::locale::normalize_locale;

/// Resource name used for authorization checks.
const TRANSLATIONS_RESOURCE: &str = "translations";

/// Which records and fields to export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFilter {
    /// Resources to export; empty means every registered resource
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub entity_ids: Vec<String>,
    #[serde(default)]
    pub source_locale: String,
    /// Target locales; empty means the locales already present in each group
    #[serde(default)]
    pub target_locales: Vec<String>,
    /// Field paths; empty means `title` plus the string fields under `data`
    #[serde(default)]
    pub field_paths: Vec<String>,
    #[serde(default)]
    pub include_source_hash: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportResult {
    pub rows: Vec<ExchangeRow>,
    pub row_count: usize,
    pub format: ExchangeFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOptions {
    #[serde(default)]
    pub allow_create_missing: bool,
    #[serde(default)]
    pub allow_source_hash_override: bool,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub dry_run: bool,
}

/// Row that passed structural and hash checks.
struct PreparedRow {
    repository: Arc<dyn Repository>,
    source: Record,
    target: Option<Record>,
    group_id: String,
}

/// Translation exchange over a set of named repositories.
pub struct ExchangeService {
    repositories: BTreeMap<String, Arc<dyn Repository>>,
    jobs: Arc<dyn JobStore>,
    authorizer: Option<Arc<dyn Authorizer>>,
    features: Option<Arc<dyn FeatureGate>>,
    poll_base: String,
}

impl ExchangeService {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self {
            repositories: BTreeMap::new(),
            jobs,
            authorizer: None,
            features: None,
            poll_base: DEFAULT_POLL_BASE.to_string(),
        }
    }

    pub fn with_repository(mut self, resource: &str, repository: Arc<dyn Repository>) -> Self {
        self.repositories
            .insert(resource.trim().to_lowercase(), repository);
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn with_features(mut self, features: Arc<dyn FeatureGate>) -> Self {
        self.features = Some(features);
        self
    }

    pub fn with_poll_base(mut self, poll_base: impl Into<String>) -> Self {
        self.poll_base = poll_base.into();
        self
    }

    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.repositories.keys().map(String::as_str)
    }

    fn repository(&self, resource: &str) -> Option<&Arc<dyn Repository>> {
        self.repositories.get(&resource.trim().to_lowercase())
    }

    async fn gate(&self, ctx: &AdminContext, permission: &str) -> Result<()> {
        if let Some(features) = &self.features {
            features.require(FeatureKey::TranslationExchange)?;
        }
        authorize(self.authorizer.as_deref(), ctx, permission, TRANSLATIONS_RESOURCE).await
    }

    // ========================================================================
    // Export
    // ========================================================================

    pub async fn export(
        &self,
        ctx: &AdminContext,
        filter: &ExportFilter,
        format: ExchangeFormat,
    ) -> Result<ExportResult> {
        self.gate(ctx, TRANSLATIONS_EXPORT).await?;

        let resources: Vec<String> = if filter.resources.is_empty() {
            self.repositories.keys().cloned().collect()
        } else {
            filter.resources.iter().map(|r| r.trim().to_lowercase()).collect()
        };

        let mut rows = Vec::new();
        for resource in &resources {
            let repository = self
                .repository(resource)
                .ok_or_else(|| AdminError::not_found("resource", resource.as_str()))?;
            let records = repository.list(ctx, &ListOptions::new()).await?.records;
            rows.extend(export_resource(ctx, resource, &records, filter)?);
        }

        info!(
            resources = resources.len(),
            rows = rows.len(),
            format = %format,
            "Translation export finished"
        );
        Ok(ExportResult {
            row_count: rows.len(),
            rows,
            format,
        })
    }

    // ========================================================================
    // Validate / apply
    // ========================================================================

    /// Check rows without writing. `translated_text` is not required.
    pub async fn validate(
        &self,
        ctx: &AdminContext,
        rows: &[ExchangeRow],
    ) -> Result<ExchangeResult> {
        self.gate(ctx, TRANSLATIONS_IMPORT_VALIDATE).await?;

        let mut results = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            ctx.check_cancelled()?;
            let result = match self.prepare(ctx, index, row, false, false).await {
                Ok(prepared) => RowResult::success(index, row)
                    .with_meta("target_exists", prepared.target.is_some()),
                Err(failed) => failed,
            };
            results.push(result);
        }

        let result = ExchangeResult::new(results, true, false);
        debug!(
            processed = result.summary.processed,
            failed = result.summary.failed,
            "Translation rows validated"
        );
        Ok(result)
    }

    /// Write translated text into target-locale records.
    pub async fn apply(
        &self,
        ctx: &AdminContext,
        rows: &[ExchangeRow],
        options: ApplyOptions,
    ) -> Result<ExchangeResult> {
        self.gate(ctx, TRANSLATIONS_IMPORT_APPLY).await?;

        let mut results = Vec::with_capacity(rows.len());
        let mut aborted = false;
        for (index, row) in rows.iter().enumerate() {
            ctx.check_cancelled()?;
            let result = self.apply_row(ctx, index, row, options).await;
            let failed = result.status.is_failure();
            results.push(result);
            if failed && !options.continue_on_error {
                aborted = index + 1 < rows.len();
                break;
            }
        }

        let result = ExchangeResult::new(results, options.dry_run, aborted);
        info!(
            processed = result.summary.processed,
            succeeded = result.summary.succeeded,
            failed = result.summary.failed,
            dry_run = options.dry_run,
            aborted = result.aborted,
            "Translation import applied"
        );
        Ok(result)
    }

    async fn apply_row(
        &self,
        ctx: &AdminContext,
        index: usize,
        row: &ExchangeRow,
        options: ApplyOptions,
    ) -> RowResult {
        let prepared = match self
            .prepare(ctx, index, row, true, options.allow_source_hash_override)
            .await
        {
            Ok(prepared) => prepared,
            Err(failed) => return failed,
        };

        let in_data = field_in_data(&prepared.source, &row.field_path);
        match prepared.target {
            Some(target) => {
                let target_id = target.id().unwrap_or_default();
                let current =
                    placed_field(&target, in_data, &row.field_path).and_then(value_to_string);
                if current.as_deref() == Some(row.translated_text.as_str()) {
                    return RowResult::success(index, row)
                        .with_meta("target_id", target_id)
                        .with_meta("noop", true);
                }
                if options.dry_run {
                    return RowResult::success(index, row)
                        .with_meta("target_id", target_id)
                        .with_meta("dry_run", true);
                }
                let patch = field_patch(&target, in_data, &row.field_path, &row.translated_text);
                match prepared.repository.update(ctx, &target_id, patch).await {
                    Ok(_) => RowResult::success(index, row).with_meta("target_id", target_id),
                    Err(e) => row_error(index, row, &e),
                }
            }
            None if !options.allow_create_missing => RowResult::error(
                index,
                row,
                "missing_translation",
                format!(
                    "{} has no {} translation",
                    row.entity_id,
                    normalize_locale(&row.target_locale)
                ),
                Some("target_locale"),
            ),
            None if options.dry_run => {
                RowResult::success(index, row).with_meta("would_create", true)
            }
            None => {
                let translation = build_translation(&prepared.source, &prepared.group_id, row);
                let input = CreateTranslationInput {
                    source: prepared.source.clone(),
                    translation: translation.clone(),
                    target_locale: normalize_locale(&row.target_locale),
                };
                let created = match prepared.repository.translation_creator() {
                    Some(creator) => creator.create_translation(ctx, input).await,
                    None => prepared.repository.create(ctx, translation).await,
                };
                match created {
                    Ok(record) => RowResult::success(index, row)
                        .with_meta("target_id", record.id().unwrap_or_default())
                        .with_meta("created", true),
                    Err(e) => row_error(index, row, &e),
                }
            }
        }
    }

    /// Structural checks, source lookup, hash comparison and target lookup.
    async fn prepare(
        &self,
        ctx: &AdminContext,
        index: usize,
        row: &ExchangeRow,
        require_translation: bool,
        allow_override: bool,
    ) -> std::result::Result<PreparedRow, RowResult> {
        for (field, value) in [
            ("resource", &row.resource),
            ("entity_id", &row.entity_id),
            ("source_locale", &row.source_locale),
            ("target_locale", &row.target_locale),
            ("field_path", &row.field_path),
        ] {
            if value.trim().is_empty() {
                return Err(RowResult::error(
                    index,
                    row,
                    "missing_field",
                    format!("{field} is required"),
                    Some(field),
                ));
            }
        }

        let Some(repository) = self.repository(&row.resource) else {
            return Err(RowResult::error(
                index,
                row,
                "unknown_resource",
                format!("unknown resource {}", row.resource),
                Some("resource"),
            ));
        };

        let status = row.status.trim().to_lowercase();
        if !status.is_empty() && !ROW_CONTENT_STATUSES.contains(&status.as_str()) {
            return Err(RowResult::error(
                index,
                row,
                "invalid_status",
                format!("status must be one of {}", ROW_CONTENT_STATUSES.join(", ")),
                Some("status"),
            ));
        }

        let source_locale = normalize_locale(&row.source_locale);
        let target_locale = normalize_locale(&row.target_locale);
        if source_locale == target_locale {
            return Err(RowResult::error(
                index,
                row,
                "invalid_locale",
                "target_locale must differ from source_locale",
                Some("target_locale"),
            ));
        }
        if require_translation && row.translated_text.trim().is_empty() {
            return Err(RowResult::error(
                index,
                row,
                "missing_translated_text",
                "translated_text is required",
                Some("translated_text"),
            ));
        }

        let source = repository
            .get(ctx, &row.entity_id)
            .await
            .map_err(|e| row_error(index, row, &e))?;

        if let Some(locale) = source.locale() {
            if normalize_locale(locale) != source_locale {
                return Err(RowResult::error(
                    index,
                    row,
                    "locale_mismatch",
                    format!("{} is in locale {locale}", row.entity_id),
                    Some("source_locale"),
                ));
            }
        }

        let group_id = source.group_or_id().unwrap_or_default();
        if !row.translation_group_id.is_empty() && row.translation_group_id != group_id {
            return Err(RowResult::error(
                index,
                row,
                "group_mismatch",
                format!("{} belongs to group {group_id}", row.entity_id),
                Some("translation_group_id"),
            ));
        }

        let Some(current_text) = source.field(&row.field_path).and_then(value_to_string) else {
            return Err(RowResult::error(
                index,
                row,
                "unknown_field",
                format!("{} has no text at {}", row.entity_id, row.field_path),
                Some("field_path"),
            ));
        };
        let current_hash = compute_source_hash(&current_text);
        if !row.source_hash.is_empty() && row.source_hash != current_hash && !allow_override {
            return Err(RowResult::hash_conflict(index, row, &current_hash));
        }

        let opts = ListOptions::new()
            .with_predicate(Predicate::eq("translation_group_id", group_id.as_str()));
        let siblings = repository
            .list(ctx, &opts)
            .await
            .map_err(|e| row_error(index, row, &e))?
            .records;
        let target = siblings
            .into_iter()
            .find(|s| s.locale().map(normalize_locale).as_deref() == Some(target_locale.as_str()));

        Ok(PreparedRow {
            repository: Arc::clone(repository),
            source,
            target,
            group_id,
        })
    }

    // ========================================================================
    // Async jobs
    // ========================================================================

    /// Run an export as a tracked job.
    pub async fn export_async(
        &self,
        ctx: &AdminContext,
        filter: &ExportFilter,
        format: ExchangeFormat,
    ) -> Result<ExchangeJob> {
        self.gate(ctx, TRANSLATIONS_EXPORT).await?;
        let mut job = ExchangeJob::new(ctx, JobKind::Export, TRANSLATIONS_EXPORT, &self.poll_base);
        self.jobs.insert(job.clone()).await?;

        job.start(0);
        self.jobs.update(job.clone()).await?;

        match self.export(ctx, filter, format).await {
            Ok(result) => {
                let progress = JobProgress {
                    total: result.row_count,
                    processed: result.row_count,
                    succeeded: result.row_count,
                    failed: 0,
                };
                job.complete(progress, serde_json::to_value(&result)?);
            }
            Err(e) => job.fail(e.to_string(), None),
        }
        self.jobs.update(job.clone()).await?;
        info!(job_id = %job.id, status = ?job.status, "Export job finished");
        Ok(job)
    }

    /// Run an apply as a tracked job. The job fails when the batch aborted
    /// or no row succeeded.
    pub async fn apply_async(
        &self,
        ctx: &AdminContext,
        rows: &[ExchangeRow],
        options: ApplyOptions,
    ) -> Result<ExchangeJob> {
        self.gate(ctx, TRANSLATIONS_IMPORT_APPLY).await?;
        let mut job = ExchangeJob::new(
            ctx,
            JobKind::ImportApply,
            TRANSLATIONS_IMPORT_APPLY,
            &self.poll_base,
        );
        self.jobs.insert(job.clone()).await?;

        job.start(rows.len());
        self.jobs.update(job.clone()).await?;

        match self.apply(ctx, rows, options).await {
            Ok(result) => {
                let mut progress = JobProgress::from(result.summary);
                progress.total = rows.len();
                let value = serde_json::to_value(&result)?;
                let nothing_applied = result.summary.processed > 0 && result.summary.succeeded == 0;
                if result.aborted || nothing_applied {
                    job.progress = progress;
                    job.fail("import stopped on a failed row", Some(value));
                } else {
                    job.complete(progress, value);
                }
            }
            Err(e) => job.fail(e.to_string(), None),
        }
        self.jobs.update(job.clone()).await?;
        info!(job_id = %job.id, status = ?job.status, "Import job finished");
        Ok(job)
    }

    /// Job status, readable only with the permission that created it.
    pub async fn job(&self, ctx: &AdminContext, id: &str) -> Result<ExchangeJob> {
        let job = self.jobs.get(id).await?;
        self.gate(ctx, &job.permission).await?;
        Ok(job)
    }
}

fn row_error(index: usize, row: &ExchangeRow, err: &AdminError) -> RowResult {
    RowResult::error(index, row, err.kind().as_str(), err.to_string(), None)
}

/// Rows for one resource.
fn export_resource(
    ctx: &AdminContext,
    resource: &str,
    records: &[Record],
    filter: &ExportFilter,
) -> Result<Vec<ExchangeRow>> {
    let source_locale = normalize_locale(&filter.source_locale);
    let target_filter: Vec<String> = filter
        .target_locales
        .iter()
        .map(|l| normalize_locale(l))
        .collect();

    // group -> locale -> record
    let mut groups: BTreeMap<String, BTreeMap<String, &Record>> = BTreeMap::new();
    for record in records {
        if let (Some(group), Some(locale)) = (record.group_or_id(), record.locale()) {
            groups
                .entry(group)
                .or_default()
                .insert(normalize_locale(locale), record);
        }
    }

    let mut rows = Vec::new();
    for record in records {
        ctx.check_cancelled()?;
        let (Some(id), Some(group)) = (record.id(), record.group_or_id()) else {
            continue;
        };
        let locale = record.locale().map(normalize_locale).unwrap_or_default();
        if !source_locale.is_empty() && locale != source_locale {
            continue;
        }
        if !filter.entity_ids.is_empty() && !filter.entity_ids.contains(&id) {
            continue;
        }

        let siblings = groups.get(&group);
        let targets: Vec<String> = if target_filter.is_empty() {
            siblings
                .map(|s| s.keys().cloned().collect())
                .unwrap_or_default()
        } else {
            target_filter.clone()
        };

        let fields = if filter.field_paths.is_empty() {
            translatable_fields(record)
        } else {
            filter.field_paths.clone()
        };

        for field_path in &fields {
            let in_data = field_in_data(record, field_path);
            let Some(source_text) =
                placed_field(record, in_data, field_path).and_then(value_to_string)
            else {
                continue;
            };
            for target_locale in targets.iter().filter(|t| **t != locale) {
                let target = siblings.and_then(|s| s.get(target_locale)).copied();
                let status = target
                    .and_then(Record::status)
                    .map(str::to_lowercase)
                    .filter(|s| ROW_CONTENT_STATUSES.contains(&s.as_str()))
                    .unwrap_or_else(|| "draft".to_string());
                rows.push(ExchangeRow {
                    resource: resource.to_string(),
                    entity_id: id.clone(),
                    translation_group_id: group.clone(),
                    source_locale: locale.clone(),
                    target_locale: target_locale.clone(),
                    field_path: field_path.clone(),
                    source_hash: if filter.include_source_hash {
                        compute_source_hash(&source_text)
                    } else {
                        String::new()
                    },
                    translated_text: target
                        .and_then(|t| placed_field(t, in_data, field_path))
                        .and_then(value_to_string)
                        .unwrap_or_default(),
                    path: target
                        .and_then(|t| t.str_field("path"))
                        .unwrap_or_default()
                        .to_string(),
                    title: record.str_field("title").unwrap_or_default().to_string(),
                    status,
                    notes: String::new(),
                    source_text: source_text.clone(),
                });
            }
        }
    }
    Ok(rows)
}

/// `title` plus every string field under `data`.
fn translatable_fields(record: &Record) -> Vec<String> {
    let mut fields = Vec::new();
    if record.str_field("title").is_some() {
        fields.push("title".to_string());
    }
    if let Some(data) = record.data() {
        fields.extend(
            data.iter()
                .filter(|(_, v)| v.is_string())
                .map(|(k, _)| k.clone()),
        );
    }
    fields
}

/// Whether `path` lives under the record's `data` object. Placement is
/// read from the source record so export and apply address the same slot.
fn field_in_data(record: &Record, path: &str) -> bool {
    record.lookup_path(path).is_none() && record.data().is_some()
}

fn placed_field<'a>(record: &'a Record, in_data: bool, path: &str) -> Option<&'a Value> {
    if in_data {
        record.data().and_then(|data| lookup_in(data, path))
    } else {
        record.lookup_path(path)
    }
}

fn set_path(map: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else {
        return;
    };
    let mut current = map;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = match entry {
            Value::Object(obj) => obj,
            _ => return,
        };
    }
    current.insert(last.to_string(), value);
}

/// Update patch setting one field, preserving siblings of nested paths.
fn field_patch(target: &Record, in_data: bool, path: &str, text: &str) -> Record {
    let value = Value::String(text.to_string());
    let first = path.split('.').next().unwrap_or(path);
    let mut patch = Record::new();
    if in_data {
        let mut data = Map::new();
        if let Some(existing) = target.data().and_then(|d| d.get(first)) {
            data.insert(first.to_string(), existing.clone());
        }
        set_path(&mut data, path, value);
        patch.insert(DATA, Value::Object(data));
    } else {
        let mut root = Map::new();
        if let Some(existing) = target.get(first) {
            root.insert(first.to_string(), existing.clone());
        }
        set_path(&mut root, path, value);
        for (key, value) in root {
            patch.insert(key, value);
        }
    }
    patch
}

/// New target-locale record cloned from the source.
fn build_translation(source: &Record, group_id: &str, row: &ExchangeRow) -> Record {
    let mut translation = source.clone();
    for key in ["id", "created_at", "updated_at", "published_at", "available_locales"] {
        translation.remove(key);
    }
    translation.insert("locale", normalize_locale(&row.target_locale));
    translation.insert("translation_group_id", group_id);
    let status = row.status.trim().to_lowercase();
    translation.insert("status", if status.is_empty() { "draft".to_string() } else { status });
    if !row.path.trim().is_empty() {
        translation.insert("path", row.path.trim());
    }

    let value = Value::String(row.translated_text.clone());
    if field_in_data(source, &row.field_path) {
        if let Some(Value::Object(data)) = translation.as_map_mut().get_mut(DATA) {
            set_path(data, &row.field_path, value);
        }
    } else {
        set_path(translation.as_map_mut(), &row.field_path, value);
    }
    translation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::RowStatus;
    use crate::jobs::{JobStatus, MemoryJobStore};
    use backoffice_core::{CancelSignal, FeatureFlags, MemoryRepository, StaticAuthorizer};
    use serde_json::json;

    async fn pages() -> Arc<MemoryRepository> {
        let repo = MemoryRepository::new("pages");
        repo.seed([
            Record::try_from(json!({
                "id": "page_1", "locale": "en", "translation_group_id": "tg_1",
                "title": "Home", "path": "/", "status": "published",
                "data": {"body": "Welcome", "order": 1}
            }))
            .unwrap(),
            Record::try_from(json!({
                "id": "page_2", "locale": "es", "translation_group_id": "tg_1",
                "title": "Inicio", "path": "/es", "status": "draft",
                "data": {"body": "Bienvenido", "order": 1}
            }))
            .unwrap(),
        ])
        .await;
        Arc::new(repo)
    }

    fn service(repo: Arc<MemoryRepository>) -> ExchangeService {
        ExchangeService::new(Arc::new(MemoryJobStore::new())).with_repository("pages", repo)
    }

    fn ctx() -> AdminContext {
        AdminContext::new("translator")
    }

    fn row(field: &str, target: &str, translated: &str) -> ExchangeRow {
        ExchangeRow {
            resource: "pages".into(),
            entity_id: "page_1".into(),
            source_locale: "en".into(),
            target_locale: target.into(),
            field_path: field.into(),
            translated_text: translated.into(),
            ..ExchangeRow::default()
        }
    }

    #[tokio::test]
    async fn test_export_rows_for_existing_locales() {
        let svc = service(pages().await);
        let filter = ExportFilter {
            source_locale: "en".into(),
            include_source_hash: true,
            ..ExportFilter::default()
        };
        let result = svc.export(&ctx(), &filter, ExchangeFormat::Csv).await.unwrap();

        assert_eq!(result.row_count, 2);
        let title = result.rows.iter().find(|r| r.field_path == "title").unwrap();
        assert_eq!(title.target_locale, "es");
        assert_eq!(title.translated_text, "Inicio");
        assert_eq!(title.source_hash, compute_source_hash("Home"));
        assert_eq!(title.path, "/es");
        assert_eq!(title.status, "draft");
        assert!(result.rows.iter().any(|r| r.field_path == "body"));
    }

    #[tokio::test]
    async fn test_reapplying_export_is_noop() {
        let repo = pages().await;
        let svc = service(repo.clone());
        let filter = ExportFilter {
            source_locale: "en".into(),
            target_locales: vec!["es".into()],
            include_source_hash: true,
            ..ExportFilter::default()
        };
        let before = repo.snapshot().await;
        let exported = svc.export(&ctx(), &filter, ExchangeFormat::Json).await.unwrap();
        let result = svc
            .apply(&ctx(), &exported.rows, ApplyOptions::default())
            .await
            .unwrap();

        assert_eq!(result.summary.succeeded, exported.row_count);
        assert_eq!(result.summary.failed, 0);
        assert!(result.results.iter().all(|r| r.metadata["noop"] == json!(true)));
        assert_eq!(repo.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_apply_updates_top_level_and_data_fields() {
        let repo = pages().await;
        let svc = service(repo.clone());
        let rows = vec![row("title", "es", "Portada"), row("body", "es", "Hola")];
        let result = svc.apply(&ctx(), &rows, ApplyOptions::default()).await.unwrap();
        assert_eq!(result.summary.succeeded, 2);

        let updated = repo.get(&ctx(), "page_2").await.unwrap();
        assert_eq!(updated.str_field("title"), Some("Portada"));
        assert_eq!(updated.field("body"), Some(&json!("Hola")));
        assert_eq!(updated.field("order"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_field_placement_follows_source_record() {
        let repo = Arc::new(MemoryRepository::new("pages"));
        repo.seed([
            Record::try_from(json!({
                "id": "a_en", "locale": "en", "translation_group_id": "tg_a",
                "data": {"body": "Hello"}
            }))
            .unwrap(),
            Record::try_from(json!({
                "id": "a_fr", "locale": "fr", "translation_group_id": "tg_a",
                "body": "legacy", "data": {"body": "Bonjour"}
            }))
            .unwrap(),
        ])
        .await;
        let svc = service(repo.clone());

        let filter = ExportFilter {
            source_locale: "en".into(),
            ..ExportFilter::default()
        };
        let exported = svc.export(&ctx(), &filter, ExchangeFormat::Json).await.unwrap();
        let body = exported.rows.iter().find(|r| r.field_path == "body").unwrap();
        assert_eq!(body.translated_text, "Bonjour");

        let mut update = body.clone();
        update.translated_text = "Salut".into();
        let result = svc.apply(&ctx(), &[update], ApplyOptions::default()).await.unwrap();
        assert_eq!(result.summary.succeeded, 1);

        let target = repo.get(&ctx(), "a_fr").await.unwrap();
        assert_eq!(target.data().unwrap().get("body"), Some(&json!("Salut")));
        assert_eq!(target.str_field("body"), Some("legacy"));
    }

    #[tokio::test]
    async fn test_hash_mismatch_conflicts_unless_overridden() {
        let svc = service(pages().await);
        let mut stale = row("title", "es", "Portada");
        stale.source_hash = "OLD".into();

        let result = svc.apply(&ctx(), &[stale.clone()], ApplyOptions::default()).await.unwrap();
        let conflict = result.results[0].conflict.as_ref().unwrap();
        assert_eq!(result.results[0].status, RowStatus::Conflict);
        assert_eq!(conflict.conflict_type, "source_hash_mismatch");
        assert_eq!(
            conflict.current_source_hash.as_deref(),
            Some(compute_source_hash("Home").as_str())
        );
        assert_eq!(conflict.provided_source_hash.as_deref(), Some("OLD"));

        let options = ApplyOptions {
            allow_source_hash_override: true,
            ..ApplyOptions::default()
        };
        let result = svc.apply(&ctx(), &[stale], options).await.unwrap();
        assert_eq!(result.summary.succeeded, 1);
    }

    #[tokio::test]
    async fn test_missing_target_requires_create_flag() {
        let repo = pages().await;
        let svc = service(repo.clone());
        let rows = vec![row("title", "fr", "Accueil"), row("title", "es", "Portada")];

        let result = svc.apply(&ctx(), &rows, ApplyOptions::default()).await.unwrap();
        assert!(result.aborted);
        assert_eq!(result.summary.processed, 1);
        assert_eq!(result.results[0].error.as_ref().unwrap().code, "missing_translation");

        let options = ApplyOptions {
            allow_create_missing: true,
            ..ApplyOptions::default()
        };
        let result = svc.apply(&ctx(), &rows, options).await.unwrap();
        assert_eq!(result.summary.succeeded, 2);
        assert_eq!(result.results[0].metadata["created"], json!(true));

        let created = repo
            .snapshot()
            .await
            .into_iter()
            .find(|r| r.locale() == Some("fr"))
            .unwrap();
        assert_eq!(created.translation_group_id(), Some("tg_1"));
        assert_eq!(created.str_field("title"), Some("Accueil"));
        assert_eq!(created.status(), Some("draft"));
    }

    #[tokio::test]
    async fn test_continue_on_error_processes_every_row() {
        let svc = service(pages().await);
        let rows = vec![
            row("title", "fr", "Accueil"),
            row("missing.field", "es", "x"),
            row("title", "es", "Portada"),
        ];
        let options = ApplyOptions {
            continue_on_error: true,
            ..ApplyOptions::default()
        };
        let result = svc.apply(&ctx(), &rows, options).await.unwrap();
        assert!(!result.aborted);
        assert_eq!(result.summary.processed, 3);
        assert_eq!(result.summary.failed, 2);
        assert_eq!(result.summary.succeeded, 1);
        assert_eq!(result.results[1].error.as_ref().unwrap().code, "unknown_field");
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let repo = pages().await;
        let svc = service(repo.clone());
        let before = repo.snapshot().await;
        let options = ApplyOptions {
            dry_run: true,
            allow_create_missing: true,
            ..ApplyOptions::default()
        };
        let rows = vec![row("title", "es", "Portada"), row("title", "fr", "Accueil")];
        let result = svc.apply(&ctx(), &rows, options).await.unwrap();
        assert!(result.dry_run);
        assert_eq!(result.summary.succeeded, 2);
        assert_eq!(repo.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_validate_reports_structural_errors() {
        let svc = service(pages().await);
        let mut bad_status = row("title", "es", "");
        bad_status.status = "published".into();
        let rows = vec![
            row("title", "es", ""),
            ExchangeRow {
                resource: "posts".into(),
                ..row("title", "es", "")
            },
            bad_status,
            row("title", "en", ""),
        ];
        let result = svc.validate(&ctx(), &rows).await.unwrap();
        let codes: Vec<_> = result
            .results
            .iter()
            .map(|r| r.error.as_ref().map(|e| e.code.clone()))
            .collect();
        assert_eq!(
            codes,
            vec![
                None,
                Some("unknown_resource".to_string()),
                Some("invalid_status".to_string()),
                Some("invalid_locale".to_string()),
            ]
        );
        assert_eq!(result.summary.succeeded, 1);
    }

    #[tokio::test]
    async fn test_cancelled_apply_stops() {
        let svc = service(pages().await);
        let (handle, signal) = CancelSignal::pair();
        handle.cancel();
        let ctx = ctx().with_cancel(signal);
        let err = svc
            .apply(&ctx, &[row("title", "es", "Portada")], ApplyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::Cancelled));
    }

    #[tokio::test]
    async fn test_permissions_and_feature_gate() {
        let authorizer =
            StaticAuthorizer::new().grant("translator", [TRANSLATIONS_IMPORT_VALIDATE]);
        let svc = service(pages().await).with_authorizer(Arc::new(authorizer));
        assert!(svc.validate(&ctx(), &[]).await.is_ok());
        let err = svc.apply(&ctx(), &[], ApplyOptions::default()).await.unwrap_err();
        assert_eq!(err.status().as_u16(), 403);

        let svc = service(pages().await).with_features(Arc::new(FeatureFlags::none()));
        let err = svc.validate(&ctx(), &[]).await.unwrap_err();
        assert_eq!(err.text_code(), "FEATURE_DISABLED");
    }

    #[tokio::test]
    async fn test_async_jobs_are_permission_gated() {
        let svc = service(pages().await).with_authorizer(Arc::new(
            StaticAuthorizer::new()
                .grant("translator", ["admin.translations.*"])
                .grant("viewer", [TRANSLATIONS_EXPORT]),
        ));
        let job = svc
            .apply_async(&ctx(), &[row("title", "es", "Portada")], ApplyOptions::default())
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress.total, 1);
        assert_eq!(job.progress.succeeded, 1);

        let polled = svc.job(&ctx(), &job.id).await.unwrap();
        assert_eq!(polled, job);
        let err = svc.job(&AdminContext::new("viewer"), &job.id).await.unwrap_err();
        assert_eq!(err.status().as_u16(), 403);

        let export = svc
            .export_async(
                &AdminContext::new("viewer"),
                &ExportFilter::default(),
                ExchangeFormat::Csv,
            )
            .await
            .unwrap();
        assert_eq!(export.kind, JobKind::Export);
        assert_eq!(export.status, JobStatus::Completed);
        assert!(svc.job(&AdminContext::new("viewer"), &export.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_apply_job_keeps_partial_result() {
        let svc = service(pages().await);
        let job = svc
            .apply_async(&ctx(), &[row("title", "fr", "Accueil")], ApplyOptions::default())
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress.failed, 1);
        assert!(job.result.is_some());
    }
}
