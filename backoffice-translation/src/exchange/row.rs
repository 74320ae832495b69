//! Exchange rows, per-row results and batch summaries.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[cfg(feature = "typescript")]
use ts_rs::TS;

use backoffice_core::Metadata;

/// Columns in canonical order.
pub const EXCHANGE_COLUMNS: &[&str] = &[
    "resource",
    "entity_id",
    "translation_group_id",
    "source_locale",
    "target_locale",
    "field_path",
    "source_text",
    "translated_text",
    "source_hash",
    "path",
    "title",
    "status",
    "notes",
];

/// Columns a CSV header must carry.
pub const REQUIRED_COLUMNS: &[&str] = &[
    "resource",
    "entity_id",
    "source_locale",
    "target_locale",
    "field_path",
];

/// Columns whose cell text is kept verbatim on decode.
pub const FREE_TEXT_COLUMNS: &[&str] = &["source_text", "translated_text", "title", "notes"];

/// Content statuses a row may carry.
pub const ROW_CONTENT_STATUSES: &[&str] = &["draft", "review"];

/// One translatable field of one record in one target locale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ExchangeRow {
    pub resource: String,
    pub entity_id: String,
    #[serde(default)]
    pub translation_group_id: String,
    #[serde(default)]
    pub source_locale: String,
    pub target_locale: String,
    pub field_path: String,
    #[serde(default)]
    pub source_text: String,
    #[serde(default)]
    pub translated_text: String,
    #[serde(default)]
    pub source_hash: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub notes: String,
}

impl ExchangeRow {
    /// Cell value by column name.
    pub fn column(&self, name: &str) -> &str {
        match name {
            "resource" => &self.resource,
            "entity_id" => &self.entity_id,
            "translation_group_id" => &self.translation_group_id,
            "source_locale" => &self.source_locale,
            "target_locale" => &self.target_locale,
            "field_path" => &self.field_path,
            "source_text" => &self.source_text,
            "translated_text" => &self.translated_text,
            "source_hash" => &self.source_hash,
            "path" => &self.path,
            "title" => &self.title,
            "status" => &self.status,
            "notes" => &self.notes,
            _ => "",
        }
    }

    /// Set a cell by column name; unknown columns are ignored.
    pub fn set_column(&mut self, name: &str, value: String) {
        let slot = match name {
            "resource" => &mut self.resource,
            "entity_id" => &mut self.entity_id,
            "translation_group_id" => &mut self.translation_group_id,
            "source_locale" => &mut self.source_locale,
            "target_locale" => &mut self.target_locale,
            "field_path" => &mut self.field_path,
            "source_text" => &mut self.source_text,
            "translated_text" => &mut self.translated_text,
            "source_hash" => &mut self.source_hash,
            "path" => &mut self.path,
            "title" => &mut self.title,
            "status" => &mut self.status,
            "notes" => &mut self.notes,
            _ => return,
        };
        *slot = value;
    }
}

/// Hex SHA-256 of the source text.
pub fn compute_source_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Per-row outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Success,
    Error,
    Conflict,
    Skipped,
    /// Any status a store reported that is not in the vocabulary
    #[serde(other)]
    Unknown,
}

impl RowStatus {
    /// Unknown statuses collapse to `error`.
    pub fn normalized(self) -> Self {
        match self {
            Self::Unknown => Self::Error,
            other => other,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.normalized(), Self::Error | Self::Conflict)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowConflict {
    #[serde(rename = "type")]
    pub conflict_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_source_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provided_source_hash: Option<String>,
}

/// Result for one input row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowResult {
    pub index: usize,
    pub resource: String,
    pub entity_id: String,
    pub target_locale: String,
    pub field_path: String,
    pub status: RowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RowError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<RowConflict>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl RowResult {
    fn base(index: usize, row: &ExchangeRow, status: RowStatus) -> Self {
        Self {
            index,
            resource: row.resource.clone(),
            entity_id: row.entity_id.clone(),
            target_locale: row.target_locale.clone(),
            field_path: row.field_path.clone(),
            status,
            error: None,
            conflict: None,
            metadata: Metadata::new(),
        }
    }

    pub fn success(index: usize, row: &ExchangeRow) -> Self {
        Self::base(index, row, RowStatus::Success)
    }

    pub fn skipped(index: usize, row: &ExchangeRow) -> Self {
        Self::base(index, row, RowStatus::Skipped)
    }

    pub fn error(
        index: usize,
        row: &ExchangeRow,
        code: &str,
        message: impl Into<String>,
        field: Option<&str>,
    ) -> Self {
        let mut result = Self::base(index, row, RowStatus::Error);
        result.error = Some(RowError {
            code: code.to_string(),
            message: message.into(),
            field: field.map(str::to_string),
        });
        result
    }

    pub fn hash_conflict(index: usize, row: &ExchangeRow, current: &str) -> Self {
        let mut result = Self::base(index, row, RowStatus::Conflict);
        result.conflict = Some(RowConflict {
            conflict_type: "source_hash_mismatch".into(),
            current_source_hash: Some(current.to_string()),
            provided_source_hash: Some(row.source_hash.clone()),
        });
        result
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Batch counters. `processed == succeeded + failed + skipped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
pub struct ExchangeSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ExchangeSummary {
    /// Normalize row statuses, then count them.
    pub fn tally(results: &mut [RowResult]) -> Self {
        let mut summary = Self::default();
        for result in results.iter_mut() {
            result.status = result.status.normalized();
            summary.processed += 1;
            match result.status {
                RowStatus::Success => summary.succeeded += 1,
                RowStatus::Skipped => summary.skipped += 1,
                RowStatus::Error | RowStatus::Conflict | RowStatus::Unknown => summary.failed += 1,
            }
        }
        summary
    }
}

/// Outcome of validate or apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeResult {
    pub summary: ExchangeSummary,
    pub results: Vec<RowResult>,
    #[serde(default)]
    pub dry_run: bool,
    /// A failed row left later rows unprocessed
    #[serde(default)]
    pub aborted: bool,
}

impl ExchangeResult {
    pub fn new(mut results: Vec<RowResult>, dry_run: bool, aborted: bool) -> Self {
        let summary = ExchangeSummary::tally(&mut results);
        Self {
            summary,
            results,
            dry_run,
            aborted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_hash_is_sha256_hex() {
        assert_eq!(
            compute_source_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_unknown_status_collapses_to_error() {
        let raw = serde_json::json!({
            "index": 0, "resource": "pages", "entity_id": "p1", "target_locale": "es",
            "field_path": "title", "status": "exploded"
        });
        let result: RowResult = serde_json::from_value(raw).unwrap();
        assert_eq!(result.status, RowStatus::Unknown);

        let batch = ExchangeResult::new(vec![result], false, false);
        assert_eq!(batch.results[0].status, RowStatus::Error);
        assert_eq!(batch.summary.failed, 1);
        assert_eq!(batch.summary.processed, 1);
    }

    #[test]
    fn test_summary_counts() {
        let row = ExchangeRow::default();
        let mut results = vec![
            RowResult::success(0, &row),
            RowResult::hash_conflict(1, &row, "abc"),
            RowResult::skipped(2, &row),
            RowResult::error(3, &row, "invalid_row", "bad", None),
        ];
        let summary = ExchangeSummary::tally(&mut results);
        assert_eq!(summary.processed, 4);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_columns_round_trip_by_name() {
        let mut row = ExchangeRow::default();
        for column in EXCHANGE_COLUMNS {
            row.set_column(column, format!("v-{column}"));
        }
        row.set_column("unknown", "ignored".into());
        for column in EXCHANGE_COLUMNS {
            assert_eq!(row.column(column), format!("v-{column}"));
        }
    }
}
