//! CSV and JSON encoding of exchange rows.
//!
//! CSV headers are matched case- and order-insensitively; unknown columns are
//! dropped. JSON accepts either a bare array of rows or `{"rows": [...]}`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use backoffice_core::{AdminError, Result};

use super::row::{
    compute_source_hash, ExchangeRow, EXCHANGE_COLUMNS, FREE_TEXT_COLUMNS, REQUIRED_COLUMNS,
};

/// Wire format of an exchange payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeFormat {
    Csv,
    Json,
}

impl ExchangeFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Json => "application/json",
        }
    }

    /// Guess the format from a file name extension.
    pub fn from_path(path: &str) -> Result<Self> {
        let ext = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
        ext.parse()
    }
}

impl fmt::Display for ExchangeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeFormat {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" | "text/csv" => Ok(Self::Csv),
            "json" | "application/json" => Ok(Self::Json),
            other => Err(AdminError::UnsupportedFormat(other.to_string())),
        }
    }
}

fn invalid_payload(field: &str, message: impl Into<String>, format: ExchangeFormat) -> AdminError {
    AdminError::invalid_field(field, message)
        .with_metadata("code", json!("invalid_payload"))
        .with_metadata("format", json!(format.as_str()))
}

fn header_key(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .replace([' ', '-'], "_")
}

/// Stateless row codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExchangeCodec;

impl ExchangeCodec {
    pub fn decode(format: ExchangeFormat, input: &[u8]) -> Result<Vec<ExchangeRow>> {
        match format {
            ExchangeFormat::Csv => Self::decode_csv(input),
            ExchangeFormat::Json => Self::decode_json(input),
        }
    }

    pub fn encode(format: ExchangeFormat, rows: &[ExchangeRow]) -> Result<Vec<u8>> {
        match format {
            ExchangeFormat::Csv => Self::encode_csv(rows).map(String::into_bytes),
            ExchangeFormat::Json => Ok(serde_json::to_vec_pretty(rows)?),
        }
    }

    pub fn decode_csv(input: &[u8]) -> Result<Vec<ExchangeRow>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(input);

        let headers = reader
            .headers()
            .map_err(|e| {
                invalid_payload(
                    "header",
                    format!("unreadable CSV header: {e}"),
                    ExchangeFormat::Csv,
                )
            })?
            .clone();

        // Header position -> canonical column
        let columns: Vec<Option<&'static str>> = headers
            .iter()
            .map(|h| {
                let key = header_key(h);
                EXCHANGE_COLUMNS.iter().copied().find(|c| *c == key)
            })
            .collect();

        for required in REQUIRED_COLUMNS {
            if !columns.iter().any(|c| c == &Some(*required)) {
                return Err(invalid_payload(
                    required,
                    format!("missing required column {required}"),
                    ExchangeFormat::Csv,
                ));
            }
        }

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                invalid_payload("row", format!("row {}: {e}", line + 1), ExchangeFormat::Csv)
                    .with_metadata("index", json!(line))
            })?;
            let mut row = ExchangeRow::default();
            for (cell, column) in record.iter().zip(&columns) {
                if let Some(column) = column {
                    let cell = if FREE_TEXT_COLUMNS.contains(column) {
                        cell
                    } else {
                        cell.trim()
                    };
                    row.set_column(column, cell.to_string());
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }

    pub fn decode_json(input: &[u8]) -> Result<Vec<ExchangeRow>> {
        let value: Value = serde_json::from_slice(input).map_err(|e| {
            invalid_payload("payload", format!("invalid JSON: {e}"), ExchangeFormat::Json)
        })?;
        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut obj) => match obj.remove("rows") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(invalid_payload(
                        "rows",
                        "expected an array of rows",
                        ExchangeFormat::Json,
                    ))
                }
            },
            _ => {
                return Err(invalid_payload(
                    "payload",
                    "expected an array of rows",
                    ExchangeFormat::Json,
                ))
            }
        };

        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                serde_json::from_value(item).map_err(|e| {
                    invalid_payload("row", format!("row {index}: {e}"), ExchangeFormat::Json)
                        .with_metadata("index", json!(index))
                })
            })
            .collect()
    }

    /// Header plus one line per row, columns in canonical order.
    pub fn encode_csv(rows: &[ExchangeRow]) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let write_err = |e: csv::Error| AdminError::Internal(format!("CSV write failed: {e}"));

        writer.write_record(EXCHANGE_COLUMNS).map_err(write_err)?;
        for row in rows {
            writer
                .write_record(EXCHANGE_COLUMNS.iter().map(|c| row.column(c)))
                .map_err(write_err)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| AdminError::Internal(format!("CSV flush failed: {}", e.error())))?;
        String::from_utf8(bytes).map_err(|e| AdminError::Internal(e.to_string()))
    }

    /// Example row shipped with template downloads.
    pub fn example_row() -> ExchangeRow {
        ExchangeRow {
            resource: "pages".into(),
            entity_id: "page_1".into(),
            translation_group_id: "tg_1".into(),
            source_locale: "en".into(),
            target_locale: "es".into(),
            field_path: "title".into(),
            source_text: "Home".into(),
            translated_text: "Inicio".into(),
            source_hash: compute_source_hash("Home"),
            path: "/es".into(),
            title: "Home".into(),
            status: "draft".into(),
            notes: String::new(),
        }
    }

    pub fn template_csv() -> Result<String> {
        Self::encode_csv(&[Self::example_row()])
    }

    pub fn template_json() -> Value {
        json!({
            "columns": EXCHANGE_COLUMNS,
            "required_columns": REQUIRED_COLUMNS,
            "rows": [Self::example_row()],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backoffice_core::ErrorKind;

    #[test]
    fn test_csv_headers_are_case_and_order_insensitive() {
        let input = "Target_Locale,FIELD_PATH,entity_id,Resource,source_locale,extra\n\
                     es,title,page_1,pages,en,ignored\n";
        let rows = ExchangeCodec::decode_csv(input.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].resource, "pages");
        assert_eq!(rows[0].target_locale, "es");
        assert_eq!(rows[0].field_path, "title");
        assert_eq!(rows[0].notes, "");
    }

    #[test]
    fn test_csv_missing_required_column() {
        let input = "resource,entity_id,source_locale,target_locale\npages,p1,en,es\n";
        let err = ExchangeCodec::decode_csv(input.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let meta = err.metadata();
        assert_eq!(meta["field"], "field_path");
        assert_eq!(meta["format"], "csv");
        assert_eq!(meta["code"], "invalid_payload");
    }

    #[test]
    fn test_template_decodes_back() {
        let template = ExchangeCodec::template_csv().unwrap();
        let header = template.lines().next().unwrap();
        assert_eq!(header, EXCHANGE_COLUMNS.join(","));

        let rows = ExchangeCodec::decode_csv(template.as_bytes()).unwrap();
        assert_eq!(rows, vec![ExchangeCodec::example_row()]);
    }

    #[test]
    fn test_csv_keeps_text_whitespace_and_trims_keys() {
        let mut row = ExchangeCodec::example_row();
        row.source_text = "  Hello ".into();
        row.source_hash = compute_source_hash(&row.source_text);
        row.translated_text = "Hola ".into();
        let csv = ExchangeCodec::encode_csv(std::slice::from_ref(&row)).unwrap();

        let decoded = ExchangeCodec::decode_csv(csv.as_bytes()).unwrap();
        assert_eq!(decoded, vec![row.clone()]);
        assert_eq!(compute_source_hash(&decoded[0].source_text), row.source_hash);

        let padded = "resource,entity_id,source_locale,target_locale,field_path,translated_text\n\
                      pages , page_1,en, es ,title, Hola \n";
        let rows = ExchangeCodec::decode_csv(padded.as_bytes()).unwrap();
        assert_eq!(rows[0].resource, "pages");
        assert_eq!(rows[0].target_locale, "es");
        assert_eq!(rows[0].translated_text, " Hola ");
    }

    #[test]
    fn test_json_accepts_wrapped_rows() {
        let input = serde_json::to_vec(&ExchangeCodec::template_json()).unwrap();
        let rows = ExchangeCodec::decode_json(&input).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].translated_text, "Inicio");

        assert!(ExchangeCodec::decode_json(b"\"nope\"").is_err());
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("CSV".parse::<ExchangeFormat>().unwrap(), ExchangeFormat::Csv);
        assert_eq!(ExchangeFormat::from_path("rows.json").unwrap(), ExchangeFormat::Json);
        let err = "xml".parse::<ExchangeFormat>().unwrap_err();
        assert_eq!(err.status().as_u16(), 415);
    }
}
