//! Subcommand implementations. Each returns the text to print and whether
//! the check passed.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use backoffice_core::{AdminContext, ErrorKind, MemoryRepository};
use backoffice_panels::{AdminConfig, AdminRuntime};
use backoffice_translation::{
    ExchangeCodec, ExchangeFormat, ExchangeService, MemoryJobStore, RowResult, RowStatus,
};

use crate::error::CliError;

/// Principal used for offline checks.
const CLI_ACTOR: &str = "backoffice-cli";

pub struct Outcome {
    pub output: String,
    pub ok: bool,
}

impl Outcome {
    fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ok: true,
        }
    }
}

pub async fn validate(config: AdminConfig) -> Result<Outcome, CliError> {
    let runtime = AdminRuntime::from_config(config).await?;
    let panels = runtime.registry().names().await;
    match runtime.validate_wiring().await {
        Ok(()) => {
            info!(panels = panels.len(), "Panel wiring is valid");
            Ok(Outcome::ok(format!(
                "{} panel(s) valid: {}",
                panels.len(),
                panels.join(", ")
            )))
        }
        Err(err) => {
            let body = json!({
                "text_code": err.text_code(),
                "message": err.to_string(),
                "metadata": err.metadata(),
            });
            Ok(Outcome {
                output: serde_json::to_string_pretty(&body)?,
                ok: false,
            })
        }
    }
}

pub fn template(format: ExchangeFormat) -> Result<Outcome, CliError> {
    let output = match format {
        ExchangeFormat::Csv => ExchangeCodec::template_csv()?,
        ExchangeFormat::Json => serde_json::to_string_pretty(&ExchangeCodec::template_json())?,
    };
    Ok(Outcome::ok(output))
}

/// Report from `check-rows`.
#[derive(Debug, Serialize)]
pub struct RowReport {
    pub format: ExchangeFormat,
    pub rows: usize,
    /// Rows that would fail on any store
    pub structural_errors: Vec<RowResult>,
    /// Rows that only failed because the offline store is empty
    pub unresolved: usize,
}

pub async fn check_rows(
    config: &AdminConfig,
    file: &Path,
    format: Option<ExchangeFormat>,
) -> Result<Outcome, CliError> {
    let format = match format {
        Some(format) => format,
        None => ExchangeFormat::from_path(&file.to_string_lossy())?,
    };
    let bytes = std::fs::read(file).map_err(|source| CliError::Io {
        path: file.to_path_buf(),
        source,
    })?;
    let rows = ExchangeCodec::decode(format, &bytes)?;
    debug!(rows = rows.len(), format = %format, "Exchange file decoded");

    let service = config.panels.iter().fold(
        ExchangeService::new(Arc::new(MemoryJobStore::new())),
        |service, panel| {
            let resource = panel.entity_type();
            service.with_repository(resource, Arc::new(MemoryRepository::new(resource)))
        },
    );
    let result = service
        .validate(&AdminContext::new(CLI_ACTOR), &rows)
        .await?;

    let not_found = ErrorKind::NotFound.as_str();
    let (unresolved, structural_errors): (Vec<RowResult>, Vec<RowResult>) = result
        .results
        .into_iter()
        .filter(|r| r.status != RowStatus::Success)
        .partition(|r| r.error.as_ref().is_some_and(|e| e.code == not_found));

    let report = RowReport {
        format,
        rows: rows.len(),
        structural_errors,
        unresolved: unresolved.len(),
    };
    Ok(Outcome {
        ok: report.structural_errors.is_empty(),
        output: serde_json::to_string_pretty(&report)?,
    })
}

pub fn features(config: &AdminConfig) -> Result<Outcome, CliError> {
    let flags = config.feature_flags()?;
    let keys: Vec<String> = flags.enabled_keys().map(|k| k.to_string()).collect();
    Ok(Outcome::ok(keys.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
commands: [pages.archive]
workflows:
  - entity_type: pages
    transitions:
      - { name: request_approval, from: draft, to: pending_approval }
      - { name: approve, from: pending_approval, to: published }
panels:
  - name: pages
    translation_aware: true
    actions:
      - { name: submit_for_approval }
      - { name: publish }
    bulk_actions:
      - { name: archive, command_name: pages.archive }
"#;

    fn config() -> AdminConfig {
        AdminConfig::from_yaml(CONFIG).unwrap()
    }

    #[tokio::test]
    async fn test_validate_reports_panels() {
        let outcome = validate(config()).await.unwrap();
        assert!(outcome.ok);
        assert_eq!(outcome.output, "1 panel(s) valid: pages");

        let broken = AdminConfig::from_yaml(&CONFIG.replace("[pages.archive]", "[]")).unwrap();
        let outcome = validate(broken).await.unwrap();
        assert!(!outcome.ok);
        assert!(outcome.output.contains("VALIDATION_ERROR"));
    }

    #[test]
    fn test_csv_template_has_header_and_example() {
        let outcome = template(ExchangeFormat::Csv).unwrap();
        let lines: Vec<&str> = outcome.output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("resource,"));
        assert!(lines[1].contains("page_1"));
    }

    #[tokio::test]
    async fn test_check_rows_separates_structural_errors() {
        let mut bad = ExchangeCodec::example_row();
        bad.target_locale = "en".into();
        let csv = ExchangeCodec::encode_csv(&[ExchangeCodec::example_row(), bad]).unwrap();
        let path = std::env::temp_dir().join(format!("backoffice-rows-{}.csv", std::process::id()));
        std::fs::write(&path, csv).unwrap();

        let outcome = check_rows(&config(), &path, None).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(!outcome.ok);
        let report: serde_json::Value = serde_json::from_str(&outcome.output).unwrap();
        assert_eq!(report["rows"], 2);
        assert_eq!(report["unresolved"], 1);
        assert_eq!(report["structural_errors"][0]["index"], 1);
        assert_eq!(
            report["structural_errors"][0]["error"]["code"],
            "invalid_locale"
        );
    }

    #[tokio::test]
    async fn test_check_rows_unknown_extension() {
        let err = check_rows(&config(), Path::new("rows.xlsx"), None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CliError::Admin(_)));
    }

    #[test]
    fn test_features_default_to_all() {
        let outcome = features(&config()).unwrap();
        assert_eq!(outcome.output.lines().count(), 20);
        assert!(outcome.output.lines().any(|k| k == "translation_queue"));
    }
}
