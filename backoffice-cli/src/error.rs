//! CLI error type.

use std::path::PathBuf;

use thiserror::Error;

use backoffice_core::AdminError;
use backoffice_panels::ConfigError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{code}: {0}", code = .0.text_code())]
    Admin(#[from] AdminError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render output: {0}")]
    Json(#[from] serde_json::Error),
}
