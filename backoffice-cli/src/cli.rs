//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use backoffice_translation::ExchangeFormat;

/// Backoffice - panel configuration and translation exchange tooling
#[derive(Parser, Debug, Clone)]
#[command(name = "backoffice")]
#[command(about = "Validate backoffice configuration and translation exchange files")]
pub struct Args {
    /// Admin configuration file (YAML)
    #[arg(long, short, env = "BACKOFFICE_CONFIG", default_value = "backoffice.yaml")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Load the configuration, build every panel and check action wiring
    Validate,

    /// Print an exchange template (header plus one example row)
    Template {
        #[arg(long, short, value_enum, default_value = "csv")]
        format: FormatArg,
    },

    /// Parse an exchange file and report structural row errors
    CheckRows {
        /// CSV or JSON exchange file
        file: PathBuf,

        /// Override the format guessed from the file extension
        #[arg(long, short, value_enum)]
        format: Option<FormatArg>,
    },

    /// List the resolved feature flags
    Features,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Csv,
    Json,
}

impl From<FormatArg> for ExchangeFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => ExchangeFormat::Csv,
            FormatArg::Json => ExchangeFormat::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_check_rows() {
        let args = Args::try_parse_from([
            "backoffice",
            "--config",
            "admin.yaml",
            "check-rows",
            "rows.json",
            "--format",
            "csv",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("admin.yaml"));
        match args.command {
            Commands::CheckRows { file, format } => {
                assert_eq!(file, PathBuf::from("rows.json"));
                assert_eq!(format, Some(FormatArg::Csv));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_template_defaults_to_csv() {
        let args = Args::try_parse_from(["backoffice", "template"]).unwrap();
        assert!(matches!(
            args.command,
            Commands::Template {
                format: FormatArg::Csv
            }
        ));
    }
}
