//! Logging setup for the prep runner.
//!
//! Events go to stderr so the runner's JSON summary on stdout stays machine-readable.

use std::io;
use std::str::FromStr;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{env_value, parse_bool};
use crate::features::FeatureReport;

const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL.to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// `FPREP_LOG_LEVEL`, `FPREP_LOG_FORMAT` and `FPREP_LOG_TARGET`; unparseable values keep the default.
pub fn logging_config_from_env() -> LoggingConfig {
    let defaults = LoggingConfig::default();
    LoggingConfig {
        level: env_value("FPREP_LOG_LEVEL").unwrap_or(defaults.level),
        format: env_value("FPREP_LOG_FORMAT")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(defaults.format),
        include_target: env_value("FPREP_LOG_TARGET")
            .and_then(|raw| parse_bool(&raw))
            .unwrap_or(defaults.include_target),
    }
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(config.include_target)
        .with_ansi(matches!(config.format, LogFormat::Pretty));

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_run_start(config: &LoggingConfig, input: &str, origin: Option<&str>) {
    info!(
        component = "walk_forward_prep",
        event = "app.start",
        log_level = %config.level,
        log_format = ?config.format,
        input,
        origin = origin.unwrap_or("none")
    );
}

pub fn log_run_finish(report: &FeatureReport, missing_dates: usize, folds: usize) {
    info!(
        component = "walk_forward_prep",
        event = "app.finish",
        input_rows = report.input_rows,
        output_rows = report.output_rows,
        dropped_rows = report.dropped_rows,
        entities = report.entities,
        missing_dates,
        folds
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_env::with_env_vars;

    #[test]
    fn defaults_when_env_missing() {
        let cfg = with_env_vars(
            &[
                ("FPREP_LOG_LEVEL", None),
                ("FPREP_LOG_FORMAT", None),
                ("FPREP_LOG_TARGET", None),
            ],
            logging_config_from_env,
        );

        assert_eq!(cfg, LoggingConfig::default());
    }

    #[test]
    fn reads_level_format_and_target() {
        let cfg = with_env_vars(
            &[
                ("FPREP_LOG_LEVEL", Some("forecast_prep=debug")),
                ("FPREP_LOG_FORMAT", Some(" JSON ")),
                ("FPREP_LOG_TARGET", Some("off")),
            ],
            logging_config_from_env,
        );

        assert_eq!(cfg.level, "forecast_prep=debug");
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(!cfg.include_target);
    }

    #[test]
    fn unparseable_values_keep_defaults() {
        let cfg = with_env_vars(
            &[
                ("FPREP_LOG_LEVEL", Some("   ")),
                ("FPREP_LOG_FORMAT", Some("yaml")),
                ("FPREP_LOG_TARGET", Some("maybe")),
            ],
            logging_config_from_env,
        );

        assert_eq!(cfg, LoggingConfig::default());
    }

    #[test]
    fn log_format_parse_reports_unknown_values() {
        assert_eq!("pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
