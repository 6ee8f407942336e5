//! Runner configuration from `FPREP_*` environment variables.
//!
//! Unset or blank variables keep the defaults; malformed numbers are errors.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::dataset::CsvLayout;
use crate::features::FeaturePipelineConfig;
use crate::folds::FoldConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunConfig {
    pub input_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub layout: CsvLayout,
    pub pipeline: FeaturePipelineConfig,
    pub origin_date: Option<String>,
    pub folds: FoldConfig,
}

impl RunConfig {
    pub fn group_columns(&self) -> Vec<&str> {
        self.layout.key_columns.iter().map(String::as_str).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunConfigError {
    #[error("{var} must be a non-negative integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{var} must be a comma-separated list of integers, got '{value}'")]
    InvalidList { var: &'static str, value: String },
}

pub fn run_config_from_env() -> Result<RunConfig, RunConfigError> {
    let mut layout = CsvLayout::default();
    let mut pipeline = FeaturePipelineConfig::default();
    let mut folds = FoldConfig::default();

    if let Some(date_column) = env_value("FPREP_DATE_COLUMN") {
        layout.date_column = date_column.clone();
        pipeline.rolling.date_column = date_column;
    }

    if let Some(raw) = env_value("FPREP_GROUP_COLUMNS") {
        let groups: Vec<String> = split_list(&raw).map(str::to_string).collect();
        layout.key_columns = groups.clone();
        pipeline.rolling.group_columns = groups;
    }

    if let Some(target) = env_value("FPREP_TARGET_COLUMN") {
        pipeline.rolling.target_column = target;
    }

    if let Some(stock) = env_value("FPREP_STOCK_COLUMN") {
        pipeline.rolling.stock_column = stock;
    }

    if let Some(raw) = env_value("FPREP_HORIZON_DAYS") {
        folds.horizon_days = parse_number("FPREP_HORIZON_DAYS", &raw)?;
    }

    if let Some(raw) = env_value("FPREP_N_FOLDS") {
        folds.n_folds = parse_number("FPREP_N_FOLDS", &raw)?;
    }

    if let Some(raw) = env_value("FPREP_LAGS") {
        pipeline.lags = split_list(&raw)
            .map(|lag| lag.parse::<i64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| RunConfigError::InvalidList {
                var: "FPREP_LAGS",
                value: raw.clone(),
            })?;
    }

    Ok(RunConfig {
        input_path: env_value("FPREP_INPUT_CSV").map(PathBuf::from),
        output_path: env_value("FPREP_OUTPUT_CSV").map(PathBuf::from),
        layout,
        pipeline,
        origin_date: env_value("FPREP_ORIGIN_DATE"),
        folds,
    })
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn env_value(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn parse_number<T: FromStr>(var: &'static str, raw: &str) -> Result<T, RunConfigError> {
    raw.parse::<T>().map_err(|_| RunConfigError::InvalidNumber {
        var,
        value: raw.to_string(),
    })
}
