//! Forecast-prep core crate.
//!
//! Prepares per-entity daily series for supervised forecasting:
//! - continuity check: missing calendar days per entity
//! - walk-forward fold cutoffs before a forecast origin
//! - leakage-free lag, rolling, ratio and calendar features
//! - train/validation split validation around an origin date

mod config;
mod continuity;
mod dataset;
mod features;
mod folds;
mod frame;
mod models;
mod observability;
mod split;

pub use config::{run_config_from_env, RunConfig, RunConfigError};
pub use continuity::{find_missing_dates, MissingDate, MissingDatesReport, MISSING_DATE_COLUMN};
pub use dataset::{load_frame_csv, read_frame_csv, write_frame_csv, CsvLayout, DatasetError};
pub use features::{
    assert_schema_compatible, build_feature_schema, create_calendar_features,
    create_lag_features, create_rolling_features, derive_features, drop_undefined_rows,
    features_from_history, lag_column_name, DerivedFeature, FeatureColumn,
    FeaturePipelineConfig, FeatureReport, FeatureSchema, FeatureSource, RollingFeatureConfig,
    CALENDAR_COLUMNS, DEFAULT_DERIVED_FEATURES, FEATURE_SCHEMA_VERSION, MONTHLY_WINDOW,
    WEEKLY_WINDOW,
};
pub use folds::{
    parse_origin_date, plan_folds, rolling_cutoffs, ConfigurationError, FoldBoundary, FoldConfig,
    OriginDate,
};
pub use frame::{Column, ColumnData, ColumnKind, ComputationError, EntityKey, Frame, FrameError};
pub use models::{parse_model_code, ModelCode, ModelRegistry, ModelRegistryError, ALL_MODEL_CODES};
pub use observability::{
    init_logging, log_run_finish, log_run_start, logging_config_from_env, LogFormat, LoggingConfig,
    LoggingInitError,
};
pub use split::{
    split_at_origin, validate_split, walk_forward_splits, PreconditionViolation, Split,
};
