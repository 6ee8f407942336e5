//! Per-entity feature derivation for walk-forward forecasting.
//!
//! Every look-back statistic at row `t` is computed from the entity's rows strictly
//! before `t` in date order. Entities are partitioned, processed independently, and
//! merged back in (entity, date) order. Rows whose derived values are undefined are
//! dropped, never imputed.

use std::collections::{BTreeSet, HashSet};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::frame::{Column, ColumnData, ComputationError, Frame, FrameError};

pub const FEATURE_SCHEMA_VERSION: u32 = 1;
pub const WEEKLY_WINDOW: usize = 7;
pub const MONTHLY_WINDOW: usize = 30;
pub const CALENDAR_COLUMNS: [&str; 4] = ["day_of_week", "day_of_month", "week_of_year", "month"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DerivedFeature {
    WeeklyMa,
    MonthlyMa,
    SellThroughRateYesterday,
    RelativeYesterdaySalesToMean,
    SalesRelativeToWeeklyAvg,
    SalesRelativeToMonthlyAvg,
}

pub const DEFAULT_DERIVED_FEATURES: [DerivedFeature; 3] = [
    DerivedFeature::WeeklyMa,
    DerivedFeature::MonthlyMa,
    DerivedFeature::SellThroughRateYesterday,
];

impl DerivedFeature {
    pub fn column_name(self, target_column: &str) -> String {
        match self {
            Self::WeeklyMa => format!("weekly_ma_{target_column}"),
            Self::MonthlyMa => format!("monthly_ma_{target_column}"),
            Self::SellThroughRateYesterday => "sell_through_rate_yesterday".to_string(),
            Self::RelativeYesterdaySalesToMean => "relative_yesterday_sales_to_mean".to_string(),
            Self::SalesRelativeToWeeklyAvg => "sales_relative_to_weekly_avg".to_string(),
            Self::SalesRelativeToMonthlyAvg => "sales_relative_to_monthly_avg".to_string(),
        }
    }

    fn needs_stock(self) -> bool {
        matches!(self, Self::SellThroughRateYesterday)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingFeatureConfig {
    pub date_column: String,
    pub group_columns: Vec<String>,
    pub target_column: String,
    pub stock_column: String,
    pub features: Vec<DerivedFeature>,
}

impl Default for RollingFeatureConfig {
    fn default() -> Self {
        Self {
            date_column: "date".to_string(),
            group_columns: vec!["sku".to_string()],
            target_column: "units_sold".to_string(),
            stock_column: "stock_available".to_string(),
            features: DEFAULT_DERIVED_FEATURES.to_vec(),
        }
    }
}

impl RollingFeatureConfig {
    fn group_refs(&self) -> Vec<&str> {
        self.group_columns.iter().map(String::as_str).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturePipelineConfig {
    pub rolling: RollingFeatureConfig,
    pub lags: Vec<i64>,
    pub calendar: bool,
    pub schema_version: u32,
}

impl Default for FeaturePipelineConfig {
    fn default() -> Self {
        Self {
            rolling: RollingFeatureConfig::default(),
            lags: vec![1, 7],
            calendar: true,
            schema_version: FEATURE_SCHEMA_VERSION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureSource {
    Lag,
    Rolling,
    Calendar,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub source: FeatureSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<FeatureColumn>,
}

impl FeatureSchema {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureReport {
    pub input_rows: u64,
    pub output_rows: u64,
    pub dropped_rows: u64,
    pub entities: u64,
}

pub fn lag_column_name(target_column: &str, lag: i64) -> String {
    format!("{target_column}_lag_{lag}")
}

/// Adds `{target}_lag_{lag}` for every lag. Negative lags look ahead.
///
/// With grouping columns each entity is shifted in date order and the result is
/// sorted by (entity, date). Without them the shift follows the given row order and
/// the caller is responsible for date-sorting first.
pub fn create_lag_features(
    frame: &Frame,
    date_column: &str,
    lags: &[i64],
    target_column: &str,
    group_columns: Option<&[&str]>,
) -> Result<Frame, ComputationError> {
    const TRANSFORM: &str = "lag features";

    let mut out = frame.clone();
    let target = frame
        .numbers(target_column)
        .map_err(transform_error(TRANSFORM))?;

    match group_columns {
        Some(groups) => {
            let partitions = frame
                .partition_by_entity(groups, date_column)
                .map_err(transform_error(TRANSFORM))?;
            for &lag in lags {
                let mut column = vec![f64::NAN; frame.len()];
                for rows in partitions.values() {
                    let series: Vec<f64> = rows.iter().map(|&row| target[row]).collect();
                    scatter(&mut column, rows, &shift(&series, lag));
                }
                out.set_column(Column::number(lag_column_name(target_column, lag), column))
                    .map_err(transform_error(TRANSFORM))?;
            }
            out = out
                .sort_by_entity_and_date(groups, date_column)
                .map_err(transform_error(TRANSFORM))?;
        }
        None => {
            for &lag in lags {
                out.set_column(Column::number(
                    lag_column_name(target_column, lag),
                    shift(target, lag),
                ))
                .map_err(transform_error(TRANSFORM))?;
            }
        }
    }

    debug!(
        component = "features",
        event = "features.lags.built",
        target_column,
        lags = ?lags,
        grouped = group_columns.is_some(),
        rows = out.len()
    );

    Ok(out)
}

/// Adds the configured moving-average and ratio features, then drops incomplete rows.
pub fn create_rolling_features(
    frame: &Frame,
    cfg: &RollingFeatureConfig,
) -> Result<Frame, ComputationError> {
    const TRANSFORM: &str = "rolling features";

    let groups = cfg.group_refs();
    let partitions = frame
        .partition_by_entity(&groups, &cfg.date_column)
        .map_err(transform_error(TRANSFORM))?;
    let target = frame
        .numbers(&cfg.target_column)
        .map_err(transform_error(TRANSFORM))?;
    let stock = if cfg.features.iter().any(|f| f.needs_stock()) {
        Some(
            frame
                .numbers(&cfg.stock_column)
                .map_err(transform_error(TRANSFORM))?,
        )
    } else {
        None
    };

    let mut out = frame.clone();
    for &feature in &cfg.features {
        let mut column = vec![f64::NAN; frame.len()];
        for rows in partitions.values() {
            let series = EntitySeries {
                target: rows.iter().map(|&row| target[row]).collect(),
                stock: stock.map(|s| rows.iter().map(|&row| s[row]).collect()),
            };
            scatter(&mut column, rows, &series.derive(feature));
        }
        out.set_column(Column::number(
            feature.column_name(&cfg.target_column),
            column,
        ))
        .map_err(transform_error(TRANSFORM))?;
    }

    let sorted = out
        .sort_by_entity_and_date(&groups, &cfg.date_column)
        .map_err(transform_error(TRANSFORM))?;
    let cleaned = drop_undefined_rows(&sorted);

    info!(
        component = "features",
        event = "features.rolling.built",
        features = ?cfg.features,
        entities = partitions.len(),
        input_rows = frame.len(),
        output_rows = cleaned.len()
    );

    Ok(cleaned)
}

/// Keeps only rows where every numeric column is defined. Row order is preserved.
pub fn drop_undefined_rows(frame: &Frame) -> Frame {
    let numeric: Vec<&[f64]> = frame
        .columns()
        .iter()
        .filter_map(|c| match &c.data {
            ColumnData::Number(values) => Some(values.as_slice()),
            _ => None,
        })
        .collect();

    frame.filter_rows(|row| numeric.iter().all(|values| !values[row].is_nan()))
}

pub fn create_calendar_features(
    frame: &Frame,
    date_column: &str,
) -> Result<Frame, ComputationError> {
    const TRANSFORM: &str = "calendar features";

    let dates = frame
        .dates(date_column)
        .map_err(transform_error(TRANSFORM))?;
    let parts: [fn(&NaiveDate) -> u32; 4] = [
        |d| d.weekday().num_days_from_monday(),
        |d| d.day(),
        |d| d.iso_week().week(),
        |d| d.month(),
    ];

    let mut out = frame.clone();
    for (name, part) in CALENDAR_COLUMNS.iter().zip(parts) {
        let values = dates.iter().map(|d| f64::from(part(d))).collect();
        out.set_column(Column::number(*name, values))
            .map_err(transform_error(TRANSFORM))?;
    }
    Ok(out)
}

/// Single-row frame with each requested column's value on the latest history date.
pub fn features_from_history(
    history: &Frame,
    date_column: &str,
    features: &[&str],
) -> Result<Frame, ComputationError> {
    const TRANSFORM: &str = "history features";

    let latest = history
        .partition_by_entity(&[], date_column)
        .map_err(transform_error(TRANSFORM))?
        .into_values()
        .next()
        .and_then(|rows| rows.last().copied());
    let selected = history
        .select(features)
        .map_err(transform_error(TRANSFORM))?;

    match latest {
        Some(row) => Ok(selected.take(&[row])),
        None => {
            warn!(
                component = "features",
                event = "features.history.empty",
                requested = ?features
            );
            Err(ComputationError::EmptyFrame {
                transform: TRANSFORM,
            })
        }
    }
}

pub fn build_feature_schema(cfg: &FeaturePipelineConfig) -> FeatureSchema {
    let target = &cfg.rolling.target_column;
    let mut columns: Vec<FeatureColumn> = cfg
        .lags
        .iter()
        .map(|&lag| FeatureColumn {
            name: lag_column_name(target, lag),
            source: FeatureSource::Lag,
        })
        .collect();

    columns.extend(cfg.rolling.features.iter().map(|f| FeatureColumn {
        name: f.column_name(target),
        source: FeatureSource::Rolling,
    }));

    if cfg.calendar {
        columns.extend(CALENDAR_COLUMNS.iter().map(|name| FeatureColumn {
            name: name.to_string(),
            source: FeatureSource::Calendar,
        }));
    }

    let fingerprint = schema_fingerprint(cfg, &columns);

    info!(
        component = "features",
        event = "features.schema.built",
        version = cfg.schema_version,
        column_count = columns.len(),
        fingerprint = %fingerprint
    );

    FeatureSchema {
        version: cfg.schema_version,
        fingerprint,
        columns,
    }
}

pub fn assert_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &FeatureSchema,
) -> Result<(), ComputationError> {
    if expected_version != actual.version {
        return Err(ComputationError::SchemaVersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }

    if expected_fingerprint != actual.fingerprint {
        return Err(ComputationError::SchemaFingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }

    Ok(())
}

/// Lags, then rolling features (which drop incomplete rows), then calendar parts.
pub fn derive_features(
    frame: &Frame,
    cfg: &FeaturePipelineConfig,
) -> Result<(FeatureSchema, Frame, FeatureReport), ComputationError> {
    validate_config(cfg)?;

    let rolling = &cfg.rolling;
    let groups = rolling.group_refs();

    info!(
        component = "features",
        event = "features.derive.start",
        rows = frame.len(),
        target_column = %rolling.target_column,
        group_columns = ?rolling.group_columns,
        lags = ?cfg.lags
    );

    let schema = build_feature_schema(cfg);
    let entities = frame
        .entity_keys(&groups)
        .map_err(transform_error("feature pipeline"))?
        .into_iter()
        .collect::<BTreeSet<_>>()
        .len();

    let lagged = create_lag_features(
        frame,
        &rolling.date_column,
        &cfg.lags,
        &rolling.target_column,
        Some(groups.as_slice()),
    )?;
    let rolled = create_rolling_features(&lagged, rolling)?;
    let out = if cfg.calendar {
        create_calendar_features(&rolled, &rolling.date_column)?
    } else {
        rolled
    };

    let report = FeatureReport {
        input_rows: frame.len() as u64,
        output_rows: out.len() as u64,
        dropped_rows: frame.len().saturating_sub(out.len()) as u64,
        entities: entities as u64,
    };

    info!(
        component = "features",
        event = "features.derive.finish",
        input_rows = report.input_rows,
        output_rows = report.output_rows,
        dropped_rows = report.dropped_rows,
        entities = report.entities
    );

    Ok((schema, out, report))
}

fn validate_config(cfg: &FeaturePipelineConfig) -> Result<(), ComputationError> {
    if cfg.schema_version != FEATURE_SCHEMA_VERSION {
        return Err(ComputationError::InvalidConfig(format!(
            "schema_version must equal FEATURE_SCHEMA_VERSION ({FEATURE_SCHEMA_VERSION})"
        )));
    }

    let mut seen = HashSet::new();
    for lag in &cfg.lags {
        if *lag < 1 {
            return Err(ComputationError::InvalidConfig(format!(
                "lag {lag} reads the current or a future row"
            )));
        }
        if !seen.insert(*lag) {
            return Err(ComputationError::InvalidConfig(
                "lags must be unique".to_string(),
            ));
        }
    }

    let mut seen = HashSet::new();
    for feature in &cfg.rolling.features {
        if !seen.insert(*feature) {
            return Err(ComputationError::InvalidConfig(format!(
                "feature {feature:?} listed twice"
            )));
        }
    }

    Ok(())
}

fn transform_error(transform: &'static str) -> impl FnOnce(FrameError) -> ComputationError {
    move |source| {
        warn!(
            component = "features",
            event = "features.transform.error",
            transform,
            error = %source
        );
        ComputationError::Transform { transform, source }
    }
}

/// One entity's measurements in date order.
struct EntitySeries {
    target: Vec<f64>,
    stock: Option<Vec<f64>>,
}

impl EntitySeries {
    fn derive(&self, feature: DerivedFeature) -> Vec<f64> {
        let yesterday = shift(&self.target, 1);
        match feature {
            DerivedFeature::WeeklyMa => prior_window_mean(&self.target, WEEKLY_WINDOW),
            DerivedFeature::MonthlyMa => prior_window_mean(&self.target, MONTHLY_WINDOW),
            DerivedFeature::SellThroughRateYesterday => match &self.stock {
                Some(stock) => ratios(&yesterday, &shift(stock, 1)),
                None => vec![f64::NAN; self.target.len()],
            },
            DerivedFeature::RelativeYesterdaySalesToMean => {
                ratios(&yesterday, &prior_expanding_mean(&self.target))
            }
            DerivedFeature::SalesRelativeToWeeklyAvg => {
                ratios(&yesterday, &prior_window_mean(&self.target, WEEKLY_WINDOW))
            }
            DerivedFeature::SalesRelativeToMonthlyAvg => {
                ratios(&yesterday, &prior_window_mean(&self.target, MONTHLY_WINDOW))
            }
        }
    }
}

fn scatter(column: &mut [f64], rows: &[usize], values: &[f64]) {
    for (&row, &value) in rows.iter().zip(values) {
        column[row] = value;
    }
}

fn shift(values: &[f64], lag: i64) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            i64::try_from(i)
                .ok()
                .and_then(|i| i.checked_sub(lag))
                .and_then(|src| usize::try_from(src).ok())
                .and_then(|src| values.get(src).copied())
                .unwrap_or(f64::NAN)
        })
        .collect()
}

/// Mean of the `window` values before each position; undefined without a full, defined window.
fn prior_window_mean(values: &[f64], window: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if window == 0 || i < window {
                return f64::NAN;
            }
            let slice = &values[i - window..i];
            if slice.iter().any(|v| v.is_nan()) {
                f64::NAN
            } else {
                slice.iter().sum::<f64>() / window as f64
            }
        })
        .collect()
}

/// Mean of all defined values before each position.
fn prior_expanding_mean(values: &[f64]) -> Vec<f64> {
    let mut sum = 0.0;
    let mut count = 0u32;
    values
        .iter()
        .map(|&v| {
            let mean = if count == 0 {
                f64::NAN
            } else {
                sum / f64::from(count)
            };
            if !v.is_nan() {
                sum += v;
                count += 1;
            }
            mean
        })
        .collect()
}

fn ratios(numerators: &[f64], denominators: &[f64]) -> Vec<f64> {
    numerators
        .iter()
        .zip(denominators)
        .map(|(&n, &d)| ratio(n, d))
        .collect()
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if numerator.is_nan() || denominator.is_nan() || denominator == 0.0 {
        f64::NAN
    } else {
        numerator / denominator
    }
}

fn schema_fingerprint(cfg: &FeaturePipelineConfig, columns: &[FeatureColumn]) -> String {
    let rolling = &cfg.rolling;
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{};", cfg.schema_version));
    hasher.update(format!("date:{};", rolling.date_column));
    hasher.update(format!("groups:{};", rolling.group_columns.join(",")));
    hasher.update(format!("target:{};", rolling.target_column));
    if rolling.features.iter().any(|f| f.needs_stock()) {
        hasher.update(format!("stock:{};", rolling.stock_column));
    }
    hasher.update(format!("weekly:{WEEKLY_WINDOW};monthly:{MONTHLY_WINDOW};"));
    hasher.update("columns:");
    for column in columns {
        hasher.update(column.name.as_bytes());
        hasher.update(":f64;");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_nan_prefix(values: &[f64], n: usize) {
        assert!(values[..n].iter().all(|v| v.is_nan()), "{values:?}");
        assert!(values[n..].iter().all(|v| !v.is_nan()), "{values:?}");
    }

    #[test]
    fn shift_moves_values_and_pads_with_undefined() {
        let v = [1.0, 2.0, 3.0];
        let back = shift(&v, 1);
        assert!(back[0].is_nan());
        assert_eq!(&back[1..], &[1.0, 2.0]);

        let ahead = shift(&v, -2);
        assert_eq!(ahead[0], 3.0);
        assert!(ahead[1].is_nan() && ahead[2].is_nan());

        assert!(shift(&v, i64::MIN).iter().all(|x| x.is_nan()));
        assert_eq!(shift(&v, 0), v.to_vec());
    }

    #[test]
    fn prior_window_mean_excludes_current_value() {
        let v: Vec<f64> = (1..=10).map(f64::from).collect();
        let ma = prior_window_mean(&v, 3);
        assert_nan_prefix(&ma, 3);
        assert_eq!(ma[3], 2.0);
        assert_eq!(ma[9], 8.0);
    }

    #[test]
    fn prior_window_mean_is_undefined_when_window_holds_a_gap() {
        let v = [1.0, f64::NAN, 3.0, 4.0, 5.0, 6.0];
        let ma = prior_window_mean(&v, 2);
        assert!(ma[2].is_nan());
        assert!(ma[3].is_nan());
        assert_eq!(ma[4], 3.5);
    }

    #[test]
    fn prior_expanding_mean_skips_undefined_history() {
        let m = prior_expanding_mean(&[2.0, f64::NAN, 4.0, 6.0]);
        assert!(m[0].is_nan());
        assert_eq!(m[1], 2.0);
        assert_eq!(m[2], 2.0);
        assert_eq!(m[3], 3.0);
    }

    #[test]
    fn ratio_guards_zero_and_undefined_denominators() {
        assert!(ratio(5.0, 0.0).is_nan());
        assert!(ratio(0.0, 0.0).is_nan());
        assert!(ratio(5.0, f64::NAN).is_nan());
        assert!(ratio(f64::NAN, 2.0).is_nan());
        assert_eq!(ratio(3.0, -2.0), -1.5);
    }

    #[test]
    fn pipeline_config_rejects_lookahead_and_duplicate_lags() {
        let mut cfg = FeaturePipelineConfig {
            lags: vec![1, 0],
            ..FeaturePipelineConfig::default()
        };
        assert!(matches!(
            validate_config(&cfg),
            Err(ComputationError::InvalidConfig(_))
        ));

        cfg.lags = vec![2, 2];
        assert!(matches!(
            validate_config(&cfg),
            Err(ComputationError::InvalidConfig(_))
        ));

        cfg.lags = vec![1, 7];
        assert!(validate_config(&cfg).is_ok());
    }
}
