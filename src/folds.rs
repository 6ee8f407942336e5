//! Walk-forward fold planning.
//!
//! For an origin date `o`, horizon `h` and `n` folds the cutoffs are
//! `o - h*n, o - h*(n-1), ..., o - h`: exactly `n` dates, `h` days apart, the last one
//! a full horizon before the origin.
//!
//! Each fold trains on dates before `cutoff - h` and holds out `[cutoff, cutoff + h)`,
//! leaving one horizon of unseen days between the two windows.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::dataset::parse_calendar_date;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldConfig {
    pub horizon_days: u32,
    pub n_folds: u32,
}

impl Default for FoldConfig {
    fn default() -> Self {
        Self {
            horizon_days: 7,
            n_folds: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldBoundary {
    pub index: usize,
    pub train_end_exclusive: NaiveDate,
    pub cutoff: NaiveDate,
    pub holdout_end_exclusive: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginDate<'a> {
    Text(&'a str),
    Date(NaiveDate),
}

impl<'a> From<&'a str> for OriginDate<'a> {
    fn from(raw: &'a str) -> Self {
        Self::Text(raw)
    }
}

impl<'a> From<&'a String> for OriginDate<'a> {
    fn from(raw: &'a String) -> Self {
        Self::Text(raw.as_str())
    }
}

impl From<NaiveDate> for OriginDate<'_> {
    fn from(date: NaiveDate) -> Self {
        Self::Date(date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("invalid origin date '{0}': expected YYYY-MM-DD or an ISO datetime")]
    InvalidDate(String),
    #[error("horizon must be at least one day")]
    ZeroHorizon,
    #[error("fold count must be at least one")]
    ZeroFolds,
    #[error("fold dates for origin {origin} with horizon {horizon_days}d x {n_folds} fall outside the supported calendar")]
    DateOutOfRange {
        origin: NaiveDate,
        horizon_days: u32,
        n_folds: u32,
    },
}

pub fn parse_origin_date(raw: &str) -> Result<NaiveDate, ConfigurationError> {
    parse_calendar_date(raw).ok_or_else(|| ConfigurationError::InvalidDate(raw.to_string()))
}

pub fn rolling_cutoffs<'a>(
    origin: impl Into<OriginDate<'a>>,
    horizon_days: u32,
    n_folds: u32,
) -> Result<Vec<NaiveDate>, ConfigurationError> {
    let origin = match origin.into() {
        OriginDate::Date(date) => date,
        OriginDate::Text(raw) => parse_origin_date(raw).inspect_err(|err| {
            warn!(
                component = "folds",
                event = "folds.origin.invalid",
                raw_origin = raw,
                error = %err
            );
        })?,
    };

    if horizon_days == 0 {
        return Err(ConfigurationError::ZeroHorizon);
    }
    if n_folds == 0 {
        return Err(ConfigurationError::ZeroFolds);
    }

    let out_of_range = || ConfigurationError::DateOutOfRange {
        origin,
        horizon_days,
        n_folds,
    };

    let cutoffs = (0..n_folds)
        .map(|i| {
            let back = u64::from(horizon_days) * u64::from(n_folds - i);
            origin.checked_sub_days(Days::new(back)).ok_or_else(out_of_range)
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        component = "folds",
        event = "folds.cutoffs.built",
        origin = %origin,
        horizon_days,
        n_folds,
        first_cutoff = %cutoffs[0],
        last_cutoff = %cutoffs[cutoffs.len() - 1]
    );

    Ok(cutoffs)
}

/// Cutoffs paired with their training bound and the end of their held-out window.
pub fn plan_folds<'a>(
    origin: impl Into<OriginDate<'a>>,
    cfg: &FoldConfig,
) -> Result<Vec<FoldBoundary>, ConfigurationError> {
    let cutoffs = rolling_cutoffs(origin, cfg.horizon_days, cfg.n_folds)?;
    let horizon = Days::new(u64::from(cfg.horizon_days));
    cutoffs
        .into_iter()
        .enumerate()
        .map(|(index, cutoff)| {
            let out_of_range = || ConfigurationError::DateOutOfRange {
                origin: cutoff,
                horizon_days: cfg.horizon_days,
                n_folds: cfg.n_folds,
            };
            let train_end_exclusive = cutoff.checked_sub_days(horizon).ok_or_else(out_of_range)?;
            let holdout_end_exclusive =
                cutoff.checked_add_days(horizon).ok_or_else(out_of_range)?;
            Ok(FoldBoundary {
                index,
                train_end_exclusive,
                cutoff,
                holdout_end_exclusive,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid test date")
    }

    #[test]
    fn text_and_date_origins_agree() {
        let a = rolling_cutoffs("2023-01-29", 7, 5).unwrap();
        let b = rolling_cutoffs(date(2023, 1, 29), 7, 5).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn single_fold_is_one_horizon_before_origin() {
        let cutoffs = rolling_cutoffs("2024-03-01", 14, 1).unwrap();
        assert_eq!(cutoffs, vec![date(2024, 2, 16)]);
    }

    #[test]
    fn degenerate_horizon_and_fold_count_are_rejected() {
        assert_eq!(
            rolling_cutoffs("2023-01-29", 0, 5).unwrap_err(),
            ConfigurationError::ZeroHorizon
        );
        assert_eq!(
            rolling_cutoffs("2023-01-29", 7, 0).unwrap_err(),
            ConfigurationError::ZeroFolds
        );
    }

    #[test]
    fn unparseable_origin_is_a_configuration_error() {
        assert_eq!(
            rolling_cutoffs("next tuesday", 7, 5).unwrap_err(),
            ConfigurationError::InvalidDate("next tuesday".to_string())
        );
    }

    #[test]
    fn far_past_origin_reports_out_of_range() {
        let err = rolling_cutoffs(NaiveDate::MIN, 7, 2).unwrap_err();
        assert!(matches!(err, ConfigurationError::DateOutOfRange { .. }));
    }

    #[test]
    fn plan_folds_attaches_holdout_windows() {
        let folds = plan_folds("2023-01-29", &FoldConfig::default()).unwrap();
        assert_eq!(folds.len(), 5);
        assert_eq!(folds[0].index, 0);
        assert_eq!(folds[0].train_end_exclusive, date(2022, 12, 18));
        assert_eq!(folds[0].cutoff, date(2022, 12, 25));
        assert_eq!(folds[0].holdout_end_exclusive, date(2023, 1, 1));
        assert_eq!(folds[4].train_end_exclusive, date(2023, 1, 15));
        assert_eq!(folds[4].cutoff, date(2023, 1, 22));
        assert_eq!(folds[4].holdout_end_exclusive, date(2023, 1, 29));
    }
}
