//! Train/validation partitioning around an origin date.
//!
//! A split is only handed out after [`validate_split`] confirms
//! `max(training date) < origin <= min(validation date)`.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::folds::FoldBoundary;
use crate::frame::{Frame, FrameError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub origin: NaiveDate,
    pub training: Frame,
    pub validation: Frame,
}

/// A broken temporal ordering. Callers must not train or evaluate on the offending split.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionViolation {
    #[error("training set contains dates on or after the origin date ({max_training_date} >= {origin})")]
    TrainingDateNotBeforeOrigin {
        max_training_date: NaiveDate,
        origin: NaiveDate,
    },
    #[error("validation set contains dates before the origin date ({min_validation_date} < {origin})")]
    ValidationDateBeforeOrigin {
        min_validation_date: NaiveDate,
        origin: NaiveDate,
    },
    #[error("split frame error: {0}")]
    Frame(#[from] FrameError),
}

pub fn validate_split(
    training: &Frame,
    validation: &Frame,
    date_column: &str,
    origin: NaiveDate,
) -> Result<(), PreconditionViolation> {
    if let Some(&max_training_date) = training.dates(date_column)?.iter().max() {
        if max_training_date >= origin {
            error!(
                component = "split",
                event = "split.validate.violation",
                invariant = "training_before_origin",
                max_training_date = %max_training_date,
                origin = %origin
            );
            return Err(PreconditionViolation::TrainingDateNotBeforeOrigin {
                max_training_date,
                origin,
            });
        }
    }

    if let Some(&min_validation_date) = validation.dates(date_column)?.iter().min() {
        if min_validation_date < origin {
            error!(
                component = "split",
                event = "split.validate.violation",
                invariant = "validation_from_origin",
                min_validation_date = %min_validation_date,
                origin = %origin
            );
            return Err(PreconditionViolation::ValidationDateBeforeOrigin {
                min_validation_date,
                origin,
            });
        }
    }

    Ok(())
}

/// Training = dates before `origin`; validation = dates from `origin`, limited to
/// `horizon_days` when given.
pub fn split_at_origin(
    frame: &Frame,
    date_column: &str,
    origin: NaiveDate,
    horizon_days: Option<u32>,
) -> Result<Split, PreconditionViolation> {
    let end_exclusive =
        horizon_days.and_then(|days| origin.checked_add_days(Days::new(u64::from(days))));
    partition(frame, date_column, origin, origin, end_exclusive)
}

/// One validated split per fold: history before the fold's training bound against its
/// held-out window. The split's origin is the fold cutoff.
pub fn walk_forward_splits(
    frame: &Frame,
    date_column: &str,
    folds: &[FoldBoundary],
) -> Result<Vec<Split>, PreconditionViolation> {
    folds
        .iter()
        .map(|fold| {
            let split = partition(
                frame,
                date_column,
                fold.train_end_exclusive,
                fold.cutoff,
                Some(fold.holdout_end_exclusive),
            )?;
            info!(
                component = "split",
                event = "split.fold.built",
                fold = fold.index,
                train_end_exclusive = %fold.train_end_exclusive,
                cutoff = %fold.cutoff,
                training_rows = split.training.len(),
                validation_rows = split.validation.len()
            );
            Ok(split)
        })
        .collect()
}

fn partition(
    frame: &Frame,
    date_column: &str,
    train_end_exclusive: NaiveDate,
    origin: NaiveDate,
    end_exclusive: Option<NaiveDate>,
) -> Result<Split, PreconditionViolation> {
    let dates = frame.dates(date_column)?;
    let training = frame.filter_rows(|row| dates[row] < train_end_exclusive);
    let validation = frame.filter_rows(|row| {
        dates[row] >= origin && end_exclusive.map_or(true, |end| dates[row] < end)
    });

    validate_split(&training, &validation, date_column, origin)?;

    Ok(Split {
        origin,
        training,
        validation,
    })
}
