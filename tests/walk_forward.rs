use chrono::{Days, NaiveDate};
use forecast_prep::{
    plan_folds, rolling_cutoffs, split_at_origin, validate_split, walk_forward_splits, Column,
    ConfigurationError, FoldConfig, Frame, PreconditionViolation,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid test date")
}

fn daily_frame(first: NaiveDate, days: u64) -> Frame {
    let dates: Vec<NaiveDate> = (0..days)
        .map(|i| first.checked_add_days(Days::new(i)).expect("date in range"))
        .collect();
    Frame::new(vec![
        Column::key("sku", vec!["a".to_string(); dates.len()]),
        Column::number("units_sold", (0..dates.len()).map(|i| i as f64).collect()),
        Column::date("date", dates),
    ])
    .expect("test frame is well formed")
}

fn frame_with_dates(dates: &[NaiveDate]) -> Frame {
    Frame::new(vec![Column::date("date", dates.to_vec())]).expect("test frame is well formed")
}

#[test]
fn cutoffs_are_spaced_one_horizon_apart_before_origin() {
    let cutoffs = rolling_cutoffs("2023-01-29", 7, 5).unwrap();

    assert_eq!(
        cutoffs,
        vec![
            date(2022, 12, 25),
            date(2023, 1, 1),
            date(2023, 1, 8),
            date(2023, 1, 15),
            date(2023, 1, 22),
        ]
    );
    for pair in cutoffs.windows(2) {
        assert_eq!(pair[1] - pair[0], chrono::Duration::days(7));
    }
    assert!(cutoffs.iter().all(|c| *c <= date(2023, 1, 22)));
}

#[test]
fn datetime_origins_use_their_calendar_day() {
    let from_datetime = rolling_cutoffs("2023-01-29T18:30:00", 7, 2).unwrap();
    assert_eq!(from_datetime, vec![date(2023, 1, 15), date(2023, 1, 22)]);
}

#[test]
fn invalid_fold_parameters_are_configuration_errors() {
    assert!(matches!(
        rolling_cutoffs("not-a-date", 7, 5),
        Err(ConfigurationError::InvalidDate(_))
    ));
    assert_eq!(
        rolling_cutoffs("2023-01-29", 0, 5),
        Err(ConfigurationError::ZeroHorizon)
    );
    assert_eq!(
        rolling_cutoffs("2023-01-29", 7, 0),
        Err(ConfigurationError::ZeroFolds)
    );
    assert!(matches!(
        rolling_cutoffs(NaiveDate::MIN, 7, 1),
        Err(ConfigurationError::DateOutOfRange { .. })
    ));
}

#[test]
fn validator_accepts_ordered_split_and_rejects_overlaps() {
    let origin = date(2023, 2, 1);
    let training = frame_with_dates(&[date(2023, 1, 30), date(2023, 1, 31)]);
    let validation = frame_with_dates(&[date(2023, 2, 1), date(2023, 2, 7)]);
    assert!(validate_split(&training, &validation, "date", origin).is_ok());

    let late_training = frame_with_dates(&[date(2023, 1, 31), date(2023, 2, 1)]);
    assert_eq!(
        validate_split(&late_training, &validation, "date", origin),
        Err(PreconditionViolation::TrainingDateNotBeforeOrigin {
            max_training_date: date(2023, 2, 1),
            origin,
        })
    );

    let early_validation = frame_with_dates(&[date(2023, 1, 31), date(2023, 2, 3)]);
    assert_eq!(
        validate_split(&training, &early_validation, "date", origin),
        Err(PreconditionViolation::ValidationDateBeforeOrigin {
            min_validation_date: date(2023, 1, 31),
            origin,
        })
    );
}

#[test]
fn split_at_origin_respects_optional_horizon() {
    let frame = daily_frame(date(2023, 1, 20), 20);
    let origin = date(2023, 2, 1);

    let open = split_at_origin(&frame, "date", origin, None).unwrap();
    assert_eq!(open.training.len(), 12);
    assert_eq!(open.validation.len(), 8);

    let bounded = split_at_origin(&frame, "date", origin, Some(7)).unwrap();
    assert_eq!(bounded.training.len(), 12);
    assert_eq!(bounded.validation.len(), 7);
    assert_eq!(
        bounded.validation.dates("date").unwrap().last(),
        Some(&date(2023, 2, 7))
    );
    assert!(validate_split(&bounded.training, &bounded.validation, "date", origin).is_ok());
}

#[test]
fn walk_forward_folds_hold_out_one_horizon_each() {
    let frame = daily_frame(date(2022, 11, 1), 89);
    let cfg = FoldConfig::default();
    let plan = plan_folds("2023-01-29", &cfg).unwrap();

    let splits = walk_forward_splits(&frame, "date", &plan).unwrap();

    assert_eq!(splits.len(), 5);
    for (fold, split) in plan.iter().zip(&splits) {
        assert_eq!(split.origin, fold.cutoff);
        assert_eq!(split.validation.len(), 7);
        let train_dates = split.training.dates("date").unwrap();
        let valid_dates = split.validation.dates("date").unwrap();
        assert_eq!(
            train_dates.last().copied(),
            fold.train_end_exclusive.pred_opt()
        );
        assert!(train_dates.iter().all(|d| *d < fold.train_end_exclusive));
        assert!(valid_dates
            .iter()
            .all(|d| *d >= fold.cutoff && *d < fold.holdout_end_exclusive));
    }
    assert!(splits
        .windows(2)
        .all(|pair| pair[0].training.len() + 7 == pair[1].training.len()));
    assert_eq!(plan[4].holdout_end_exclusive, date(2023, 1, 29));
}

#[test]
fn fold_training_stops_one_horizon_before_cutoff() {
    let frame = daily_frame(date(2022, 11, 1), 89);
    let plan = plan_folds("2023-01-29", &FoldConfig::default()).unwrap();

    let bounds: Vec<NaiveDate> = plan.iter().map(|f| f.train_end_exclusive).collect();
    assert_eq!(
        bounds,
        vec![
            date(2022, 12, 18),
            date(2022, 12, 25),
            date(2023, 1, 1),
            date(2023, 1, 8),
            date(2023, 1, 15),
        ]
    );

    let splits = walk_forward_splits(&frame, "date", &plan).unwrap();
    // 2022-11-01 ..= 2022-12-17
    assert_eq!(splits[0].training.len(), 47);
    for (fold, split) in plan.iter().zip(&splits) {
        let gap_rows = frame
            .dates("date")
            .unwrap()
            .iter()
            .filter(|d| **d >= fold.train_end_exclusive && **d < fold.cutoff)
            .count();
        assert_eq!(gap_rows, 7);
        assert_eq!(
            split.training.len() + gap_rows + split.validation.len(),
            frame
                .dates("date")
                .unwrap()
                .iter()
                .filter(|d| **d < fold.holdout_end_exclusive)
                .count()
        );
    }
}

#[test]
fn split_on_frame_without_date_column_fails() {
    let frame = Frame::new(vec![Column::number("units_sold", vec![1.0])]).unwrap();
    assert!(matches!(
        split_at_origin(&frame, "date", date(2023, 2, 1), None),
        Err(PreconditionViolation::Frame(_))
    ));
}
