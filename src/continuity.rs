//! Per-entity calendar continuity check.
//!
//! Every entity is compared against the gap-free daily range between its first and
//! last observed date. Each absent day becomes one report entry.

use std::collections::BTreeSet;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::frame::{Column, ComputationError, EntityKey, Frame, FrameError};

pub const MISSING_DATE_COLUMN: &str = "missing_date";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingDate {
    pub key: EntityKey,
    pub missing_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingDatesReport {
    pub group_columns: Vec<String>,
    pub groups_checked: usize,
    pub entries: Vec<MissingDate>,
}

impl MissingDatesReport {
    pub fn is_continuous(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self) -> String {
        if self.entries.is_empty() {
            "no missing dates found in the time series".to_string()
        } else {
            format!(
                "found {} missing dates across {} groups",
                self.entries.len(),
                self.groups_with_gaps()
            )
        }
    }

    pub fn groups_with_gaps(&self) -> usize {
        self.entries
            .iter()
            .map(|e| &e.key)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Tabular form: one key column per grouping column plus `missing_date`.
    pub fn to_frame(&self) -> Result<Frame, FrameError> {
        let mut columns: Vec<Column> = self
            .group_columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                Column::key(
                    name.as_str(),
                    self.entries.iter().map(|e| e.key.0[idx].clone()).collect(),
                )
            })
            .collect();
        columns.push(Column::date(
            MISSING_DATE_COLUMN,
            self.entries.iter().map(|e| e.missing_date).collect(),
        ));
        Frame::new(columns)
    }
}

pub fn find_missing_dates(
    frame: &Frame,
    date_column: &str,
    group_columns: &[&str],
) -> Result<MissingDatesReport, ComputationError> {
    let partitions = frame
        .partition_by_entity(group_columns, date_column)
        .map_err(|err| {
            warn!(
                component = "continuity",
                event = "continuity.check.error",
                error = %err
            );
            ComputationError::transform("continuity check")(err)
        })?;
    let dates = frame
        .dates(date_column)
        .map_err(ComputationError::transform("continuity check"))?;

    let mut entries = Vec::new();
    for (key, rows) in &partitions {
        let observed: BTreeSet<NaiveDate> = rows.iter().map(|&row| dates[row]).collect();
        let (Some(first), Some(last)) = (observed.first(), observed.last()) else {
            continue;
        };

        for day in daily_range(*first, *last) {
            if !observed.contains(&day) {
                entries.push(MissingDate {
                    key: key.clone(),
                    missing_date: day,
                });
            }
        }
    }

    let report = MissingDatesReport {
        group_columns: group_columns.iter().map(|c| c.to_string()).collect(),
        groups_checked: partitions.len(),
        entries,
    };

    info!(
        component = "continuity",
        event = "continuity.check.finish",
        groups_checked = report.groups_checked,
        groups_with_gaps = report.groups_with_gaps(),
        missing_dates = report.entries.len(),
        summary = %report.summary()
    );

    Ok(report)
}

fn daily_range(first: NaiveDate, last: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    std::iter::successors(Some(first), move |day| {
        day.checked_add_days(Days::new(1)).filter(|next| *next <= last)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).expect("valid test date")
    }

    fn frame(rows: &[(&str, u32)]) -> Frame {
        Frame::new(vec![
            Column::key("sku", rows.iter().map(|(s, _)| s.to_string()).collect()),
            Column::date("date", rows.iter().map(|(_, d)| day(*d)).collect()),
        ])
        .unwrap()
    }

    #[test]
    fn daily_range_is_inclusive_of_both_ends() {
        let days: Vec<NaiveDate> = daily_range(day(30), day(31)).collect();
        assert_eq!(days, vec![day(30), day(31)]);
        assert_eq!(daily_range(day(5), day(5)).count(), 1);
    }

    #[test]
    fn unordered_and_duplicate_dates_do_not_create_gaps() {
        let report =
            find_missing_dates(&frame(&[("a", 3), ("a", 1), ("a", 2), ("a", 2)]), "date", &["sku"])
                .unwrap();
        assert!(report.is_continuous());
        assert_eq!(report.groups_checked, 1);
    }

    #[test]
    fn reports_each_missing_day_per_entity() {
        let report = find_missing_dates(
            &frame(&[("a", 1), ("a", 4), ("b", 10), ("b", 12), ("c", 7)]),
            "date",
            &["sku"],
        )
        .unwrap();

        let got: Vec<(String, NaiveDate)> = report
            .entries
            .iter()
            .map(|e| (e.key.to_string(), e.missing_date))
            .collect();
        assert_eq!(
            got,
            vec![
                ("a".to_string(), day(2)),
                ("a".to_string(), day(3)),
                ("b".to_string(), day(11)),
            ]
        );
        assert_eq!(report.groups_checked, 3);
        assert_eq!(report.groups_with_gaps(), 2);
        assert_eq!(report.summary(), "found 3 missing dates across 2 groups");
    }

    #[test]
    fn missing_grouping_column_is_a_computation_error() {
        let err = find_missing_dates(&frame(&[("a", 1)]), "date", &["store"]).unwrap_err();
        assert!(matches!(
            err,
            ComputationError::Transform {
                source: FrameError::MissingColumn { .. },
                ..
            }
        ));
    }
}
