//! CSV codec for frames.
//!
//! The caller declares which column holds the date and which columns are entity keys;
//! every other column is read as a number. Empty cells and `NaN`/`NA` read as undefined.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::frame::{Column, ColumnData, Frame, FrameError};

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvLayout {
    pub date_column: String,
    pub key_columns: Vec<String>,
}

impl Default for CsvLayout {
    fn default() -> Self {
        Self {
            date_column: "date".to_string(),
            key_columns: vec!["sku".to_string()],
        }
    }
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV header has no column '{0}'")]
    MissingHeader(String),
    #[error("failed to parse {field} value '{value}' on line {line}")]
    ParseField {
        field: String,
        value: String,
        line: u64,
    },
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

enum Builder {
    Key(Vec<String>),
    Date(Vec<NaiveDate>),
    Number(Vec<f64>),
}

pub fn load_frame_csv(path: &Path, layout: &CsvLayout) -> Result<Frame, DatasetError> {
    let file = fs::File::open(path)?;
    let frame = read_frame_csv(file, layout)?;
    info!(
        component = "dataset",
        event = "dataset.load.finish",
        path = %path.display(),
        rows = frame.len(),
        columns = frame.columns().len()
    );
    Ok(frame)
}

pub fn read_frame_csv<R: Read>(reader: R, layout: &CsvLayout) -> Result<Frame, DatasetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader.headers()?.clone();

    for required in std::iter::once(&layout.date_column).chain(layout.key_columns.iter()) {
        if !headers.iter().any(|h| h == required) {
            return Err(DatasetError::MissingHeader(required.clone()));
        }
    }

    let mut builders: Vec<Builder> = headers
        .iter()
        .map(|name| {
            if name == layout.date_column {
                Builder::Date(Vec::new())
            } else if layout.key_columns.iter().any(|k| k == name) {
                Builder::Key(Vec::new())
            } else {
                Builder::Number(Vec::new())
            }
        })
        .collect();

    for record in reader.records() {
        let record = record?;
        push_record(&record, &headers, &mut builders)?;
    }

    let columns = headers
        .iter()
        .zip(builders)
        .map(|(name, builder)| match builder {
            Builder::Key(values) => Column::key(name, values),
            Builder::Date(values) => Column::date(name, values),
            Builder::Number(values) => Column::number(name, values),
        })
        .collect();

    Ok(Frame::new(columns)?)
}

pub fn write_frame_csv<W: Write>(frame: &Frame, writer: W) -> Result<(), DatasetError> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(frame.column_names())?;

    for row in 0..frame.len() {
        let record: Vec<String> = frame
            .columns()
            .iter()
            .map(|column| match &column.data {
                ColumnData::Key(values) => values[row].clone(),
                ColumnData::Date(values) => values[row].format("%Y-%m-%d").to_string(),
                ColumnData::Number(values) if values[row].is_nan() => String::new(),
                ColumnData::Number(values) => values[row].to_string(),
            })
            .collect();
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Calendar date from a date or datetime string; any time part is discarded.
pub(crate) fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
}

fn push_record(
    record: &StringRecord,
    headers: &StringRecord,
    builders: &mut [Builder],
) -> Result<(), DatasetError> {
    let line = record.position().map(|p| p.line()).unwrap_or_default();

    for (idx, builder) in builders.iter_mut().enumerate() {
        let raw = record.get(idx).unwrap_or_default();
        let parse_error = || DatasetError::ParseField {
            field: headers.get(idx).unwrap_or_default().to_string(),
            value: raw.to_string(),
            line,
        };

        match builder {
            Builder::Key(values) => values.push(raw.to_string()),
            Builder::Date(values) => values.push(parse_calendar_date(raw).ok_or_else(parse_error)?),
            Builder::Number(values) => values.push(parse_number(raw).ok_or_else(parse_error)?),
        }
    }
    Ok(())
}

fn parse_number(raw: &str) -> Option<f64> {
    match raw {
        "" | "NA" | "nan" | "NaN" => Some(f64::NAN),
        other => other.parse::<f64>().ok(),
    }
}
