use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use forecast_prep::{
    derive_features, find_missing_dates, init_logging, load_frame_csv, log_run_finish,
    log_run_start, logging_config_from_env, plan_folds, run_config_from_env,
    walk_forward_splits, write_frame_csv, FeatureReport,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct FoldSummary {
    index: usize,
    train_end_exclusive: NaiveDate,
    cutoff: NaiveDate,
    holdout_end_exclusive: NaiveDate,
    training_rows: usize,
    validation_rows: usize,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    input_rows: usize,
    groups_checked: usize,
    missing_dates: usize,
    features: FeatureReport,
    schema_version: u32,
    schema_fingerprint: String,
    feature_columns: Vec<String>,
    folds: Vec<FoldSummary>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging = logging_config_from_env();
    init_logging(&logging)?;

    let cfg = run_config_from_env()?;
    let input = cfg
        .input_path
        .clone()
        .or_else(|| std::env::args_os().nth(1).map(PathBuf::from))
        .ok_or("usage: walk_forward_prep <observations.csv> (or set FPREP_INPUT_CSV)")?;
    log_run_start(
        &logging,
        &input.display().to_string(),
        cfg.origin_date.as_deref(),
    );

    let date_column = cfg.layout.date_column.as_str();
    let frame = load_frame_csv(&input, &cfg.layout)?;

    let continuity = find_missing_dates(&frame, date_column, &cfg.group_columns())?;
    eprintln!("{}", continuity.summary());
    for entry in &continuity.entries {
        eprintln!("  missing {} | {}", entry.key, entry.missing_date);
    }

    let (schema, features, report) = derive_features(&frame, &cfg.pipeline)?;

    let folds = match cfg.origin_date.as_ref() {
        Some(origin) => {
            let plan = plan_folds(origin, &cfg.folds)?;
            let splits = walk_forward_splits(&features, date_column, &plan)?;
            plan.iter()
                .zip(&splits)
                .map(|(fold, split)| FoldSummary {
                    index: fold.index,
                    train_end_exclusive: fold.train_end_exclusive,
                    cutoff: fold.cutoff,
                    holdout_end_exclusive: fold.holdout_end_exclusive,
                    training_rows: split.training.len(),
                    validation_rows: split.validation.len(),
                })
                .collect()
        }
        None => Vec::new(),
    };

    if let Some(output) = &cfg.output_path {
        write_frame_csv(&features, fs::File::create(output)?)?;
        eprintln!("features written to {}", output.display());
    }

    log_run_finish(&report, continuity.entries.len(), folds.len());

    let summary = RunSummary {
        input_rows: frame.len(),
        groups_checked: continuity.groups_checked,
        missing_dates: continuity.entries.len(),
        features: report,
        schema_version: schema.version,
        schema_fingerprint: schema.fingerprint.clone(),
        feature_columns: schema
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
        folds,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
