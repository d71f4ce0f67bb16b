//! CSV and manifest output.
//!
//! Row-oriented tables with fixed column ordering, plus a JSON manifest
//! recording the run seed and per-combination failure counts so any result
//! set can be reproduced from its output directory alone.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use csv::Writer;
use serde::Serialize;

use crate::aggregate::SummaryRow;
use crate::extract::CoefficientRecord;
use crate::replicate::RunResult;
use crate::spec::ReplicationSpec;
use crate::RegsimError;

pub const OUTPUT_SCHEMA_VERSION: &str = "1";

pub fn create_timestamped_output_dir(base: &Path) -> Result<PathBuf, RegsimError> {
    fs::create_dir_all(base)?;

    let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let mut output_dir = base.join(&timestamp);
    let mut counter = 1_u32;

    while output_dir.exists() {
        output_dir = base.join(format!("{timestamp}-{counter:02}"));
        counter += 1;
    }

    fs::create_dir_all(&output_dir)?;
    Ok(output_dir)
}

fn fmt_f64(value: f64) -> String {
    format!("{value:.10}")
}

fn fmt_option_f64(value: Option<f64>) -> String {
    value.map(fmt_f64).unwrap_or_default()
}

fn combo_label(combo: &BTreeMap<String, String>) -> String {
    if combo.is_empty() {
        return "-".to_string();
    }
    let parts: Vec<String> = combo.iter().map(|(k, v)| format!("{k}={v}")).collect();
    parts.join(";")
}

pub fn write_records_csv(path: &Path, records: &[CoefficientRecord]) -> Result<(), RegsimError> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record([
        "combo",
        "replication",
        "term",
        "estimate",
        "std_error",
        "statistic",
        "p_value",
    ])?;
    for record in records {
        writer.write_record([
            combo_label(&record.combo),
            record.replication.to_string(),
            record.term.clone(),
            fmt_f64(record.estimate),
            fmt_f64(record.std_error),
            fmt_f64(record.statistic),
            fmt_f64(record.p_value),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_summary_csv(path: &Path, rows: &[SummaryRow]) -> Result<(), RegsimError> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record([
        "combo",
        "term",
        "n_requested",
        "n_success",
        "n_failed",
        "n_skipped",
        "power",
        "type_1_error",
        "mean_std_error",
        "median_std_error",
        "ci_half_width",
    ])?;
    for row in rows {
        writer.write_record([
            combo_label(&row.combo),
            row.term.clone(),
            row.n_requested.to_string(),
            row.n_success.to_string(),
            row.n_failed.to_string(),
            row.n_skipped.to_string(),
            fmt_option_f64(row.power),
            fmt_option_f64(row.type_1_error),
            fmt_option_f64(row.mean_std_error),
            fmt_option_f64(row.median_std_error),
            fmt_option_f64(row.ci_half_width),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_failures_csv(path: &Path, result: &RunResult) -> Result<(), RegsimError> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record(["combo", "replication", "reason"])?;
    for failure in &result.failures {
        writer.write_record([
            combo_label(&failure.combo),
            failure.replication.to_string(),
            failure.reason.clone(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub schema_version: String,
    pub seed: u64,
    pub replications: usize,
    pub estimator: String,
    pub workers: usize,
    pub combos: Vec<ManifestCombo>,
    pub n_records: usize,
    pub n_failed: usize,
    pub n_skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestCombo {
    pub index: usize,
    pub values: BTreeMap<String, String>,
    pub n_failed: usize,
    pub n_skipped: usize,
}

pub fn build_manifest(spec: &ReplicationSpec, result: &RunResult) -> Manifest {
    let combos = result
        .combos
        .iter()
        .map(|c| ManifestCombo {
            index: c.index,
            values: c.values.clone(),
            n_failed: result.failed_for(c.index),
            n_skipped: result.skipped_by_combo.get(c.index).copied().unwrap_or(0),
        })
        .collect();
    Manifest {
        schema_version: OUTPUT_SCHEMA_VERSION.to_string(),
        seed: spec.seed,
        replications: spec.replications,
        estimator: spec.fit.estimator.clone(),
        workers: spec.workers,
        combos,
        n_records: result.records.len(),
        n_failed: result.failures.len(),
        n_skipped: result.skipped(),
    }
}

pub fn write_manifest_json(path: &Path, manifest: &Manifest) -> Result<(), RegsimError> {
    let raw = serde_json::to_string_pretty(manifest)?;
    fs::write(path, raw)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{
        build_manifest, combo_label, create_timestamped_output_dir, write_failures_csv,
        write_records_csv, write_summary_csv, write_manifest_json,
    };
    use crate::replicate::run;
    use crate::spec::testutil::base_replication_spec;
    use crate::{aggregate, spec::SweepValue};

    #[test]
    fn combo_label_is_stable_and_readable() {
        assert_eq!(combo_label(&BTreeMap::new()), "-");
        let mut combo = BTreeMap::new();
        combo.insert("sample_size".to_string(), "50".to_string());
        combo.insert("error.sd".to_string(), "2".to_string());
        assert_eq!(combo_label(&combo), "error.sd=2;sample_size=50");
    }

    #[test]
    fn csv_tables_round_trip_row_counts() {
        let mut spec = base_replication_spec();
        spec.replications = 5;
        spec.simulation.sample_size = 30;
        spec.vary.insert(
            "sample_size".to_string(),
            vec![SweepValue::Int(30), SweepValue::Int(60)],
        );

        let result = run(&spec).unwrap();
        let rows = aggregate::summarize(&spec, &result).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let records_path = dir.path().join("records.csv");
        let summary_path = dir.path().join("summary.csv");
        let failures_path = dir.path().join("failures.csv");
        write_records_csv(&records_path, &result.records).unwrap();
        write_summary_csv(&summary_path, &rows).unwrap();
        write_failures_csv(&failures_path, &result).unwrap();

        let mut reader = csv::Reader::from_path(&records_path).unwrap();
        assert_eq!(reader.records().count(), result.records.len());
        let mut reader = csv::Reader::from_path(&summary_path).unwrap();
        assert_eq!(reader.records().count(), rows.len());

        let manifest = build_manifest(&spec, &result);
        assert_eq!(manifest.combos.len(), 2);
        assert_eq!(manifest.n_records, result.records.len());
        let manifest_path = dir.path().join("manifest.json");
        write_manifest_json(&manifest_path, &manifest).unwrap();
        assert!(manifest_path.exists());
    }

    #[test]
    fn output_dirs_never_collide() {
        let base = tempfile::tempdir().unwrap();
        let first = create_timestamped_output_dir(base.path()).unwrap();
        let second = create_timestamped_output_dir(base.path()).unwrap();
        assert_ne!(first, second);
        assert!(first.is_dir());
        assert!(second.is_dir());
    }
}
