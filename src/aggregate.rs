//! Statistics aggregation.
//!
//! Reduces the coefficient-record table into one summary row per
//! (sweep-combination, term): empirical power, Type-I error rate for null
//! terms, and precision. Denominators are successful replications only;
//! failure and skip counts ride along in every row so partial runs stay
//! honest.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::dist::{normal_quantile, t_critical_one_sided, t_critical_two_sided};
use crate::extract::CoefficientRecord;
use crate::replicate::RunResult;
use crate::spec::{PowerTestDef, RefDist, ReplicationSpec, SimulationSpec};
use crate::RegsimError;

#[derive(Debug, Clone, Serialize)]
pub struct SummaryRow {
    pub combo_index: usize,
    pub combo: BTreeMap<String, String>,
    pub term: String,
    pub n_requested: usize,
    pub n_success: usize,
    pub n_failed: usize,
    pub n_skipped: usize,
    pub power: Option<f64>,
    pub type_1_error: Option<f64>,
    pub mean_std_error: Option<f64>,
    pub median_std_error: Option<f64>,
    pub ci_half_width: Option<f64>,
}

/// Critical value implied by the configured reference distribution.
pub fn critical_value(test: &PowerTestDef) -> f64 {
    match test.reference {
        RefDist::Normal => {
            let upper = if test.two_sided {
                1.0 - 0.5 * test.alpha
            } else {
                1.0 - test.alpha
            };
            normal_quantile(upper)
        }
        RefDist::T { df } => {
            if test.two_sided {
                t_critical_two_sided(test.alpha, df)
            } else {
                t_critical_one_sided(test.alpha, df)
            }
        }
    }
}

/// True generating weight for each design column of a simulation spec.
fn generating_weights(spec: &SimulationSpec) -> Result<BTreeMap<String, f64>, RegsimError> {
    let columns = spec.design_columns()?;
    Ok(columns.into_iter().zip(spec.weights.iter().copied()).collect())
}

fn rejects(record: &CoefficientRecord, crit: f64, two_sided: bool) -> bool {
    if two_sided {
        record.statistic.abs() > crit
    } else {
        record.statistic > crit
    }
}

/// Type-I error rate for one named term, pooled over all combinations.
/// Requesting it for a term with a nonzero generating weight is a
/// configuration error, not a silent zero.
pub fn type_1_error_for_term(
    spec: &ReplicationSpec,
    records: &[CoefficientRecord],
    term: &str,
) -> Result<f64, RegsimError> {
    let weights = generating_weights(&spec.simulation)?;
    match weights.get(term) {
        None => {
            return Err(RegsimError::InvalidConfig(format!(
                "term '{term}' is not a design column of the generating model"
            )));
        }
        Some(w) if *w != 0.0 => {
            return Err(RegsimError::InvalidConfig(format!(
                "type_1_error requested for term '{term}' whose generating weight is {w}, not zero"
            )));
        }
        Some(_) => {}
    }

    let crit = critical_value(&spec.test);
    let matching: Vec<&CoefficientRecord> =
        records.iter().filter(|r| r.term == term).collect();
    if matching.is_empty() {
        return Err(RegsimError::InvalidConfig(format!(
            "no successful replications recorded for term '{term}'"
        )));
    }
    let rejected = matching
        .iter()
        .filter(|r| rejects(r, crit, spec.test.two_sided))
        .count();
    Ok(rejected as f64 / matching.len() as f64)
}

/// Reduce a run into one row per (combination, term).
pub fn summarize(
    spec: &ReplicationSpec,
    result: &RunResult,
) -> Result<Vec<SummaryRow>, RegsimError> {
    if !(spec.metrics.power || spec.metrics.type_1_error || spec.metrics.precision) {
        return Err(RegsimError::InvalidConfig(
            "at least one of power, type_1_error, precision must be requested".to_string(),
        ));
    }

    let fit_formula = spec.fit_formula()?;
    let crit = critical_value(&spec.test);

    // One pass over the record table, then constant-time lookups per
    // (combination, term) group.
    let mut grouped: BTreeMap<(usize, &str), Vec<&CoefficientRecord>> = BTreeMap::new();
    for record in &result.records {
        grouped
            .entry((record.combo_index, record.term.as_str()))
            .or_default()
            .push(record);
    }

    let mut rows = Vec::new();

    for combo in &result.combos {
        let terms = combo.spec.design_columns_for(&fit_formula)?;
        let weights = generating_weights(&combo.spec)?;

        if spec.metrics.type_1_error
            && !terms.iter().any(|t| weights.get(t) == Some(&0.0))
        {
            return Err(RegsimError::InvalidConfig(
                "type_1_error requested but the generating model has no zero-weight term"
                    .to_string(),
            ));
        }

        let n_failed = result.failed_for(combo.index);
        let n_skipped = result.skipped_by_combo.get(combo.index).copied().unwrap_or(0);

        for term in &terms {
            let matching: &[&CoefficientRecord] = grouped
                .get(&(combo.index, term.as_str()))
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let n_success = matching.len();

            let rejection_rate = if n_success > 0 {
                let rejected = matching
                    .iter()
                    .filter(|r| rejects(r, crit, spec.test.two_sided))
                    .count();
                Some(rejected as f64 / n_success as f64)
            } else {
                None
            };

            let power = if spec.metrics.power { rejection_rate } else { None };
            let type_1_error = if spec.metrics.type_1_error
                && weights.get(term) == Some(&0.0)
            {
                rejection_rate
            } else {
                None
            };

            let (mean_se, median_se, half_width) = if spec.metrics.precision && n_success > 0 {
                let mut ses: Vec<f64> = matching.iter().map(|r| r.std_error).collect();
                ses.sort_by(f64::total_cmp);
                let mean = ses.iter().sum::<f64>() / n_success as f64;
                let median = if n_success % 2 == 1 {
                    ses[n_success / 2]
                } else {
                    0.5 * (ses[n_success / 2 - 1] + ses[n_success / 2])
                };
                (Some(mean), Some(median), Some(crit * mean))
            } else {
                (None, None, None)
            };

            rows.push(SummaryRow {
                combo_index: combo.index,
                combo: combo.values.clone(),
                term: term.clone(),
                n_requested: spec.replications,
                n_success,
                n_failed,
                n_skipped,
                power,
                type_1_error,
                mean_std_error: mean_se,
                median_std_error: median_se,
                ci_half_width: half_width,
            });
        }
    }

    Ok(rows)
}
