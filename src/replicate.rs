//! Replication orchestration.
//!
//! Expands the `vary` sweep into independent simulation specs, schedules
//! `replications` generate-fit-extract tasks per combination over a scoped
//! rayon pool, and collects successes and failures separately.
//!
//! Randomness policy: every task seeds its own `ChaCha8Rng` from the run
//! seed and selects a stream derived from (combination, replication), so a
//! fixed run seed gives bit-identical records under any worker count and
//! any scheduling order.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;

use crate::design::{assemble_design, simulate_response};
use crate::extract::{extract_records, CoefficientRecord};
use crate::fit::{build_estimator, Estimator, FitFailure, FitOptions, FitOutcome};
use crate::generate::generate_predictors;
use crate::spec::{ReplicationSpec, SimulationSpec};
use crate::RegsimError;

/// One concrete assignment of values to all swept fields.
#[derive(Debug, Clone, Serialize)]
pub struct SweepCombo {
    pub index: usize,
    pub values: BTreeMap<String, String>,
    pub spec: SimulationSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub combo_index: usize,
    pub combo: BTreeMap<String, String>,
    pub replication: usize,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub combos: Vec<SweepCombo>,
    pub records: Vec<CoefficientRecord>,
    pub failures: Vec<FailureRecord>,
    /// Replications skipped by cancellation, per combination.
    pub skipped_by_combo: Vec<usize>,
}

impl RunResult {
    pub fn skipped(&self) -> usize {
        self.skipped_by_combo.iter().sum()
    }

    pub fn failed_for(&self, combo_index: usize) -> usize {
        self.failures
            .iter()
            .filter(|f| f.combo_index == combo_index)
            .count()
    }
}

/// Cooperative run-level cancellation. Cancelling skips not-yet-started
/// replications; finished records stay valid.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Expand `vary` into the Cartesian product of sweep combinations, in the
/// declared (sorted-key) field order.
pub fn expand_sweep(spec: &ReplicationSpec) -> Result<Vec<SweepCombo>, RegsimError> {
    if spec.vary.is_empty() {
        return Ok(vec![SweepCombo {
            index: 0,
            values: BTreeMap::new(),
            spec: spec.simulation.clone(),
        }]);
    }

    let fields: Vec<_> = spec.vary.iter().collect();
    let mut combos = Vec::new();
    let mut odometer = vec![0usize; fields.len()];

    loop {
        let mut patched = spec.simulation.clone();
        let mut values = BTreeMap::new();
        for (slot, (field, candidates)) in odometer.iter().zip(&fields) {
            let value = &candidates[*slot];
            patched = patched.with_field(field, value)?;
            values.insert((*field).clone(), value.to_string());
        }
        patched.validate()?;
        combos.push(SweepCombo {
            index: combos.len(),
            values,
            spec: patched,
        });

        let mut pos = fields.len();
        loop {
            if pos == 0 {
                return Ok(combos);
            }
            pos -= 1;
            odometer[pos] += 1;
            if odometer[pos] < fields[pos].1.len() {
                break;
            }
            odometer[pos] = 0;
        }
    }
}

/// Run with the estimator named in the spec and a fresh cancellation token.
pub fn run(spec: &ReplicationSpec) -> Result<RunResult, RegsimError> {
    spec.validate()?;
    let estimator = build_estimator(&spec.fit.estimator).ok_or_else(|| {
        RegsimError::InvalidConfig(format!("unknown estimator '{}'", spec.fit.estimator))
    })?;
    run_with(spec, estimator, &CancelToken::new())
}

enum TaskOutcome {
    Records(Vec<CoefficientRecord>),
    Failure(FailureRecord),
    Skipped(usize),
}

/// Run one full Monte-Carlo batch with an explicit estimator.
///
/// The worker pool is acquired here and dropped on every exit path; the
/// record table is ordered by (combination, replication) no matter how the
/// pool schedules tasks.
pub fn run_with(
    spec: &ReplicationSpec,
    estimator: Arc<dyn Estimator>,
    cancel: &CancelToken,
) -> Result<RunResult, RegsimError> {
    spec.validate()?;
    let combos = expand_sweep(spec)?;
    let fit_formula = spec.fit_formula()?;
    let opts = FitOptions {
        family: spec.fit_family(),
        max_iter: spec.fit.max_iter,
        tol: spec.fit.tol,
    };

    let tasks: Vec<(usize, usize)> = combos
        .iter()
        .flat_map(|c| (0..spec.replications).map(move |rep| (c.index, rep)))
        .collect();

    let run_one = |&(combo_index, replication): &(usize, usize)| -> TaskOutcome {
        if cancel.is_cancelled() {
            return TaskOutcome::Skipped(combo_index);
        }
        let combo = &combos[combo_index];
        let stream = (combo_index * spec.replications + replication) as u64;
        let mut rng = ChaCha8Rng::seed_from_u64(spec.seed);
        rng.set_stream(stream);

        let fail = |reason: String| {
            TaskOutcome::Failure(FailureRecord {
                combo_index,
                combo: combo.values.clone(),
                replication,
                reason,
            })
        };

        let sim_formula = match combo.spec.parsed_formula() {
            Ok(f) => f,
            Err(e) => return fail(e.to_string()),
        };
        let data = match generate_predictors(&combo.spec, &sim_formula, &mut rng) {
            Ok(d) => d,
            Err(e) => return fail(e.to_string()),
        };
        let gen_design = match assemble_design(&combo.spec, &sim_formula, &data) {
            Ok(d) => d,
            Err(e) => return fail(e.to_string()),
        };
        let response =
            match simulate_response(&combo.spec, &sim_formula, &gen_design, &data, &mut rng) {
                Ok(y) => y,
                Err(e) => return fail(e.to_string()),
            };
        let fit_design = match assemble_design(&combo.spec, &fit_formula, &data) {
            Ok(d) => d,
            Err(e) => return fail(e.to_string()),
        };

        let outcome = fit_guarded(
            Arc::clone(&estimator),
            &fit_design,
            &response,
            opts,
            spec.timeout_ms,
        );
        match outcome {
            FitOutcome::Fitted(model) => TaskOutcome::Records(extract_records(
                &model,
                combo_index,
                &combo.values,
                replication,
            )),
            FitOutcome::Failure(f) => fail(f.as_str().to_string()),
        }
    };

    let outcomes: Vec<TaskOutcome> = if spec.workers > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(spec.workers)
            .build()
            .map_err(|e| {
                RegsimError::InvalidConfig(format!("failed to build worker pool: {e}"))
            })?;
        pool.install(|| tasks.par_iter().map(run_one).collect())
    } else {
        tasks.par_iter().map(run_one).collect()
    };

    let mut records = Vec::new();
    let mut failures = Vec::new();
    let mut skipped_by_combo = vec![0usize; combos.len()];
    for outcome in outcomes {
        match outcome {
            TaskOutcome::Records(mut r) => records.append(&mut r),
            TaskOutcome::Failure(f) => failures.push(f),
            TaskOutcome::Skipped(ci) => skipped_by_combo[ci] += 1,
        }
    }

    Ok(RunResult {
        combos,
        records,
        failures,
        skipped_by_combo,
    })
}

/// Run a fit with panic containment and an optional wall-clock timeout.
/// A timed-out helper thread is abandoned; the task reports `Timeout`.
fn fit_guarded(
    estimator: Arc<dyn Estimator>,
    design: &crate::design::Design,
    response: &[f64],
    opts: FitOptions,
    timeout_ms: Option<u64>,
) -> FitOutcome {
    match timeout_ms {
        None => match catch_unwind(AssertUnwindSafe(|| estimator.fit(design, response, &opts))) {
            Ok(outcome) => outcome,
            Err(_) => FitOutcome::Failure(FitFailure::Panicked),
        },
        Some(ms) => {
            let (tx, rx) = mpsc::channel();
            let design = design.clone();
            let response = response.to_vec();
            thread::spawn(move || {
                let result =
                    catch_unwind(AssertUnwindSafe(|| estimator.fit(&design, &response, &opts)));
                let _ = tx.send(result);
            });
            match rx.recv_timeout(Duration::from_millis(ms)) {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => FitOutcome::Failure(FitFailure::Panicked),
                Err(_) => FitOutcome::Failure(FitFailure::Timeout),
            }
        }
    }
}
