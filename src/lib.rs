//! regsim - Monte-Carlo simulation and power analysis for regression models.
//!
//! The engine generates synthetic datasets from a declarative model
//! specification, fits a regression model to each dataset, repeats the
//! generate-fit-extract cycle under independent random streams, and reduces
//! the replications into empirical operating characteristics: power, Type-I
//! error rate, and coefficient precision.

pub mod aggregate;
pub mod design;
pub mod dist;
pub mod extract;
pub mod fit;
pub mod formula;
pub mod generate;
pub mod output;
pub mod replicate;
pub mod spec;

use thiserror::Error;

pub use aggregate::{summarize, SummaryRow};
pub use design::{assemble_design, simulate_response, Design};
pub use extract::CoefficientRecord;
pub use fit::{build_estimator, Estimator, FitFailure, FitOutcome, FittedModel, ESTIMATOR_IDS};
pub use formula::Formula;
pub use generate::Dataset;
pub use replicate::{expand_sweep, run, run_with, CancelToken, RunResult, SweepCombo};
pub use spec::{ReplicationSpec, SimulationSpec, VariableDef};

#[derive(Debug, Error)]
pub enum RegsimError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid correlation matrix: {0}")]
    InvalidCorrelationMatrix(String),
    #[error("{context} length mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
}
