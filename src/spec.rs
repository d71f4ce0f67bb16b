//! Declarative simulation and replication specifications.
//!
//! `SimulationSpec` describes one synthetic-data recipe; `ReplicationSpec`
//! wraps it with the fitting, sweep, test, and scheduling configuration for
//! a full Monte-Carlo run. Both are plain serde structs validated eagerly,
//! before any simulation work is scheduled.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::fit::ESTIMATOR_IDS;
use crate::formula::Formula;
use crate::RegsimError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ContinuousDist {
    Normal { mean: f64, sd: f64 },
    Uniform { low: f64, high: f64 },
    LogNormal { mean: f64, sd: f64 },
    Exponential { rate: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VariableDef {
    Continuous {
        dist: ContinuousDist,
    },
    Ordinal {
        min: i64,
        max: i64,
        #[serde(default)]
        weights: Vec<f64>,
    },
    Factor {
        levels: Vec<String>,
        #[serde(default)]
        probs: Vec<f64>,
    },
    RandomEffect {
        sd: f64,
    },
}

impl VariableDef {
    /// Number of design columns this variable expands to.
    pub fn design_width(&self) -> usize {
        match self {
            VariableDef::Factor { levels, .. } => levels.len().saturating_sub(1),
            _ => 1,
        }
    }

    fn validate(&self, name: &str) -> Result<(), RegsimError> {
        let bad = |msg: String| Err(RegsimError::InvalidConfig(msg));
        match self {
            VariableDef::Continuous { dist } => match dist {
                ContinuousDist::Normal { sd, .. } | ContinuousDist::LogNormal { sd, .. } => {
                    if *sd <= 0.0 || !sd.is_finite() {
                        return bad(format!("variable '{name}': sd must be positive"));
                    }
                    Ok(())
                }
                ContinuousDist::Uniform { low, high } => {
                    if !(high > low) {
                        return bad(format!("variable '{name}': high must exceed low"));
                    }
                    Ok(())
                }
                ContinuousDist::Exponential { rate } => {
                    if *rate <= 0.0 || !rate.is_finite() {
                        return bad(format!("variable '{name}': rate must be positive"));
                    }
                    Ok(())
                }
            },
            VariableDef::Ordinal { min, max, weights } => {
                if max < min {
                    return bad(format!("variable '{name}': max must be >= min"));
                }
                let span = (max - min + 1) as usize;
                if !weights.is_empty() {
                    if weights.len() != span {
                        return Err(RegsimError::DimensionMismatch {
                            context: "ordinal weights",
                            expected: span,
                            got: weights.len(),
                        });
                    }
                    validate_probs(name, weights)?;
                }
                Ok(())
            }
            VariableDef::Factor { levels, probs } => {
                if levels.len() < 2 {
                    return bad(format!("variable '{name}': factor needs >= 2 levels"));
                }
                let mut seen = levels.clone();
                seen.sort();
                seen.dedup();
                if seen.len() != levels.len() {
                    return bad(format!("variable '{name}': factor levels must be unique"));
                }
                if !probs.is_empty() {
                    if probs.len() != levels.len() {
                        return Err(RegsimError::DimensionMismatch {
                            context: "factor probabilities",
                            expected: levels.len(),
                            got: probs.len(),
                        });
                    }
                    validate_probs(name, probs)?;
                }
                Ok(())
            }
            VariableDef::RandomEffect { sd } => {
                if *sd <= 0.0 || !sd.is_finite() {
                    return bad(format!("variable '{name}': sd must be positive"));
                }
                Ok(())
            }
        }
    }
}

fn validate_probs(name: &str, probs: &[f64]) -> Result<(), RegsimError> {
    if probs.iter().any(|p| *p < 0.0 || !p.is_finite()) {
        return Err(RegsimError::InvalidConfig(format!(
            "variable '{name}': probabilities must be non-negative"
        )));
    }
    if probs.iter().sum::<f64>() <= 0.0 {
        return Err(RegsimError::InvalidConfig(format!(
            "variable '{name}': probabilities must not all be zero"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ErrorDist {
    Normal,
    StudentT { df: f64 },
}

impl Default for ErrorDist {
    fn default() -> Self {
        ErrorDist::Normal
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDef {
    pub sd: f64,
    #[serde(default)]
    pub dist: ErrorDist,
}

impl Default for ErrorDef {
    fn default() -> Self {
        Self {
            sd: 1.0,
            dist: ErrorDist::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFamily {
    Continuous,
    Binary,
    Count,
}

impl Default for ResponseFamily {
    fn default() -> Self {
        ResponseFamily::Continuous
    }
}

impl fmt::Display for ResponseFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseFamily::Continuous => write!(f, "continuous"),
            ResponseFamily::Binary => write!(f, "binary"),
            ResponseFamily::Count => write!(f, "count"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomEffectDef {
    pub group: String,
    pub n_groups: usize,
    pub sd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSpec {
    pub formula: String,
    pub variables: BTreeMap<String, VariableDef>,
    #[serde(default)]
    pub error: ErrorDef,
    pub weights: Vec<f64>,
    pub sample_size: usize,
    #[serde(default)]
    pub family: ResponseFamily,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<Vec<Vec<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_effect: Option<RandomEffectDef>,
}

impl SimulationSpec {
    pub fn parsed_formula(&self) -> Result<Formula, RegsimError> {
        Formula::parse(&self.formula)
    }

    /// Canonical design-column names, in design-matrix order.
    pub fn design_columns(&self) -> Result<Vec<String>, RegsimError> {
        let formula = self.parsed_formula()?;
        self.design_columns_for(&formula)
    }

    pub fn design_columns_for(&self, formula: &Formula) -> Result<Vec<String>, RegsimError> {
        let mut names = Vec::new();
        if formula.intercept {
            names.push("intercept".to_string());
        }
        for term in &formula.terms {
            let def = self.variables.get(term).ok_or_else(|| {
                RegsimError::InvalidConfig(format!(
                    "formula term '{term}' has no variable definition"
                ))
            })?;
            match def {
                VariableDef::Factor { levels, .. } => {
                    // Treatment coding against the first level.
                    for level in &levels[1..] {
                        names.push(format!("{term}[{level}]"));
                    }
                }
                _ => names.push(term.clone()),
            }
        }
        Ok(names)
    }

    /// Continuous predictors in formula order; the correlation matrix (if
    /// any) is declared over exactly these.
    pub fn continuous_terms(&self, formula: &Formula) -> Vec<String> {
        formula
            .terms
            .iter()
            .filter(|t| {
                matches!(
                    self.variables.get(t.as_str()),
                    Some(VariableDef::Continuous { .. })
                )
            })
            .cloned()
            .collect()
    }

    pub fn validate(&self) -> Result<(), RegsimError> {
        if self.sample_size == 0 {
            return Err(RegsimError::InvalidConfig(
                "sample_size must be greater than zero".to_string(),
            ));
        }
        if self.error.sd <= 0.0 || !self.error.sd.is_finite() {
            return Err(RegsimError::InvalidConfig(
                "error sd must be positive and finite".to_string(),
            ));
        }
        if let ErrorDist::StudentT { df } = self.error.dist {
            if df <= 0.0 {
                return Err(RegsimError::InvalidConfig(
                    "error df must be positive".to_string(),
                ));
            }
        }

        let formula = self.parsed_formula()?;
        if self.variables.contains_key(&formula.response) {
            return Err(RegsimError::InvalidConfig(format!(
                "response '{}' must not also be a generated predictor",
                formula.response
            )));
        }
        for (name, def) in &self.variables {
            def.validate(name)?;
            if matches!(def, VariableDef::RandomEffect { .. }) && self.random_effect.is_none() {
                return Err(RegsimError::InvalidConfig(format!(
                    "variable '{name}' is a random effect but no grouping structure is declared"
                )));
            }
        }

        let columns = self.design_columns_for(&formula)?;
        if self.weights.len() != columns.len() {
            return Err(RegsimError::DimensionMismatch {
                context: "regression weights",
                expected: columns.len(),
                got: self.weights.len(),
            });
        }
        if self.weights.iter().any(|w| !w.is_finite()) {
            return Err(RegsimError::InvalidConfig(
                "regression weights must be finite".to_string(),
            ));
        }

        if let Some(corr) = &self.correlation {
            let targets = self.continuous_terms(&formula);
            validate_correlation(corr, targets.len())?;
        }

        match (&self.random_effect, &formula.random_intercept) {
            (None, Some(group)) => {
                return Err(RegsimError::InvalidConfig(format!(
                    "formula declares (1|{group}) but the spec has no random_effect section"
                )));
            }
            (Some(def), declared) => {
                if let Some(group) = declared {
                    if group != &def.group {
                        return Err(RegsimError::InvalidConfig(format!(
                            "random intercept group '{group}' does not match declared group '{}'",
                            def.group
                        )));
                    }
                }
                if def.n_groups == 0 || def.n_groups > self.sample_size {
                    return Err(RegsimError::InvalidConfig(
                        "n_groups must be in [1, sample_size]".to_string(),
                    ));
                }
                if def.sd <= 0.0 || !def.sd.is_finite() {
                    return Err(RegsimError::InvalidConfig(
                        "random-effect sd must be positive".to_string(),
                    ));
                }
                if self.variables.contains_key(&def.group) || def.group == formula.response {
                    return Err(RegsimError::InvalidConfig(format!(
                        "grouping variable '{}' collides with another column",
                        def.group
                    )));
                }
            }
            (None, None) => {}
        }

        Ok(())
    }

    /// Return a copy with one sweep field replaced. Field paths mirror the
    /// spec layout: `sample_size`, `error.sd`, `weights`.
    pub fn with_field(&self, field: &str, value: &SweepValue) -> Result<Self, RegsimError> {
        let mut patched = self.clone();
        match (field, value) {
            ("sample_size", SweepValue::Int(n)) if *n > 0 => {
                patched.sample_size = *n as usize;
            }
            ("error.sd", SweepValue::Float(sd)) => {
                patched.error.sd = *sd;
            }
            ("error.sd", SweepValue::Int(sd)) => {
                patched.error.sd = *sd as f64;
            }
            ("weights", SweepValue::FloatList(w)) => {
                patched.weights = w.clone();
            }
            _ => {
                return Err(RegsimError::InvalidConfig(format!(
                    "cannot vary field '{field}' with value {value}"
                )));
            }
        }
        Ok(patched)
    }
}

fn validate_correlation(corr: &[Vec<f64>], expected_dim: usize) -> Result<(), RegsimError> {
    let k = corr.len();
    if k != expected_dim {
        return Err(RegsimError::InvalidCorrelationMatrix(format!(
            "dimension {k} does not match the {expected_dim} continuous predictors"
        )));
    }
    if k < 2 {
        return Err(RegsimError::InvalidCorrelationMatrix(
            "at least two continuous predictors are required".to_string(),
        ));
    }
    for (i, row) in corr.iter().enumerate() {
        if row.len() != k {
            return Err(RegsimError::InvalidCorrelationMatrix(format!(
                "row {i} has length {}, expected {k}",
                row.len()
            )));
        }
        if (row[i] - 1.0).abs() > 1e-9 {
            return Err(RegsimError::InvalidCorrelationMatrix(
                "diagonal entries must be 1".to_string(),
            ));
        }
        for (j, v) in row.iter().enumerate() {
            if !v.is_finite() || v.abs() > 1.0 + 1e-9 {
                return Err(RegsimError::InvalidCorrelationMatrix(format!(
                    "entry ({i}, {j}) is outside [-1, 1]"
                )));
            }
            if (corr[j][i] - v).abs() > 1e-9 {
                return Err(RegsimError::InvalidCorrelationMatrix(
                    "matrix must be symmetric".to_string(),
                ));
            }
        }
    }
    let m = nalgebra::DMatrix::from_fn(k, k, |i, j| corr[i][j]);
    if m.cholesky().is_none() {
        return Err(RegsimError::InvalidCorrelationMatrix(
            "matrix is not positive definite".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitDef {
    /// Target formula for fitting; defaults to the generating formula.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    pub estimator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<ResponseFamily>,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for FitDef {
    fn default() -> Self {
        Self {
            formula: None,
            estimator: "ols".to_string(),
            family: None,
            max_iter: 50,
            tol: 1e-8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefDist {
    Normal,
    T { df: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerTestDef {
    pub reference: RefDist,
    pub alpha: f64,
    pub two_sided: bool,
}

impl Default for PowerTestDef {
    fn default() -> Self {
        Self {
            reference: RefDist::Normal,
            alpha: 0.05,
            two_sided: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsDef {
    pub power: bool,
    pub type_1_error: bool,
    pub precision: bool,
}

impl Default for MetricsDef {
    fn default() -> Self {
        Self {
            power: true,
            type_1_error: false,
            precision: true,
        }
    }
}

/// One candidate value in a `vary` sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SweepValue {
    Int(i64),
    Float(f64),
    FloatList(Vec<f64>),
}

impl fmt::Display for SweepValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepValue::Int(v) => write!(f, "{v}"),
            SweepValue::Float(v) => write!(f, "{v}"),
            SweepValue::FloatList(vs) => {
                let joined: Vec<String> = vs.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", joined.join(" "))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationSpec {
    pub simulation: SimulationSpec,
    #[serde(default)]
    pub fit: FitDef,
    pub replications: usize,
    #[serde(default)]
    pub vary: BTreeMap<String, Vec<SweepValue>>,
    #[serde(default)]
    pub test: PowerTestDef,
    #[serde(default)]
    pub metrics: MetricsDef,
    #[serde(default)]
    pub seed: u64,
    /// Worker-pool size; 0 means one worker per available core.
    #[serde(default)]
    pub workers: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub keep_records: bool,
}

impl ReplicationSpec {
    pub fn from_toml_str(raw: &str) -> Result<Self, RegsimError> {
        let spec: ReplicationSpec = toml::from_str(raw)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, RegsimError> {
        let spec: ReplicationSpec = serde_json::from_str(raw)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Load from a `.toml` or `.json` file, validating eagerly.
    pub fn from_file(path: &Path) -> Result<Self, RegsimError> {
        let raw = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&raw),
            _ => Self::from_toml_str(&raw),
        }
    }

    /// The fitted formula: the fit override if present, else the generating
    /// formula.
    pub fn fit_formula(&self) -> Result<Formula, RegsimError> {
        match &self.fit.formula {
            Some(raw) => Formula::parse(raw),
            None => self.simulation.parsed_formula(),
        }
    }

    pub fn fit_family(&self) -> ResponseFamily {
        self.fit.family.unwrap_or(self.simulation.family)
    }

    pub fn validate(&self) -> Result<(), RegsimError> {
        self.simulation.validate()?;

        if self.replications == 0 {
            return Err(RegsimError::InvalidConfig(
                "replications must be greater than zero".to_string(),
            ));
        }
        if !ESTIMATOR_IDS.contains(&self.fit.estimator.as_str()) {
            return Err(RegsimError::InvalidConfig(format!(
                "unknown estimator '{}'. valid estimators: {}",
                self.fit.estimator,
                ESTIMATOR_IDS.join(",")
            )));
        }
        if self.fit.max_iter == 0 {
            return Err(RegsimError::InvalidConfig(
                "fit max_iter must be greater than zero".to_string(),
            ));
        }
        if self.fit.tol <= 0.0 {
            return Err(RegsimError::InvalidConfig(
                "fit tol must be positive".to_string(),
            ));
        }

        let fit_formula = self.fit_formula()?;
        for term in &fit_formula.terms {
            if !self.simulation.variables.contains_key(term) {
                return Err(RegsimError::InvalidConfig(format!(
                    "fit formula term '{term}' is not a generated variable"
                )));
            }
        }

        if !(self.test.alpha > 0.0 && self.test.alpha < 1.0) {
            return Err(RegsimError::InvalidConfig(
                "significance level alpha must be in (0, 1)".to_string(),
            ));
        }
        if let RefDist::T { df } = self.test.reference {
            if df <= 0.0 {
                return Err(RegsimError::InvalidConfig(
                    "reference distribution df must be positive".to_string(),
                ));
            }
        }

        if !(self.metrics.power || self.metrics.type_1_error || self.metrics.precision) {
            return Err(RegsimError::InvalidConfig(
                "at least one of power, type_1_error, precision must be requested".to_string(),
            ));
        }
        if self.metrics.type_1_error {
            // Every weight vector the run can see must have a null term,
            // otherwise no Type-I error rate is defined anywhere.
            let has_null = |w: &[f64]| w.iter().any(|v| *v == 0.0);
            let candidates = self.vary.get("weights").map(Vec::as_slice).unwrap_or(&[]);
            if candidates.is_empty() {
                if !has_null(&self.simulation.weights) {
                    return Err(RegsimError::InvalidConfig(
                        "type_1_error requested but the generating model has no zero-weight term"
                            .to_string(),
                    ));
                }
            } else {
                for value in candidates {
                    if let SweepValue::FloatList(w) = value {
                        if !has_null(w) {
                            return Err(RegsimError::InvalidConfig(format!(
                                "type_1_error requested but swept weights {value} have no zero-weight term"
                            )));
                        }
                    }
                }
            }
        }

        for (field, values) in &self.vary {
            if values.is_empty() {
                return Err(RegsimError::InvalidConfig(format!(
                    "vary field '{field}' has no candidate values"
                )));
            }
            for value in values {
                // Patch and re-validate so sweeps fail before any work runs.
                self.simulation.with_field(field, value)?.validate()?;
            }
        }

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::{base_replication_spec, two_predictor_spec};
    use super::{
        ContinuousDist, MetricsDef, RandomEffectDef, ReplicationSpec, SweepValue, VariableDef,
    };
    use crate::RegsimError;

    #[test]
    fn valid_spec_passes() {
        two_predictor_spec().validate().unwrap();
        base_replication_spec().validate().unwrap();
    }

    #[test]
    fn weight_length_mismatch_is_eager() {
        let mut spec = two_predictor_spec();
        spec.weights = vec![0.0, 0.5];
        match spec.validate() {
            Err(RegsimError::DimensionMismatch {
                expected, got, ..
            }) => {
                assert_eq!(expected, 3);
                assert_eq!(got, 2);
            }
            other => panic!("expected DimensionMismatch, got {other:?}"),
        }
    }

    #[test]
    fn factor_expands_to_dummy_columns() {
        let mut spec = two_predictor_spec();
        spec.variables.insert(
            "arm".to_string(),
            VariableDef::Factor {
                levels: vec!["placebo".into(), "low".into(), "high".into()],
                probs: Vec::new(),
            },
        );
        spec.formula = "y ~ x1 + x2 + arm".to_string();
        spec.weights = vec![0.0, 0.5, 0.0, 0.3, 0.6];
        spec.validate().unwrap();
        assert_eq!(
            spec.design_columns().unwrap(),
            vec!["intercept", "x1", "x2", "arm[low]", "arm[high]"]
        );
    }

    #[test]
    fn asymmetric_correlation_is_rejected() {
        let mut spec = two_predictor_spec();
        spec.correlation = Some(vec![vec![1.0, 0.8], vec![0.2, 1.0]]);
        assert!(matches!(
            spec.validate(),
            Err(RegsimError::InvalidCorrelationMatrix(_))
        ));
    }

    #[test]
    fn non_positive_definite_correlation_is_rejected() {
        let mut spec = two_predictor_spec();
        spec.variables.insert(
            "x3".to_string(),
            VariableDef::Continuous {
                dist: ContinuousDist::Normal { mean: 0.0, sd: 1.0 },
            },
        );
        spec.formula = "y ~ x1 + x2 + x3".to_string();
        spec.weights = vec![0.0, 0.5, 0.0, 0.0];
        spec.correlation = Some(vec![
            vec![1.0, 0.9, -0.9],
            vec![0.9, 1.0, 0.9],
            vec![-0.9, 0.9, 1.0],
        ]);
        assert!(matches!(
            spec.validate(),
            Err(RegsimError::InvalidCorrelationMatrix(_))
        ));
    }

    #[test]
    fn random_intercept_requires_declared_grouping() {
        let mut spec = two_predictor_spec();
        spec.formula = "y ~ x1 + x2 + (1|clinic)".to_string();
        assert!(spec.validate().is_err());

        spec.random_effect = Some(RandomEffectDef {
            group: "clinic".to_string(),
            n_groups: 10,
            sd: 0.5,
        });
        spec.validate().unwrap();
    }

    #[test]
    fn unknown_estimator_is_rejected() {
        let mut spec = base_replication_spec();
        spec.fit.estimator = "brms".to_string();
        assert!(matches!(
            spec.validate(),
            Err(RegsimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn all_metrics_off_is_rejected() {
        let mut spec = base_replication_spec();
        spec.metrics = MetricsDef {
            power: false,
            type_1_error: false,
            precision: false,
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn type_1_error_without_a_null_term_fails_validation() {
        let mut spec = base_replication_spec();
        spec.metrics.type_1_error = true;
        spec.validate().unwrap();

        spec.simulation.weights = vec![0.1, 0.5, 0.3];
        assert!(matches!(
            spec.validate(),
            Err(RegsimError::InvalidConfig(_))
        ));

        // Swept weight vectors are held to the same requirement.
        spec.simulation.weights = vec![0.0, 0.5, 0.0];
        spec.vary.insert(
            "weights".to_string(),
            vec![SweepValue::FloatList(vec![0.2, 0.5, 0.1])],
        );
        assert!(matches!(
            spec.validate(),
            Err(RegsimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn vary_with_unknown_field_fails_before_running() {
        let mut spec = base_replication_spec();
        spec.vary
            .insert("formula".to_string(), vec![SweepValue::Int(1)]);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn toml_round_trip_preserves_the_spec() {
        let spec = base_replication_spec();
        let raw = toml::to_string(&spec).unwrap();
        let back = ReplicationSpec::from_toml_str(&raw).unwrap();
        assert_eq!(back.replications, spec.replications);
        assert_eq!(back.simulation.weights, spec.simulation.weights);
        assert_eq!(back.simulation.sample_size, spec.simulation.sample_size);
    }
}
