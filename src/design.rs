//! Design-matrix assembly and response simulation.
//!
//! The assembler turns the generated predictor table into a numeric design
//! matrix per the model formula (intercept first, factors expanded to
//! treatment-coded dummies). The response generator computes the linear
//! predictor `X * weights`, adds any group-level random intercept, then
//! applies the response family: identity plus error for continuous, logit
//! inverse link into a Bernoulli draw for binary, log inverse link into a
//! Poisson draw for count.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Bernoulli, Distribution, Normal, Poisson, StudentT};

use crate::formula::Formula;
use crate::generate::Dataset;
use crate::spec::{ErrorDist, ResponseFamily, SimulationSpec, VariableDef};
use crate::RegsimError;

#[derive(Debug, Clone)]
pub struct Design {
    pub matrix: DMatrix<f64>,
    pub names: Vec<String>,
}

impl Design {
    pub fn n_rows(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.matrix.ncols()
    }
}

pub fn assemble_design(
    spec: &SimulationSpec,
    formula: &Formula,
    data: &Dataset,
) -> Result<Design, RegsimError> {
    let names = spec.design_columns_for(formula)?;
    let n = data.n;
    let mut matrix = DMatrix::zeros(n, names.len());

    let mut col = 0;
    if formula.intercept {
        matrix.column_mut(col).fill(1.0);
        col += 1;
    }

    for term in &formula.terms {
        let def = spec.variables.get(term).ok_or_else(|| {
            RegsimError::InvalidConfig(format!("formula term '{term}' has no variable definition"))
        })?;
        let values = data.column(term).ok_or_else(|| {
            RegsimError::InvalidConfig(format!("dataset is missing column '{term}'"))
        })?;
        if values.len() != n {
            return Err(RegsimError::DimensionMismatch {
                context: "predictor column",
                expected: n,
                got: values.len(),
            });
        }
        match def {
            VariableDef::Factor { levels, .. } => {
                // One dummy per non-reference level.
                for dummy in 1..levels.len() {
                    for (row, v) in values.iter().enumerate() {
                        matrix[(row, col)] = if *v as usize == dummy { 1.0 } else { 0.0 };
                    }
                    col += 1;
                }
            }
            _ => {
                for (row, v) in values.iter().enumerate() {
                    matrix[(row, col)] = *v;
                }
                col += 1;
            }
        }
    }

    Ok(Design { matrix, names })
}

/// Linear predictor `X * weights` plus the random-intercept contribution.
pub fn linear_predictor(
    spec: &SimulationSpec,
    formula: &Formula,
    design: &Design,
    data: &Dataset,
) -> Result<DVector<f64>, RegsimError> {
    if spec.weights.len() != design.n_cols() {
        return Err(RegsimError::DimensionMismatch {
            context: "regression weights",
            expected: design.n_cols(),
            got: spec.weights.len(),
        });
    }
    let weights = DVector::from_column_slice(&spec.weights);
    let mut eta = &design.matrix * weights;

    if formula.random_intercept.is_some() {
        let group = data.group.as_ref().ok_or_else(|| {
            RegsimError::InvalidConfig(
                "formula declares a random intercept but the dataset has no groups".to_string(),
            )
        })?;
        for (row, &g) in group.assignment.iter().enumerate() {
            eta[row] += group.intercepts[g];
        }
    }

    Ok(eta)
}

pub fn simulate_response(
    spec: &SimulationSpec,
    formula: &Formula,
    design: &Design,
    data: &Dataset,
    rng: &mut impl Rng,
) -> Result<Vec<f64>, RegsimError> {
    let eta = linear_predictor(spec, formula, design, data)?;
    let n = eta.len();
    let mut response = Vec::with_capacity(n);

    match spec.family {
        ResponseFamily::Continuous => match spec.error.dist {
            ErrorDist::Normal => {
                let noise = Normal::new(0.0, spec.error.sd).map_err(|e| {
                    RegsimError::InvalidConfig(format!("invalid error distribution: {e}"))
                })?;
                for i in 0..n {
                    response.push(eta[i] + noise.sample(rng));
                }
            }
            ErrorDist::StudentT { df } => {
                let noise = StudentT::new(df).map_err(|e| {
                    RegsimError::InvalidConfig(format!("invalid error distribution: {e}"))
                })?;
                for i in 0..n {
                    response.push(eta[i] + spec.error.sd * noise.sample(rng));
                }
            }
        },
        ResponseFamily::Binary => {
            for i in 0..n {
                let p = inverse_logit(eta[i]);
                let draw = Bernoulli::new(p).map_err(|e| {
                    RegsimError::InvalidConfig(format!("invalid success probability: {e}"))
                })?;
                response.push(if draw.sample(rng) { 1.0 } else { 0.0 });
            }
        }
        ResponseFamily::Count => {
            for i in 0..n {
                // Keep the rate away from the Poisson sampler's failure modes.
                let rate = eta[i].exp().clamp(1e-12, 1e8);
                let draw = Poisson::new(rate).map_err(|e| {
                    RegsimError::InvalidConfig(format!("invalid count rate: {e}"))
                })?;
                let v: f64 = draw.sample(rng);
                response.push(v);
            }
        }
    }

    Ok(response)
}

pub fn inverse_logit(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
