//! Model fitting behind a uniform estimator interface.
//!
//! The engine never lets an estimator error escape: every fit returns either
//! a `FittedModel` or a recorded `FitFailure`. Two estimators ship with the
//! crate (`ols` for the continuous family, `irls` for the generalized
//! families); anything implementing `Estimator` can stand in for them.

use std::sync::Arc;

use nalgebra::{Cholesky, DMatrix, DVector};
use serde::Serialize;

use crate::design::{inverse_logit, Design};
use crate::dist::{normal_p_value, t_p_value};
use crate::spec::ResponseFamily;

#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    pub family: ResponseFamily,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            family: ResponseFamily::Continuous,
            max_iter: 50,
            tol: 1e-8,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FittedModel {
    pub terms: Vec<String>,
    pub estimates: Vec<f64>,
    pub std_errors: Vec<f64>,
    pub statistics: Vec<f64>,
    pub p_values: Vec<f64>,
    pub df_resid: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FitFailure {
    Singular,
    NonConverged,
    NonFinite,
    Timeout,
    Panicked,
}

impl FitFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitFailure::Singular => "singular",
            FitFailure::NonConverged => "non_converged",
            FitFailure::NonFinite => "non_finite",
            FitFailure::Timeout => "timeout",
            FitFailure::Panicked => "panicked",
        }
    }
}

#[derive(Debug, Clone)]
pub enum FitOutcome {
    Fitted(FittedModel),
    Failure(FitFailure),
}

pub trait Estimator: Send + Sync {
    fn id(&self) -> &'static str;
    fn fit(&self, design: &Design, response: &[f64], opts: &FitOptions) -> FitOutcome;
}

pub const ESTIMATOR_IDS: [&str; 2] = ["ols", "irls"];

pub fn build_estimator(id: &str) -> Option<Arc<dyn Estimator>> {
    match id {
        "ols" => Some(Arc::new(OlsEstimator)),
        "irls" => Some(Arc::new(IrlsEstimator)),
        _ => None,
    }
}

/// Ordinary least squares via the normal equations.
pub struct OlsEstimator;

impl Estimator for OlsEstimator {
    fn id(&self) -> &'static str {
        "ols"
    }

    fn fit(&self, design: &Design, response: &[f64], _opts: &FitOptions) -> FitOutcome {
        ols_fit(design, response)
    }
}

fn ols_fit(design: &Design, response: &[f64]) -> FitOutcome {
    let x = &design.matrix;
    let n = x.nrows();
    let p = x.ncols();
    if response.len() != n || n <= p {
        return FitOutcome::Failure(FitFailure::Singular);
    }

    let y = DVector::from_column_slice(response);
    let xtx = x.transpose() * x;
    let xty = x.transpose() * &y;

    let Some(chol) = Cholesky::new(xtx) else {
        return FitOutcome::Failure(FitFailure::Singular);
    };
    let beta = chol.solve(&xty);
    let cov_unscaled = chol.inverse();

    let resid = &y - x * &beta;
    let rss: f64 = resid.iter().map(|r| r * r).sum();
    let df_resid = (n - p) as f64;
    let s2 = rss / df_resid;

    finalize(design, beta, cov_unscaled * s2, df_resid, Statistic::T)
}

/// Iteratively reweighted least squares for logit- and log-link GLMs.
/// The continuous family degrades to a single unweighted solve.
pub struct IrlsEstimator;

impl Estimator for IrlsEstimator {
    fn id(&self) -> &'static str {
        "irls"
    }

    fn fit(&self, design: &Design, response: &[f64], opts: &FitOptions) -> FitOutcome {
        if opts.family == ResponseFamily::Continuous {
            return ols_fit(design, response);
        }

        let x = &design.matrix;
        let n = x.nrows();
        let p = x.ncols();
        if response.len() != n || n <= p {
            return FitOutcome::Failure(FitFailure::Singular);
        }

        let mut beta = DVector::<f64>::zeros(p);
        let mut cov = DMatrix::<f64>::zeros(p, p);
        let mut converged = false;

        for _ in 0..opts.max_iter {
            let eta = x * &beta;
            let mut xtwx = DMatrix::<f64>::zeros(p, p);
            let mut xtwz = DVector::<f64>::zeros(p);

            for i in 0..n {
                let (mu, w) = match opts.family {
                    ResponseFamily::Binary => {
                        let mu = inverse_logit(eta[i]);
                        (mu, (mu * (1.0 - mu)).max(1e-10))
                    }
                    ResponseFamily::Count => {
                        let mu = eta[i].exp().clamp(1e-10, 1e10);
                        (mu, mu)
                    }
                    ResponseFamily::Continuous => unreachable!(),
                };
                let z = eta[i] + (response[i] - mu) / w;
                if !z.is_finite() || !w.is_finite() {
                    return FitOutcome::Failure(FitFailure::NonFinite);
                }
                let row = x.row(i);
                for a in 0..p {
                    let wa = w * row[a];
                    xtwz[a] += wa * z;
                    for b in a..p {
                        xtwx[(a, b)] += wa * row[b];
                    }
                }
            }
            for a in 0..p {
                for b in 0..a {
                    xtwx[(a, b)] = xtwx[(b, a)];
                }
            }

            let Some(chol) = Cholesky::new(xtwx) else {
                return FitOutcome::Failure(FitFailure::Singular);
            };
            let next = chol.solve(&xtwz);
            if next.iter().any(|v| !v.is_finite()) {
                return FitOutcome::Failure(FitFailure::NonFinite);
            }

            let delta = (&next - &beta).amax();
            beta = next;
            if delta < opts.tol {
                cov = chol.inverse();
                converged = true;
                break;
            }
        }

        if !converged {
            return FitOutcome::Failure(FitFailure::NonConverged);
        }

        let df_resid = (n - p) as f64;
        finalize(design, beta, cov, df_resid, Statistic::Z)
    }
}

enum Statistic {
    T,
    Z,
}

fn finalize(
    design: &Design,
    beta: DVector<f64>,
    cov: DMatrix<f64>,
    df_resid: f64,
    statistic: Statistic,
) -> FitOutcome {
    let p = beta.len();
    let mut estimates = Vec::with_capacity(p);
    let mut std_errors = Vec::with_capacity(p);
    let mut statistics = Vec::with_capacity(p);
    let mut p_values = Vec::with_capacity(p);

    for j in 0..p {
        let est = beta[j];
        let var = cov[(j, j)];
        if !est.is_finite() || !var.is_finite() || var < 0.0 {
            return FitOutcome::Failure(FitFailure::NonFinite);
        }
        let se = var.sqrt();
        if se <= 0.0 {
            return FitOutcome::Failure(FitFailure::NonFinite);
        }
        let stat = est / se;
        let p_value = match statistic {
            Statistic::T => t_p_value(stat, df_resid),
            Statistic::Z => normal_p_value(stat),
        };
        if !stat.is_finite() || !p_value.is_finite() {
            return FitOutcome::Failure(FitFailure::NonFinite);
        }
        estimates.push(est);
        std_errors.push(se);
        statistics.push(stat);
        p_values.push(p_value);
    }

    FitOutcome::Fitted(FittedModel {
        terms: design.names.clone(),
        estimates,
        std_errors,
        statistics,
        p_values,
        df_resid,
    })
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::{build_estimator, FitFailure, FitOptions, FitOutcome};
    use crate::design::{assemble_design, simulate_response, Design};
    use crate::generate::generate_predictors;
    use crate::spec::testutil::two_predictor_spec;
    use crate::spec::ResponseFamily;

    fn toy_design(rows: &[[f64; 2]]) -> Design {
        let n = rows.len();
        let mut matrix = DMatrix::zeros(n, 2);
        for (i, row) in rows.iter().enumerate() {
            matrix[(i, 0)] = row[0];
            matrix[(i, 1)] = row[1];
        }
        Design {
            matrix,
            names: vec!["intercept".to_string(), "x".to_string()],
        }
    }

    #[test]
    fn ols_recovers_known_coefficients() {
        let design = toy_design(&[
            [1.0, 0.0],
            [1.0, 1.0],
            [1.0, 2.0],
            [1.0, 3.0],
            [1.0, 4.0],
        ]);
        // y = 2 + 3x with a hair of noise so the residual variance is nonzero.
        let y = [2.01, 4.99, 8.02, 10.98, 14.01];

        let ols = build_estimator("ols").unwrap();
        match ols.fit(&design, &y, &FitOptions::default()) {
            FitOutcome::Fitted(model) => {
                assert!((model.estimates[0] - 2.0).abs() < 0.05);
                assert!((model.estimates[1] - 3.0).abs() < 0.02);
                assert_eq!(model.terms, vec!["intercept", "x"]);
                assert_eq!(model.df_resid, 3.0);
                assert!(model.p_values[1] < 0.001);
            }
            FitOutcome::Failure(f) => panic!("unexpected failure: {f:?}"),
        }
    }

    #[test]
    fn collinear_design_is_a_singular_failure() {
        let design = toy_design(&[[1.0, 2.0], [1.0, 2.0], [1.0, 2.0], [1.0, 2.0]]);
        let y = [1.0, 2.0, 3.0, 4.0];
        let ols = build_estimator("ols").unwrap();
        assert!(matches!(
            ols.fit(&design, &y, &FitOptions::default()),
            FitOutcome::Failure(FitFailure::Singular)
        ));
    }

    #[test]
    fn underdetermined_fit_fails_instead_of_guessing() {
        let design = toy_design(&[[1.0, 2.0]]);
        let ols = build_estimator("ols").unwrap();
        assert!(matches!(
            ols.fit(&design, &[1.0], &FitOptions::default()),
            FitOutcome::Failure(FitFailure::Singular)
        ));
    }

    #[test]
    fn irls_recovers_logistic_coefficients() {
        let mut spec = two_predictor_spec();
        spec.sample_size = 2000;
        spec.family = ResponseFamily::Binary;
        spec.weights = vec![0.5, 1.0, 0.0];

        let formula = spec.parsed_formula().unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let data = generate_predictors(&spec, &formula, &mut rng).unwrap();
        let design = assemble_design(&spec, &formula, &data).unwrap();
        let y = simulate_response(&spec, &formula, &design, &data, &mut rng).unwrap();

        let irls = build_estimator("irls").unwrap();
        let opts = FitOptions {
            family: ResponseFamily::Binary,
            ..FitOptions::default()
        };
        match irls.fit(&design, &y, &opts) {
            FitOutcome::Fitted(model) => {
                assert!((model.estimates[0] - 0.5).abs() < 0.2);
                assert!((model.estimates[1] - 1.0).abs() < 0.2);
            }
            FitOutcome::Failure(f) => panic!("unexpected failure: {f:?}"),
        }
    }

    #[test]
    fn irls_recovers_poisson_coefficients() {
        let mut spec = two_predictor_spec();
        spec.sample_size = 2000;
        spec.family = ResponseFamily::Count;
        spec.weights = vec![1.0, 0.4, 0.0];

        let formula = spec.parsed_formula().unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(22);
        let data = generate_predictors(&spec, &formula, &mut rng).unwrap();
        let design = assemble_design(&spec, &formula, &data).unwrap();
        let y = simulate_response(&spec, &formula, &design, &data, &mut rng).unwrap();

        let irls = build_estimator("irls").unwrap();
        let opts = FitOptions {
            family: ResponseFamily::Count,
            ..FitOptions::default()
        };
        match irls.fit(&design, &y, &opts) {
            FitOutcome::Fitted(model) => {
                assert!((model.estimates[0] - 1.0).abs() < 0.1);
                assert!((model.estimates[1] - 0.4).abs() < 0.1);
            }
            FitOutcome::Failure(f) => panic!("unexpected failure: {f:?}"),
        }
    }

    #[test]
    fn unknown_estimator_id_builds_nothing() {
        assert!(build_estimator("stan").is_none());
    }
}
