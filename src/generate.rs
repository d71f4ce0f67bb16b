//! Variable generation and correlation induction.
//!
//! One predictor column per formula term, drawn in declared term order so a
//! seeded stream always produces the same table. Correlated continuous
//! predictors are induced through a Gaussian copula: standard-normal scores
//! are mixed by the Cholesky factor of the target matrix, then each column
//! is pushed through its marginal transform.

use std::collections::BTreeMap;

use nalgebra::DMatrix;
use rand::distributions::WeightedIndex;
use rand::Rng;
use rand_distr::{Distribution, Normal, StandardNormal};

use crate::dist::normal_cdf;
use crate::formula::Formula;
use crate::spec::{ContinuousDist, SimulationSpec, VariableDef};
use crate::RegsimError;

/// One simulated table: predictors in formula-term order, plus the grouping
/// column and group-level intercept draws when a random-effect structure is
/// declared. The response is simulated separately by the design layer.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub n: usize,
    pub columns: Vec<(String, Vec<f64>)>,
    pub group: Option<GroupStructure>,
}

#[derive(Debug, Clone)]
pub struct GroupStructure {
    pub name: String,
    pub assignment: Vec<usize>,
    pub intercepts: Vec<f64>,
}

impl Dataset {
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }
}

/// Generate all predictor columns for one replication.
pub fn generate_predictors(
    spec: &SimulationSpec,
    formula: &Formula,
    rng: &mut impl Rng,
) -> Result<Dataset, RegsimError> {
    let n = spec.sample_size;

    let group = match &spec.random_effect {
        Some(def) => {
            let assignment = balanced_assignment(n, def.n_groups);
            let normal = normal_dist(0.0, def.sd)?;
            let intercepts: Vec<f64> =
                (0..def.n_groups).map(|_| normal.sample(rng)).collect();
            Some(GroupStructure {
                name: def.group.clone(),
                assignment,
                intercepts,
            })
        }
        None => None,
    };

    let correlated = match &spec.correlation {
        Some(corr) => {
            let targets = spec.continuous_terms(formula);
            let dists: Vec<&ContinuousDist> = targets
                .iter()
                .map(|t| match spec.variables.get(t.as_str()) {
                    Some(VariableDef::Continuous { dist }) => dist,
                    _ => unreachable!("continuous_terms only returns continuous variables"),
                })
                .collect();
            let columns = correlated_columns(corr, &dists, n, rng)?;
            targets.into_iter().zip(columns).collect()
        }
        None => BTreeMap::new(),
    };

    let mut columns = Vec::with_capacity(formula.terms.len());
    for term in &formula.terms {
        let def = spec.variables.get(term).ok_or_else(|| {
            RegsimError::InvalidConfig(format!("formula term '{term}' has no variable definition"))
        })?;
        let values = if let Some(pre) = correlated.get(term) {
            pre.clone()
        } else {
            generate_column(def, n, group.as_ref(), rng)?
        };
        columns.push((term.clone(), values));
    }

    Ok(Dataset { n, columns, group })
}

/// Generate one independent column of `n` values for a variable definition.
pub fn generate_column(
    def: &VariableDef,
    n: usize,
    group: Option<&GroupStructure>,
    rng: &mut impl Rng,
) -> Result<Vec<f64>, RegsimError> {
    match def {
        VariableDef::Continuous { dist } => {
            (0..n).map(|_| sample_continuous(dist, rng)).collect()
        }
        VariableDef::Ordinal { min, max, weights } => {
            if weights.is_empty() {
                Ok((0..n).map(|_| rng.gen_range(*min..=*max) as f64).collect())
            } else {
                let index = weighted_index(weights)?;
                Ok((0..n)
                    .map(|_| (*min + index.sample(rng) as i64) as f64)
                    .collect())
            }
        }
        VariableDef::Factor { levels, probs } => {
            if probs.is_empty() {
                Ok((0..n).map(|_| rng.gen_range(0..levels.len()) as f64).collect())
            } else {
                let index = weighted_index(probs)?;
                Ok((0..n).map(|_| index.sample(rng) as f64).collect())
            }
        }
        VariableDef::RandomEffect { sd } => {
            let group = group.ok_or_else(|| {
                RegsimError::InvalidConfig(
                    "random-effect variable requires a grouping structure".to_string(),
                )
            })?;
            let normal = normal_dist(0.0, *sd)?;
            let draws: Vec<f64> = (0..group.intercepts.len())
                .map(|_| normal.sample(rng))
                .collect();
            Ok(group.assignment.iter().map(|&g| draws[g]).collect())
        }
    }
}

fn sample_continuous(dist: &ContinuousDist, rng: &mut impl Rng) -> Result<f64, RegsimError> {
    let z: f64 = StandardNormal.sample(rng);
    Ok(match dist {
        ContinuousDist::Normal { mean, sd } => mean + sd * z,
        ContinuousDist::LogNormal { mean, sd } => (mean + sd * z).exp(),
        ContinuousDist::Uniform { low, high } => rng.gen_range(*low..*high),
        ContinuousDist::Exponential { rate } => {
            let u: f64 = rng.gen_range(0.0..1.0);
            -(1.0 - u).ln() / rate
        }
    })
}

/// Push a standard-normal score through a marginal's inverse transform.
fn marginal_from_score(dist: &ContinuousDist, z: f64) -> f64 {
    match dist {
        ContinuousDist::Normal { mean, sd } => mean + sd * z,
        ContinuousDist::LogNormal { mean, sd } => (mean + sd * z).exp(),
        ContinuousDist::Uniform { low, high } => low + (high - low) * normal_cdf(z),
        ContinuousDist::Exponential { rate } => {
            let u = normal_cdf(z).clamp(1e-12, 1.0 - 1e-12);
            -(1.0 - u).ln() / rate
        }
    }
}

fn correlated_columns(
    corr: &[Vec<f64>],
    dists: &[&ContinuousDist],
    n: usize,
    rng: &mut impl Rng,
) -> Result<Vec<Vec<f64>>, RegsimError> {
    let k = corr.len();
    let target = DMatrix::from_fn(k, k, |i, j| corr[i][j]);
    let chol = target.cholesky().ok_or_else(|| {
        RegsimError::InvalidCorrelationMatrix("matrix is not positive definite".to_string())
    })?;
    let l = chol.l();

    let mut columns = vec![Vec::with_capacity(n); k];
    let mut z = vec![0.0f64; k];
    for _ in 0..n {
        for zj in z.iter_mut() {
            *zj = StandardNormal.sample(rng);
        }
        for (j, col) in columns.iter_mut().enumerate() {
            let mut score = 0.0;
            for (m, zm) in z.iter().enumerate().take(j + 1) {
                score += l[(j, m)] * zm;
            }
            col.push(marginal_from_score(dists[j], score));
        }
    }
    Ok(columns)
}

// Contiguous blocks whose sizes differ by at most one; every group gets at
// least one member whenever n_groups <= n.
fn balanced_assignment(n: usize, n_groups: usize) -> Vec<usize> {
    (0..n).map(|i| i * n_groups / n).collect()
}

fn normal_dist(mean: f64, sd: f64) -> Result<Normal<f64>, RegsimError> {
    Normal::new(mean, sd)
        .map_err(|e| RegsimError::InvalidConfig(format!("invalid normal parameters: {e}")))
}

fn weighted_index(weights: &[f64]) -> Result<WeightedIndex<f64>, RegsimError> {
    WeightedIndex::new(weights.iter().copied())
        .map_err(|e| RegsimError::InvalidConfig(format!("invalid sampling weights: {e}")))
}

/// Pearson correlation between two equal-length columns.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    cov / (var_a * var_b).sqrt()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::{balanced_assignment, generate_column, generate_predictors, pearson};
    use crate::spec::testutil::two_predictor_spec;
    use crate::spec::{RandomEffectDef, VariableDef};

    #[test]
    fn generates_exactly_sample_size_rows() {
        let spec = two_predictor_spec();
        let formula = spec.parsed_formula().unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let data = generate_predictors(&spec, &formula, &mut rng).unwrap();
        assert_eq!(data.n, 100);
        for (_, col) in &data.columns {
            assert_eq!(col.len(), 100);
        }
    }

    #[test]
    fn ordinal_values_stay_in_declared_range() {
        let def = VariableDef::Ordinal {
            min: 1,
            max: 5,
            weights: Vec::new(),
        };
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let col = generate_column(&def, 500, None, &mut rng).unwrap();
        assert!(col.iter().all(|v| (1.0..=5.0).contains(v)));
        assert!(col.iter().all(|v| v.fract() == 0.0));
    }

    #[test]
    fn factor_draws_level_indices() {
        let def = VariableDef::Factor {
            levels: vec!["a".into(), "b".into(), "c".into()],
            probs: vec![0.2, 0.3, 0.5],
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let col = generate_column(&def, 400, None, &mut rng).unwrap();
        assert!(col.iter().all(|v| *v == 0.0 || *v == 1.0 || *v == 2.0));
    }

    #[test]
    fn random_effect_broadcasts_one_draw_per_group() {
        let mut spec = two_predictor_spec();
        spec.random_effect = Some(RandomEffectDef {
            group: "site".to_string(),
            n_groups: 5,
            sd: 1.0,
        });
        spec.variables
            .insert("u".to_string(), VariableDef::RandomEffect { sd: 0.8 });
        spec.formula = "y ~ x1 + x2 + u".to_string();
        spec.weights = vec![0.0, 0.5, 0.0, 0.2];
        spec.validate().unwrap();

        let formula = spec.parsed_formula().unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let data = generate_predictors(&spec, &formula, &mut rng).unwrap();

        let group = data.group.as_ref().unwrap();
        let u = data.column("u").unwrap();
        for (i, &g) in group.assignment.iter().enumerate() {
            let first_in_group = group.assignment.iter().position(|&h| h == g).unwrap();
            assert_eq!(u[i], u[first_in_group]);
        }
        let mut distinct: Vec<f64> = u.to_vec();
        distinct.sort_by(f64::total_cmp);
        distinct.dedup();
        assert_eq!(distinct.len(), 5);
    }

    #[test]
    fn induced_correlation_is_close_at_large_n() {
        let mut spec = two_predictor_spec();
        spec.sample_size = 1000;
        spec.correlation = Some(vec![vec![1.0, 0.8], vec![0.8, 1.0]]);
        spec.validate().unwrap();

        let formula = spec.parsed_formula().unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let data = generate_predictors(&spec, &formula, &mut rng).unwrap();
        let r = pearson(data.column("x1").unwrap(), data.column("x2").unwrap());
        assert!((r - 0.8).abs() < 0.05, "sample correlation {r} too far from 0.8");
    }

    #[test]
    fn balanced_assignment_covers_all_groups() {
        let groups = balanced_assignment(10, 3);
        assert_eq!(groups.len(), 10);
        assert_eq!(groups.iter().max(), Some(&2));
        assert_eq!(groups[0], 0);
    }

    #[test]
    fn balanced_assignment_populates_every_declared_group() {
        // More groups than evenly divide n must not starve the last ones.
        assert_eq!(balanced_assignment(5, 4), vec![0, 0, 1, 2, 3]);

        for (n, g) in [(10, 3), (7, 7), (100, 9)] {
            let assignment = balanced_assignment(n, g);
            let mut counts = vec![0usize; g];
            for &group in &assignment {
                counts[group] += 1;
            }
            assert!(counts.iter().all(|&c| c > 0), "empty group for n={n} g={g}");
            let spread = counts.iter().max().unwrap() - counts.iter().min().unwrap();
            assert!(spread <= 1, "unbalanced groups for n={n} g={g}: {counts:?}");
        }
    }
}
