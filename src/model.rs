//! Default supervised-regression collaborator: least-squares gradient
//! boosting over depth-limited regression trees.
//!
//! The evaluator and sweep layers only depend on the `Regressor` trait, so
//! any fit/predict model can stand in; this module supplies the one the
//! analysis ships with.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid hyperparameter: {0}")]
    InvalidConfig(String),

    #[error("feature matrix has {rows} rows but target has {target_len}")]
    ShapeMismatch { rows: usize, target_len: usize },

    #[error("feature matrix has no columns")]
    NoFeatures,

    #[error("prediction features have {got} columns, model was trained with {expected}")]
    FeatureMismatch { got: usize, expected: usize },

    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("model must be fitted before predicting")]
    NotFitted,
}

/// Capability set required of a supervised regression collaborator.
pub trait Regressor {
    fn fit(
        &mut self,
        features: ArrayView2<'_, f64>,
        target: ArrayView1<'_, f64>,
    ) -> Result<(), ModelError>;

    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError>;

    /// Per-feature importance weights, if the model computes them.
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }
}

/// Hyperparameters for `GradientBoostedTrees`.
///
/// Defaults reproduce the production configuration this analysis has
/// always run with (least-squares loss; a long, slow boosting schedule).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostConfig {
    /// Number of boosting rounds.
    pub n_estimators: usize,
    /// Shrinkage applied to each tree's contribution.
    pub learning_rate: f64,
    /// Maximum depth of each regression tree.
    pub max_depth: usize,
    /// Minimum number of rows required to consider splitting a node.
    pub min_samples_split: usize,
    /// Minimum number of rows in each leaf.
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn without replacement per round, in (0, 1].
    pub subsample: f64,
    /// Fraction of features offered to each tree, in (0, 1].
    pub max_features: f64,
    /// Seed for row and feature subsampling.
    pub seed: u64,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 3000,
            learning_rate: 0.05,
            max_depth: 4,
            min_samples_split: 2,
            min_samples_leaf: 9,
            subsample: 1.0,
            max_features: 0.3,
            seed: 0,
        }
    }
}

impl BoostConfig {
    fn validate(&self) -> Result<(), ModelError> {
        if self.n_estimators == 0 {
            return Err(ModelError::InvalidConfig("n_estimators must be > 0".to_string()));
        }
        if !(self.learning_rate > 0.0) || !self.learning_rate.is_finite() {
            return Err(ModelError::InvalidConfig(format!(
                "learning_rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        if self.max_depth == 0 {
            return Err(ModelError::InvalidConfig("max_depth must be >= 1".to_string()));
        }
        if self.min_samples_leaf == 0 {
            return Err(ModelError::InvalidConfig(
                "min_samples_leaf must be >= 1".to_string(),
            ));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(ModelError::InvalidConfig(format!(
                "subsample must be in (0, 1], got {}",
                self.subsample
            )));
        }
        if !(self.max_features > 0.0 && self.max_features <= 1.0) {
            return Err(ModelError::InvalidConfig(format!(
                "max_features must be in (0, 1], got {}",
                self.max_features
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

fn mean_at(y: &[f64], rows: &[usize]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    rows.iter().map(|&i| y[i]).sum::<f64>() / rows.len() as f64
}

/// Best threshold on one feature by incremental sum-of-squares scan.
/// Returns (gain, threshold) or None when no admissible split exists.
fn best_split_on_feature(
    x: ArrayView2<'_, f64>,
    y: &[f64],
    rows: &[usize],
    feature: usize,
    min_samples_leaf: usize,
) -> Option<(f64, f64)> {
    let n = rows.len();
    let mut pairs: Vec<(f64, f64)> = rows.iter().map(|&i| (x[[i, feature]], y[i])).collect();
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let total_sum: f64 = pairs.iter().map(|&(_, t)| t).sum();
    let total_sq: f64 = pairs.iter().map(|&(_, t)| t * t).sum();
    let parent_sse = total_sq - total_sum * total_sum / n as f64;

    let mut left_sum = 0.0;
    let mut left_sq = 0.0;
    let mut best: Option<(f64, f64)> = None;

    for i in 0..n - 1 {
        left_sum += pairs[i].1;
        left_sq += pairs[i].1 * pairs[i].1;
        // No admissible threshold between equal feature values.
        if pairs[i].0 == pairs[i + 1].0 {
            continue;
        }
        let left_n = i + 1;
        let right_n = n - left_n;
        if left_n < min_samples_leaf || right_n < min_samples_leaf {
            continue;
        }
        let left_sse = left_sq - left_sum * left_sum / left_n as f64;
        let right_sum = total_sum - left_sum;
        let right_sq = total_sq - left_sq;
        let right_sse = right_sq - right_sum * right_sum / right_n as f64;
        let gain = parent_sse - left_sse - right_sse;
        if gain > best.map_or(0.0, |(g, _)| g) {
            best = Some((gain, (pairs[i].0 + pairs[i + 1].0) / 2.0));
        }
    }
    best
}

fn grow(
    x: ArrayView2<'_, f64>,
    y: &[f64],
    rows: &[usize],
    features: &[usize],
    cfg: &BoostConfig,
    depth: usize,
    nodes: &mut Vec<Node>,
    importance: &mut [f64],
) -> usize {
    let leaf_value = mean_at(y, rows);
    let make_leaf = |nodes: &mut Vec<Node>| {
        let idx = nodes.len();
        nodes.push(Node::Leaf { value: leaf_value });
        idx
    };

    if depth >= cfg.max_depth
        || rows.len() < cfg.min_samples_split
        || rows.len() < 2 * cfg.min_samples_leaf
    {
        return make_leaf(nodes);
    }
    let first = y[rows[0]];
    if rows.iter().all(|&i| (y[i] - first).abs() < 1e-15) {
        return make_leaf(nodes);
    }

    // Candidate features scan in parallel; ties break toward the lowest
    // feature index so reduction order cannot change the tree.
    let best = features
        .par_iter()
        .filter_map(|&f| {
            best_split_on_feature(x, y, rows, f, cfg.min_samples_leaf).map(|(gain, thr)| (gain, f, thr))
        })
        .reduce_with(|a, b| {
            if b.0 > a.0 || (b.0 == a.0 && b.1 < a.1) {
                b
            } else {
                a
            }
        });

    let Some((gain, feature, threshold)) = best else {
        return make_leaf(nodes);
    };

    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
        rows.iter().copied().partition(|&i| x[[i, feature]] <= threshold);
    if left_rows.is_empty() || right_rows.is_empty() {
        return make_leaf(nodes);
    }

    importance[feature] += gain;

    let idx = nodes.len();
    // Placeholder; rewritten once both children exist.
    nodes.push(Node::Leaf { value: leaf_value });
    let left = grow(x, y, &left_rows, features, cfg, depth + 1, nodes, importance);
    let right = grow(x, y, &right_rows, features, cfg, depth + 1, nodes, importance);
    nodes[idx] = Node::Split {
        feature,
        threshold,
        left,
        right,
    };
    idx
}

#[derive(Debug, Clone)]
struct Ensemble {
    base: f64,
    trees: Vec<Tree>,
    n_features: usize,
    importances: Array1<f64>,
}

/// Gradient boosted regression trees over a dense feature matrix.
#[derive(Debug, Clone)]
pub struct GradientBoostedTrees {
    config: BoostConfig,
    fitted: Option<Ensemble>,
}

impl GradientBoostedTrees {
    pub fn new(config: BoostConfig) -> Result<Self, ModelError> {
        config.validate()?;
        Ok(Self {
            config,
            fitted: None,
        })
    }

    pub fn config(&self) -> &BoostConfig {
        &self.config
    }
}

impl Regressor for GradientBoostedTrees {
    fn fit(
        &mut self,
        features: ArrayView2<'_, f64>,
        target: ArrayView1<'_, f64>,
    ) -> Result<(), ModelError> {
        self.config.validate()?;
        let n = features.nrows();
        let p = features.ncols();
        if n == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        if p == 0 {
            return Err(ModelError::NoFeatures);
        }
        if target.len() != n {
            return Err(ModelError::ShapeMismatch {
                rows: n,
                target_len: target.len(),
            });
        }

        let cfg = &self.config;
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let n_feat = ((cfg.max_features * p as f64).ceil() as usize).clamp(1, p);
        let n_rows = ((cfg.subsample * n as f64).round() as usize).clamp(1, n);

        let base = target.sum() / n as f64;
        let mut current = vec![base; n];
        let mut importance = vec![0.0; p];
        let mut trees = Vec::with_capacity(cfg.n_estimators);

        for _ in 0..cfg.n_estimators {
            let residuals: Vec<f64> = (0..n).map(|i| target[i] - current[i]).collect();

            let rows: Vec<usize> = if cfg.subsample < 1.0 {
                sample(&mut rng, n, n_rows).into_vec()
            } else {
                (0..n).collect()
            };
            let features_subset: Vec<usize> = if n_feat == p {
                (0..p).collect()
            } else {
                let mut chosen = sample(&mut rng, p, n_feat).into_vec();
                chosen.sort_unstable();
                chosen
            };

            let mut nodes = Vec::new();
            grow(
                features,
                &residuals,
                &rows,
                &features_subset,
                cfg,
                0,
                &mut nodes,
                &mut importance,
            );
            let tree = Tree { nodes };

            for (i, value) in current.iter_mut().enumerate() {
                *value += cfg.learning_rate * tree.predict_row(features.row(i));
            }
            trees.push(tree);
        }

        let total: f64 = importance.iter().sum();
        let importances = if total > 0.0 {
            importance.iter().map(|w| w / total).collect()
        } else {
            Array1::zeros(p)
        };

        self.fitted = Some(Ensemble {
            base,
            trees,
            n_features: p,
            importances,
        });
        Ok(())
    }

    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        let Some(ensemble) = &self.fitted else {
            return Err(ModelError::NotFitted);
        };
        if features.ncols() != ensemble.n_features {
            return Err(ModelError::FeatureMismatch {
                got: features.ncols(),
                expected: ensemble.n_features,
            });
        }
        let mut out = Array1::from_elem(features.nrows(), ensemble.base);
        for tree in &ensemble.trees {
            for (i, value) in out.iter_mut().enumerate() {
                *value += self.config.learning_rate * tree.predict_row(features.row(i));
            }
        }
        Ok(out)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.fitted.as_ref().map(|e| e.importances.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn small_config() -> BoostConfig {
        BoostConfig {
            n_estimators: 150,
            learning_rate: 0.2,
            max_depth: 3,
            min_samples_leaf: 1,
            max_features: 1.0,
            ..BoostConfig::default()
        }
    }

    fn linear_data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 1), |(i, _)| i as f64 / 10.0);
        let y = x.column(0).mapv(|v| 2.0 * v);
        (x, y)
    }

    #[test]
    fn learns_a_linear_trend() {
        let (x, y) = linear_data(100);
        let mut model = GradientBoostedTrees::new(small_config()).expect("valid config");
        model.fit(x.view(), y.view()).expect("fit");
        let probe = Array2::from_shape_vec((1, 1), vec![3.0]).expect("probe shape");
        let pred = model.predict(probe.view()).expect("predict");
        assert!(
            (pred[0] - 6.0).abs() < 0.5,
            "expected ~6.0, got {}",
            pred[0]
        );
    }

    #[test]
    fn fit_is_deterministic_for_a_fixed_seed() {
        let (x, y) = linear_data(80);
        let cfg = BoostConfig {
            subsample: 0.7,
            max_features: 0.5,
            ..small_config()
        };
        let mut a = GradientBoostedTrees::new(cfg.clone()).expect("valid config");
        let mut b = GradientBoostedTrees::new(cfg).expect("valid config");
        a.fit(x.view(), y.view()).expect("fit a");
        b.fit(x.view(), y.view()).expect("fit b");
        let pa = a.predict(x.view()).expect("predict a");
        let pb = b.predict(x.view()).expect("predict b");
        assert_eq!(pa, pb);
    }

    #[test]
    fn predict_before_fit_is_an_error() {
        let model = GradientBoostedTrees::new(small_config()).expect("valid config");
        let x = Array2::<f64>::zeros((2, 1));
        assert!(matches!(model.predict(x.view()), Err(ModelError::NotFitted)));
    }

    #[test]
    fn rejects_invalid_hyperparameters() {
        let cfg = BoostConfig {
            subsample: 0.0,
            ..BoostConfig::default()
        };
        assert!(matches!(
            GradientBoostedTrees::new(cfg),
            Err(ModelError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_shape_mismatch() {
        let mut model = GradientBoostedTrees::new(small_config()).expect("valid config");
        let x = Array2::<f64>::zeros((4, 2));
        let y = Array1::<f64>::zeros(3);
        assert!(matches!(
            model.fit(x.view(), y.view()),
            Err(ModelError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn informative_feature_dominates_importance() {
        let n = 120;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                i as f64 / 10.0
            } else {
                ((i * 2654435761) % 97) as f64 / 97.0
            }
        });
        let y: Array1<f64> = x.column(0).mapv(|v| 3.0 * v - 1.0);
        let mut model = GradientBoostedTrees::new(small_config()).expect("valid config");
        model.fit(x.view(), y.view()).expect("fit");
        let w = model.feature_importances().expect("importances");
        assert!((w.sum() - 1.0).abs() < 1e-9);
        assert!(w[0] > 0.9, "informative feature should dominate, got {w}");
    }

    #[test]
    fn constant_target_predicts_the_constant() {
        let x = Array2::from_shape_fn((30, 1), |(i, _)| i as f64);
        let y = Array1::from_elem(30, 42.0);
        let mut model = GradientBoostedTrees::new(small_config()).expect("valid config");
        model.fit(x.view(), y.view()).expect("fit");
        let pred = model.predict(x.view()).expect("predict");
        for v in pred.iter() {
            assert!((v - 42.0).abs() < 1e-9);
        }
    }
}
