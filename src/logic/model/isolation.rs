//! Isolation Forest
//!
//! Ensemble of random binary partition trees grown on subsamples of normal
//! training data. Points that are easy to separate from the bulk end up in
//! shallow leaves; the average depth is normalised into a score in (0, 1]
//! where higher means more anomalous.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::threshold::ContaminationCut;
use super::OutlierModel;
use crate::constants::DEFAULT_SEED;
use crate::logic::error::{DetectError, DetectResult};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of trees
    pub n_trees: usize,
    /// Subsample size per tree (capped by the training set size)
    pub max_samples: usize,
    /// Expected anomaly fraction
    pub contamination: f64,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: 256,
            contamination: 0.1,
            seed: DEFAULT_SEED,
        }
    }
}

impl ForestConfig {
    pub fn with_contamination(contamination: f64, seed: u64) -> Self {
        Self {
            contamination,
            seed,
            ..Default::default()
        }
    }
}

// ============================================================================
// TREE
// ============================================================================

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        value: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    root: Node,
}

impl IsolationTree {
    fn grow(data: &[Vec<f64>], rows: Vec<usize>, depth_limit: usize, rng: &mut StdRng) -> Self {
        Self {
            root: grow_node(data, rows, 0, depth_limit, rng),
        }
    }

    fn path_length(&self, x: &[f64]) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;

        loop {
            match node {
                Node::Leaf { size } => return depth as f64 + average_path_length(*size),
                Node::Split {
                    feature,
                    value,
                    left,
                    right,
                } => {
                    node = if x[*feature] < *value { left } else { right };
                    depth += 1;
                }
            }
        }
    }
}

fn grow_node(
    data: &[Vec<f64>],
    rows: Vec<usize>,
    depth: usize,
    depth_limit: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= depth_limit || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    // only features that still vary inside this node can split it
    let dims = data[rows[0]].len();
    let spread: Vec<(usize, f64, f64)> = (0..dims)
        .filter_map(|f| {
            let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                (lo.min(data[r][f]), hi.max(data[r][f]))
            });
            (lo < hi).then_some((f, lo, hi))
        })
        .collect();

    if spread.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, lo, hi) = spread[rng.gen_range(0..spread.len())];
    let value = rng.gen_range(lo..hi);

    let (left, right): (Vec<usize>, Vec<usize>) =
        rows.into_iter().partition(|&r| data[r][feature] < value);

    Node::Split {
        feature,
        value,
        left: Box::new(grow_node(data, left, depth + 1, depth_limit, rng)),
        right: Box::new(grow_node(data, right, depth + 1, depth_limit, rng)),
    }
}

/// Average path length of an unsuccessful BST search over `n` points
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

// ============================================================================
// FOREST
// ============================================================================

pub struct IsolationForest {
    config: ForestConfig,
    trees: Vec<IsolationTree>,
    sample_size: usize,
    dims: usize,
    cut: Option<ContaminationCut>,
}

impl IsolationForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            sample_size: 0,
            dims: 0,
            cut: None,
        }
    }

    fn check_training_set(samples: &[Vec<f64>]) -> DetectResult<usize> {
        let dims = samples.first().map(Vec::len).unwrap_or(0);
        if samples.len() < 2 || dims == 0 {
            return Err(DetectError::training(
                "isolation_forest",
                format!("need at least 2 non-empty samples, got {}", samples.len()),
            ));
        }
        if samples.iter().any(|s| s.len() != dims || s.iter().any(|v| !v.is_finite())) {
            return Err(DetectError::training(
                "isolation_forest",
                "training samples are ragged or non-finite",
            ));
        }
        Ok(dims)
    }
}

impl OutlierModel for IsolationForest {
    fn fit(&mut self, samples: &[Vec<f64>]) -> DetectResult<()> {
        let dims = Self::check_training_set(samples)?;

        let sample_size = self.config.max_samples.clamp(2, samples.len());
        let depth_limit = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        self.trees = (0..self.config.n_trees.max(1))
            .map(|_| {
                let rows = sample(&mut rng, samples.len(), sample_size).into_vec();
                IsolationTree::grow(samples, rows, depth_limit, &mut rng)
            })
            .collect();
        self.sample_size = sample_size;
        self.dims = dims;

        let scores: Vec<f64> = samples.iter().map(|s| self.score(s)).collect();
        let cut = ContaminationCut::from_scores(&scores, self.config.contamination);
        log::debug!(
            "Isolation forest: {} trees, psi={}, cut={:.4}",
            self.trees.len(),
            sample_size,
            cut.get()
        );
        self.cut = Some(cut);

        Ok(())
    }

    fn score(&self, sample: &[f64]) -> f64 {
        if self.trees.is_empty() || sample.len() != self.dims {
            return 0.0;
        }

        let mean_depth = self.trees.iter().map(|t| t.path_length(sample)).sum::<f64>()
            / self.trees.len() as f64;
        2f64.powf(-mean_depth / average_path_length(self.sample_size))
    }

    fn is_outlier(&self, sample: &[f64]) -> bool {
        match &self.cut {
            Some(cut) => cut.is_outlier(self.score(sample)),
            None => false,
        }
    }

    fn name(&self) -> &str {
        "Isolation Forest"
    }

    fn is_trained(&self) -> bool {
        self.cut.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic grid cluster around (0.02, 0.02)
    fn quiet_room() -> Vec<Vec<f64>> {
        let mut rows = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                rows.push(vec![0.015 + i as f64 * 0.001, 0.015 + j as f64 * 0.001]);
            }
        }
        rows
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // c(256) is about 10.24
        assert!((average_path_length(256) - 10.24).abs() < 0.01);
    }

    #[test]
    fn test_far_point_is_outlier() {
        let mut forest = IsolationForest::new(ForestConfig::default());
        forest.fit(&quiet_room()).unwrap();

        assert!(forest.is_trained());
        assert!(forest.is_outlier(&[0.05, 0.05]));
        assert!(!forest.is_outlier(&[0.0195, 0.0195]));
        assert!(forest.score(&[0.05, 0.05]) > forest.score(&[0.0195, 0.0195]));
    }

    #[test]
    fn test_same_seed_same_scores() {
        let mut a = IsolationForest::new(ForestConfig::default());
        let mut b = IsolationForest::new(ForestConfig::default());
        a.fit(&quiet_room()).unwrap();
        b.fit(&quiet_room()).unwrap();

        assert_eq!(a.score(&[0.03, 0.01]), b.score(&[0.03, 0.01]));
    }

    #[test]
    fn test_rejects_ragged_training_set() {
        let mut forest = IsolationForest::new(ForestConfig::default());
        let result = forest.fit(&[vec![1.0, 2.0], vec![1.0], vec![3.0, 4.0]]);
        assert!(matches!(result, Err(DetectError::Training { .. })));
        assert!(!forest.is_trained());
    }

    #[test]
    fn test_identical_samples_do_not_panic() {
        let mut forest = IsolationForest::new(ForestConfig::default());
        forest.fit(&vec![vec![1.0]; 5]).unwrap();
        assert!(!forest.is_outlier(&[1.0]));
    }

    #[test]
    fn test_untrained_never_flags() {
        let forest = IsolationForest::new(ForestConfig::default());
        assert!(!forest.is_outlier(&[100.0]));
        assert_eq!(forest.score(&[100.0]), 0.0);
    }
}
