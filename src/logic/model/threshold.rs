//! Contamination Threshold
//!
//! Turns a continuous anomaly score into an inlier/outlier cut.
//! The cut is the (1 - contamination) quantile of the scores seen on the
//! training set, so roughly `contamination` of the training data would sit
//! above it.

use serde::{Deserialize, Serialize};

/// Score cut derived from training scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContaminationCut {
    contamination: f64,
    cut: f64,
    mean_score: f64,
    sample_count: usize,
}

impl ContaminationCut {
    /// Build from training scores (higher = more anomalous)
    pub fn from_scores(scores: &[f64], contamination: f64) -> Self {
        let mut sorted: Vec<f64> = scores.iter().copied().filter(|s| s.is_finite()).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len();
        let mean_score = if n > 0 {
            sorted.iter().sum::<f64>() / n as f64
        } else {
            0.0
        };

        Self {
            contamination,
            cut: quantile(&sorted, 1.0 - contamination),
            mean_score,
            sample_count: n,
        }
    }

    /// Get current cut
    pub fn get(&self) -> f64 {
        self.cut
    }

    /// Check if score exceeds the cut
    pub fn is_outlier(&self, score: f64) -> bool {
        score > self.cut
    }

    pub fn stats(&self) -> CutStats {
        CutStats {
            cut: self.cut,
            contamination: self.contamination,
            mean_score: self.mean_score,
            sample_count: self.sample_count,
        }
    }
}

/// Threshold statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CutStats {
    pub cut: f64,
    pub contamination: f64,
    pub mean_score: f64,
    pub sample_count: usize,
}

/// Linear-interpolated quantile of sorted data (q in [0, 1])
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::INFINITY,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}
