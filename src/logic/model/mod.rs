//! Model Module - outlier classification
//!
//! The classifier is used only through the `OutlierModel` fit/score
//! contract; the isolation forest is the production implementation.

pub mod isolation;
pub mod threshold;
pub mod training;
pub mod classifier;

pub use classifier::{confirm, Classification, ClassifierState, OutlierClassifier, Verdict, MIN_TRAINING_SAMPLES};
pub use isolation::{ForestConfig, IsolationForest};
pub use threshold::ContaminationCut;
pub use training::{prepare_training_set, LabeledSample};

use crate::logic::error::DetectResult;

/// Trainable anomaly scorer
pub trait OutlierModel: Send + Sync {
    /// Train on normal data only
    fn fit(&mut self, samples: &[Vec<f64>]) -> DetectResult<()>;

    /// Score a sample (higher = more anomalous)
    fn score(&self, sample: &[f64]) -> f64;

    /// Inlier/outlier cut applied to `score`
    fn is_outlier(&self, sample: &[f64]) -> bool;

    fn name(&self) -> &str;

    fn is_trained(&self) -> bool;
}
