//! Training set preparation
//!
//! Only samples labeled "normal" are kept, and of those only the ones whose
//! every feature sits inside the profile's training range (removes
//! mislabeled extremes before fitting).

use serde::{Deserialize, Serialize};

use crate::logic::profile::SensorProfile;

pub const NORMAL_LABEL: &str = "normal";

/// One labeled row from a training source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub label: String,
    /// Ordered like the profile's feature names
    pub values: Vec<f64>,
}

impl LabeledSample {
    pub fn new(label: &str, values: Vec<f64>) -> Self {
        Self {
            label: label.to_string(),
            values,
        }
    }

    pub fn normal(values: Vec<f64>) -> Self {
        Self::new(NORMAL_LABEL, values)
    }

    pub fn is_normal(&self) -> bool {
        self.label.trim().eq_ignore_ascii_case(NORMAL_LABEL)
    }
}

/// Filter labeled samples down to the rows the classifier is fitted on
pub fn prepare_training_set(profile: &SensorProfile, samples: &[LabeledSample]) -> Vec<Vec<f64>> {
    let kept: Vec<Vec<f64>> = samples
        .iter()
        .filter(|s| s.is_normal() && profile.in_training_range(&s.values))
        .map(|s| s.values.clone())
        .collect();

    log::info!(
        "[{}] training samples used: {} of {}",
        profile.sensor,
        kept.len(),
        samples.len()
    );
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_only_normal_in_range() {
        let profile = SensorProfile::sound();
        let samples = vec![
            LabeledSample::normal(vec![0.02, 0.02]),
            LabeledSample::normal(vec![0.05, 0.02]),   // rms above range
            LabeledSample::new("abnormal", vec![0.02, 0.02]),
            LabeledSample::new(" Normal ", vec![0.01, 0.03]),
        ];

        let kept = prepare_training_set(&profile, &samples);
        assert_eq!(kept, vec![vec![0.02, 0.02], vec![0.01, 0.03]]);
    }

    #[test]
    fn test_wrong_width_is_dropped() {
        let profile = SensorProfile::light();
        let samples = vec![LabeledSample::normal(vec![10.0, 1.0])];
        assert!(prepare_training_set(&profile, &samples).is_empty());
    }
}
