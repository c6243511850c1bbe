//! Outlier Classifier
//!
//! Per-sensor wrapper around an `OutlierModel`: owns the trained/untrained
//! state, enforces the minimum training size and applies the sensor's
//! confirmation policy on top of the raw verdict.

use serde::Serialize;

use super::isolation::{ForestConfig, IsolationForest};
use super::training::{prepare_training_set, LabeledSample};
use super::OutlierModel;
use crate::logic::error::{DetectError, DetectResult};
use crate::logic::features::FeatureVector;
use crate::logic::profile::{ConfirmPolicy, SensorProfile, SensorType};

/// Fitting needs at least this many usable samples
pub const MIN_TRAINING_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Outlier,
    Inlier,
}

/// Raw classifier output for one sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub verdict: Verdict,
    pub score: f64,
}

impl Classification {
    pub fn is_outlier(&self) -> bool {
        self.verdict == Verdict::Outlier
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ClassifierState {
    Untrained { reason: String },
    Trained { samples: usize },
}

pub struct OutlierClassifier {
    sensor: SensorType,
    model: Box<dyn OutlierModel>,
    state: ClassifierState,
}

impl OutlierClassifier {
    pub fn new(sensor: SensorType, model: Box<dyn OutlierModel>) -> Self {
        Self {
            sensor,
            model,
            state: ClassifierState::Untrained {
                reason: "not fitted".into(),
            },
        }
    }

    /// Isolation forest configured from the profile's contamination rate
    pub fn isolation_forest(profile: &SensorProfile, seed: u64) -> Self {
        let config = ForestConfig::with_contamination(profile.contamination, seed);
        Self::new(profile.sensor.clone(), Box::new(IsolationForest::new(config)))
    }

    pub fn sensor(&self) -> &SensorType {
        &self.sensor
    }

    pub fn state(&self) -> &ClassifierState {
        &self.state
    }

    pub fn is_trained(&self) -> bool {
        matches!(self.state, ClassifierState::Trained { .. })
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Fit on already filtered samples
    ///
    /// On failure the classifier is left untrained and the error says why.
    pub fn fit(&mut self, samples: &[Vec<f64>]) -> DetectResult<usize> {
        if samples.len() < MIN_TRAINING_SAMPLES {
            let reason = format!(
                "{} usable samples, need at least {}",
                samples.len(),
                MIN_TRAINING_SAMPLES
            );
            self.state = ClassifierState::Untrained {
                reason: reason.clone(),
            };
            return Err(DetectError::training(self.sensor.as_str(), reason));
        }

        match self.model.fit(samples) {
            Ok(()) => {
                self.state = ClassifierState::Trained {
                    samples: samples.len(),
                };
                Ok(samples.len())
            }
            Err(e) => {
                self.state = ClassifierState::Untrained {
                    reason: e.to_string(),
                };
                Err(DetectError::training(self.sensor.as_str(), e.to_string()))
            }
        }
    }

    /// Filter labeled rows with the profile, then fit
    pub fn fit_labeled(&mut self, profile: &SensorProfile, samples: &[LabeledSample]) -> DetectResult<usize> {
        let training_set = prepare_training_set(profile, samples);
        self.fit(&training_set)
    }

    /// `None` while untrained
    pub fn classify(&self, fv: &FeatureVector) -> Option<Classification> {
        if !self.is_trained() {
            return None;
        }

        let sample = fv.as_slice();
        let verdict = if self.model.is_outlier(sample) {
            Verdict::Outlier
        } else {
            Verdict::Inlier
        };

        Some(Classification {
            verdict,
            score: self.model.score(sample),
        })
    }
}

/// Apply the sensor's confirmation policy to a raw classification
pub fn confirm(profile: &SensorProfile, fv: &FeatureVector, classification: &Classification) -> bool {
    if !classification.is_outlier() {
        return false;
    }

    match profile.confirm {
        ConfirmPolicy::Unconditional => true,
        ConfirmPolicy::AllOutsideBand => {
            profile.features.len() == fv.len()
                && profile
                    .features
                    .iter()
                    .zip(fv.as_slice())
                    .all(|(spec, v)| spec.normal_band.is_outside(*v))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    /// Flags anything whose first feature exceeds `limit`
    struct LimitModel {
        limit: f64,
        fitted: bool,
    }

    impl OutlierModel for LimitModel {
        fn fit(&mut self, _samples: &[Vec<f64>]) -> DetectResult<()> {
            self.fitted = true;
            Ok(())
        }
        fn score(&self, sample: &[f64]) -> f64 {
            sample[0]
        }
        fn is_outlier(&self, sample: &[f64]) -> bool {
            sample[0] > self.limit
        }
        fn name(&self) -> &str {
            "limit"
        }
        fn is_trained(&self) -> bool {
            self.fitted
        }
    }

    fn sound_vector(rms: f64, zcr: f64) -> FeatureVector {
        let profile = SensorProfile::sound();
        FeatureVector::from_values(&profile.sensor, &profile.feature_names(), vec![rms, zcr], NaiveDateTime::default())
    }

    #[test]
    fn test_two_samples_leave_classifier_untrained() {
        let profile = SensorProfile::sound();
        let mut clf = OutlierClassifier::isolation_forest(&profile, 7);

        let result = clf.fit(&[vec![0.02, 0.02], vec![0.021, 0.02]]);
        assert!(matches!(result, Err(DetectError::Training { .. })));
        assert!(!clf.is_trained());
        assert!(clf.classify(&sound_vector(0.05, 0.03)).is_none());
    }

    #[test]
    fn test_fit_labeled_counts_filtered_rows() {
        let profile = SensorProfile::sound();
        let mut clf = OutlierClassifier::isolation_forest(&profile, 7);
        let samples = vec![
            LabeledSample::normal(vec![0.02, 0.02]),
            LabeledSample::normal(vec![0.021, 0.015]),
            LabeledSample::normal(vec![0.018, 0.03]),
            LabeledSample::new("abnormal", vec![0.2, 0.2]),
        ];

        assert_eq!(clf.fit_labeled(&profile, &samples).unwrap(), 3);
        assert_eq!(clf.state(), &ClassifierState::Trained { samples: 3 });
    }

    #[test]
    fn test_sound_confirmation_requires_all_bands() {
        let profile = SensorProfile::sound();
        let outlier = Classification { verdict: Verdict::Outlier, score: 0.8 };

        assert!(confirm(&profile, &sound_vector(0.05, 0.03), &outlier));
        // zcr inside its band
        assert!(!confirm(&profile, &sound_vector(0.05, 0.01), &outlier));
        // both inside
        assert!(!confirm(&profile, &sound_vector(0.02, 0.01), &outlier));
    }

    #[test]
    fn test_light_confirmation_is_unconditional() {
        let profile = SensorProfile::light();
        let fv = FeatureVector::from_values(&profile.sensor, &profile.feature_names(), vec![12.0], NaiveDateTime::default());
        let outlier = Classification { verdict: Verdict::Outlier, score: 0.7 };
        let inlier = Classification { verdict: Verdict::Inlier, score: 0.4 };

        assert!(confirm(&profile, &fv, &outlier));
        assert!(!confirm(&profile, &fv, &inlier));
    }

    #[test]
    fn test_custom_model_through_contract() {
        let model = LimitModel { limit: 0.04, fitted: false };
        let mut clf = OutlierClassifier::new(SensorType::sound(), Box::new(model));
        clf.fit(&[vec![0.01, 0.01], vec![0.02, 0.02], vec![0.03, 0.03]]).unwrap();

        let c = clf.classify(&sound_vector(0.05, 0.03)).unwrap();
        assert_eq!(c.verdict, Verdict::Outlier);
        assert_eq!(clf.model_name(), "limit");
    }
}
