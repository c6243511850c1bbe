use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;

use super::kalman::{EstimatorState, SequentialEstimator};
use crate::logic::error::{DetectError, DetectResult};
use crate::logic::features::FeatureVector;
use crate::logic::profile::{ProfileSet, SensorProfile, SensorType};

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Residual check for one feature in one pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureResidual {
    pub feature: String,
    pub value: f64,
    pub estimate: f64,
    pub residual: f64,
    pub threshold: f64,
    pub abnormal: bool,
}

/// Estimator verdict for one sensor in one pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimatorVerdict {
    pub residuals: Vec<FeatureResidual>,
    /// Per-feature flags combined with the profile's rule
    pub abnormal: bool,
}

impl EstimatorVerdict {
    pub fn abnormal_features(&self) -> Vec<&FeatureResidual> {
        self.residuals.iter().filter(|r| r.abnormal).collect()
    }
}

// ============================================================================
// BANK
// ============================================================================

struct FeatureSlot {
    name: String,
    estimator: Mutex<SequentialEstimator>,
}

/// One estimator per (sensor type, feature), created once at startup
///
/// Each slot has its own lock so passes for different sensors never contend.
pub struct EstimatorBank {
    slots: HashMap<SensorType, Vec<FeatureSlot>>,
}

impl EstimatorBank {
    pub fn from_profiles(profiles: &ProfileSet) -> Self {
        let slots = profiles
            .iter()
            .map(|profile| {
                let features = profile
                    .features
                    .iter()
                    .map(|spec| FeatureSlot {
                        name: spec.name.clone(),
                        estimator: Mutex::new(SequentialEstimator::new(spec.estimator)),
                    })
                    .collect();
                (profile.sensor.clone(), features)
            })
            .collect();

        Self { slots }
    }

    /// Run predict + update for every feature and combine the flags
    pub fn evaluate(&self, profile: &SensorProfile, fv: &FeatureVector) -> DetectResult<EstimatorVerdict> {
        let slots = self.slots.get(&profile.sensor).ok_or_else(|| {
            DetectError::Config(format!("no estimators for sensor '{}'", profile.sensor))
        })?;

        if slots.len() != fv.len() || slots.len() != profile.features.len() {
            return Err(DetectError::Config(format!(
                "[{}] estimator/feature count mismatch ({} vs {})",
                profile.sensor,
                slots.len(),
                fv.len()
            )));
        }

        let mut residuals = Vec::with_capacity(slots.len());
        for ((slot, spec), (name, value)) in slots.iter().zip(&profile.features).zip(fv.iter()) {
            if slot.name != name {
                return Err(DetectError::Config(format!(
                    "[{}] feature order mismatch: '{}' vs '{}'",
                    profile.sensor, slot.name, name
                )));
            }

            let step = slot.estimator.lock().step(value, profile.residual_mode);
            let abnormal = step.residual > spec.threshold;

            log::debug!(
                "[{}] {} = {:.5} estimate={:.5} residual={:.5} (threshold {})",
                profile.sensor, name, value, step.corrected, step.residual, spec.threshold
            );

            residuals.push(FeatureResidual {
                feature: name.to_string(),
                value,
                estimate: step.corrected,
                residual: step.residual,
                threshold: spec.threshold,
                abnormal,
            });
        }

        let flags: Vec<bool> = residuals.iter().map(|r| r.abnormal).collect();
        Ok(EstimatorVerdict {
            abnormal: profile.combine.combine(&flags),
            residuals,
        })
    }

    /// Current state per feature (feature order)
    pub fn snapshot(&self, sensor: &SensorType) -> Vec<(String, EstimatorState)> {
        self.slots
            .get(sensor)
            .map(|slots| {
                slots
                    .iter()
                    .map(|s| (s.name.clone(), s.estimator.lock().state()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.slots.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::profile::CombineRule;
    use chrono::NaiveDateTime;

    fn sound_vector(profile: &SensorProfile, rms: f64, zcr: f64) -> FeatureVector {
        FeatureVector::from_values(
            &profile.sensor,
            &profile.feature_names(),
            vec![rms, zcr],
            NaiveDateTime::default(),
        )
    }

    #[test]
    fn test_one_estimator_per_feature() {
        let bank = EstimatorBank::from_profiles(&ProfileSet::default());
        assert_eq!(bank.len(), 3);
        assert_eq!(bank.snapshot(&SensorType::sound()).len(), 2);
        assert!(bank.snapshot(&SensorType::new("humidity")).is_empty());
    }

    #[test]
    fn test_loud_sound_flags_both_features() {
        let profile = SensorProfile::sound();
        let bank = EstimatorBank::from_profiles(&ProfileSet { profiles: vec![profile.clone()] });

        let verdict = bank.evaluate(&profile, &sound_vector(&profile, 0.05, 0.03)).unwrap();

        assert!(verdict.abnormal);
        assert_eq!(verdict.abnormal_features().len(), 2);
        // residual is measured after the correction: (1 - K) * |z - x0|
        let k = 1.05 / 1.15;
        assert!((verdict.residuals[0].residual - (1.0 - k) * (0.05 - 0.008)).abs() < 1e-12);
    }

    #[test]
    fn test_all_vs_any() {
        let mut profile = SensorProfile::sound();
        // rms far from its start, zcr right on it
        let fv = sound_vector(&profile, 0.05, 0.010);

        let bank = EstimatorBank::from_profiles(&ProfileSet { profiles: vec![profile.clone()] });
        let verdict = bank.evaluate(&profile, &fv).unwrap();
        assert_eq!(verdict.abnormal_features().len(), 1);
        assert!(!verdict.abnormal);

        profile.combine = CombineRule::Any;
        let bank = EstimatorBank::from_profiles(&ProfileSet { profiles: vec![profile.clone()] });
        assert!(bank.evaluate(&profile, &fv).unwrap().abnormal);
    }

    #[test]
    fn test_state_persists_across_passes() {
        let profile = SensorProfile::sound();
        let bank = EstimatorBank::from_profiles(&ProfileSet { profiles: vec![profile.clone()] });

        let before = bank.snapshot(&profile.sensor);
        bank.evaluate(&profile, &sound_vector(&profile, 0.02, 0.02)).unwrap();
        let after = bank.snapshot(&profile.sensor);

        assert_ne!(before[0].1, after[0].1);
        assert!(after[0].1.covariance < before[0].1.covariance + 0.05);
    }

    #[test]
    fn test_unknown_sensor_is_config_error() {
        let bank = EstimatorBank::from_profiles(&ProfileSet { profiles: vec![SensorProfile::light()] });
        let profile = SensorProfile::sound();
        let result = bank.evaluate(&profile, &sound_vector(&profile, 0.1, 0.1));
        assert!(matches!(result, Err(DetectError::Config(_))));
    }
}
