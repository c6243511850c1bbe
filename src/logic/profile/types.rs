use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_READINGS_TABLE;

// ============================================================================
// SENSOR TYPE
// ============================================================================

/// Sensor type key ("light", "sound", ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorType(String);

impl SensorType {
    pub const LIGHT: &'static str = "light";
    pub const SOUND: &'static str = "sound";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn light() -> Self {
        Self::new(Self::LIGHT)
    }

    pub fn sound() -> Self {
        Self::new(Self::SOUND)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SensorType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

// ============================================================================
// POLICY ENUMS
// ============================================================================

/// How per-feature estimator flags become one sensor verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CombineRule {
    /// Every feature abnormal
    #[default]
    All,
    /// At least one feature abnormal
    Any,
}

impl CombineRule {
    /// An empty flag set is never abnormal
    pub fn combine(&self, flags: &[bool]) -> bool {
        if flags.is_empty() {
            return false;
        }
        match self {
            CombineRule::All => flags.iter().all(|f| *f),
            CombineRule::Any => flags.iter().any(|f| *f),
        }
    }
}

/// Where the estimator residual is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResidualMode {
    /// |corrected estimate - measurement|
    #[default]
    PostUpdate,
    /// |measurement - predicted estimate| (classical innovation)
    PreUpdate,
}

/// Rule turning a raw classifier outlier verdict into a confirmed anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmPolicy {
    /// Every feature must also sit outside its normal band
    AllOutsideBand,
    /// Outlier verdict is confirmed as is
    Unconditional,
}

/// Where labeled training samples come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum TrainingSelector {
    /// CSV with a `label` column; `None` uses the engine default file
    Csv {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// No training data: classifier stays untrained
    Disabled,
}

impl Default for TrainingSelector {
    fn default() -> Self {
        TrainingSelector::Csv { path: None }
    }
}

// ============================================================================
// PER-FEATURE CONFIG
// ============================================================================

/// Scalar estimator parameters (1x1 state space model)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimatorParams {
    /// State transition (F)
    pub transition: f64,
    /// Observation (H)
    pub observation: f64,
    /// Process noise (Q)
    pub process_noise: f64,
    /// Measurement noise (R)
    pub measurement_noise: f64,
    /// Initial covariance (P0)
    pub initial_covariance: f64,
    /// Initial state (x0)
    pub initial_state: f64,
}

impl Default for EstimatorParams {
    fn default() -> Self {
        Self {
            transition: 1.0,
            observation: 1.0,
            process_noise: 0.05,
            measurement_noise: 0.1,
            initial_covariance: 1.0,
            initial_state: 0.0,
        }
    }
}

impl EstimatorParams {
    pub fn starting_at(initial_state: f64) -> Self {
        Self {
            initial_state,
            ..Default::default()
        }
    }
}

/// Closed numeric interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

impl Band {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn unbounded() -> Self {
        // finite so the band survives a JSON round trip
        Self::new(f64::MIN, f64::MAX)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn is_outside(&self, value: f64) -> bool {
        !self.contains(value)
    }
}

/// One named feature with everything the detectors need for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(default)]
    pub estimator: EstimatorParams,
    /// Residual above this marks the feature abnormal
    pub threshold: f64,
    /// Normal band used by `ConfirmPolicy::AllOutsideBand`
    pub normal_band: Band,
    /// Training pre-filter range
    pub training_range: Band,
}

impl FeatureSpec {
    pub fn new(name: &str, initial_state: f64, threshold: f64) -> Self {
        Self {
            name: name.to_string(),
            estimator: EstimatorParams::starting_at(initial_state),
            threshold,
            normal_band: Band::unbounded(),
            training_range: Band::unbounded(),
        }
    }

    pub fn with_normal_band(mut self, min: f64, max: f64) -> Self {
        self.normal_band = Band::new(min, max);
        self
    }

    pub fn with_training_range(mut self, min: f64, max: f64) -> Self {
        self.training_range = Band::new(min, max);
        self
    }
}

// ============================================================================
// SENSOR PROFILE
// ============================================================================

fn default_table() -> String {
    DEFAULT_READINGS_TABLE.to_string()
}

fn default_contamination() -> f64 {
    0.1
}

/// Configuration for one sensor type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorProfile {
    pub sensor: SensorType,
    /// Readings table holding this sensor's rows
    #[serde(default = "default_table")]
    pub table: String,
    pub features: Vec<FeatureSpec>,
    #[serde(default)]
    pub combine: CombineRule,
    #[serde(default)]
    pub residual_mode: ResidualMode,
    pub confirm: ConfirmPolicy,
    /// Expected anomaly fraction (classifier cut)
    #[serde(default = "default_contamination")]
    pub contamination: f64,
    #[serde(default)]
    pub training: TrainingSelector,
    /// Whether a pass confirmed by both detectors may fire the alert latch.
    /// Unset means only the sound sensor fires; see `fires_alert()`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fires_alert: Option<bool>,
}

impl SensorProfile {
    /// Ambient light in lux, dim room baseline
    pub fn light() -> Self {
        Self {
            sensor: SensorType::light(),
            table: default_table(),
            features: vec![
                FeatureSpec::new("light_level", 12.0, 1.0)
                    .with_normal_band(0.0, 25.0)
                    .with_training_range(0.0, 25.0),
            ],
            combine: CombineRule::All,
            residual_mode: ResidualMode::PostUpdate,
            confirm: ConfirmPolicy::Unconditional,
            contamination: default_contamination(),
            training: TrainingSelector::default(),
            fires_alert: Some(false),
        }
    }

    /// Ambient sound (RMS energy + zero crossing rate), quiet room baseline
    pub fn sound() -> Self {
        Self {
            sensor: SensorType::sound(),
            table: default_table(),
            features: vec![
                FeatureSpec::new("rms", 0.008, 0.001)
                    .with_normal_band(0.01, 0.03)
                    .with_training_range(0.001, 0.03),
                FeatureSpec::new("zcr", 0.010, 0.001)
                    .with_normal_band(0.003, 0.02)
                    .with_training_range(0.009, 0.04),
            ],
            combine: CombineRule::All,
            residual_mode: ResidualMode::PostUpdate,
            confirm: ConfirmPolicy::AllOutsideBand,
            contamination: default_contamination(),
            training: TrainingSelector::default(),
            fires_alert: Some(true),
        }
    }

    /// Profile used for offline evaluation of sound datasets
    pub fn sound_evaluation() -> Self {
        let params = EstimatorParams {
            process_noise: 0.01,
            ..EstimatorParams::starting_at(0.0)
        };
        let mut rms = FeatureSpec::new("rms", 0.0, 0.004).with_training_range(0.002, 0.05);
        rms.estimator = params;
        let mut zcr = FeatureSpec::new("zcr", 0.0, 0.003).with_training_range(0.002, 0.03);
        zcr.estimator = params;

        Self {
            sensor: SensorType::sound(),
            table: default_table(),
            features: vec![rms, zcr],
            combine: CombineRule::Any,
            residual_mode: ResidualMode::PostUpdate,
            confirm: ConfirmPolicy::Unconditional,
            contamination: default_contamination(),
            training: TrainingSelector::default(),
            fires_alert: Some(false),
        }
    }

    /// Resolved latch policy
    pub fn fires_alert(&self) -> bool {
        self.fires_alert
            .unwrap_or_else(|| self.sensor.as_str() == SensorType::SOUND)
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureSpec> {
        self.features.iter().find(|f| f.name == name)
    }

    /// True when every value lies in its feature's training range
    pub fn in_training_range(&self, values: &[f64]) -> bool {
        values.len() == self.features.len()
            && self
                .features
                .iter()
                .zip(values)
                .all(|(spec, v)| spec.training_range.contains(*v))
    }
}

/// Ordered set of profiles (detection cycle order)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSet {
    pub profiles: Vec<SensorProfile>,
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self {
            profiles: vec![SensorProfile::light(), SensorProfile::sound()],
        }
    }
}

impl ProfileSet {
    pub fn get(&self, sensor: &SensorType) -> Option<&SensorProfile> {
        self.profiles.iter().find(|p| &p.sensor == sensor)
    }

    pub fn sensors(&self) -> Vec<SensorType> {
        self.profiles.iter().map(|p| p.sensor.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorProfile> {
        self.profiles.iter()
    }
}
