//! Sensor Profiles - per-sensor detection configuration
//!
//! Configuration is data, not code: feature names, estimator parameters,
//! thresholds, bands and policies are all carried by `SensorProfile`.
//!
//! # Architecture
//! - `types.rs`: `SensorProfile`, `FeatureSpec`, policy enums
//! - `validate.rs`: profile sanity checks (run on every load)
//! - `storage.rs`: JSON persistence

pub mod types;
pub mod validate;
pub mod storage;

pub use types::{
    Band, CombineRule, ConfirmPolicy, EstimatorParams, FeatureSpec, ProfileSet, ResidualMode,
    SensorProfile, SensorType, TrainingSelector,
};
pub use validate::{is_safe_identifier, validate_profile, validate_profiles};
pub use storage::{load_or_default, load_profiles, save_profiles};
