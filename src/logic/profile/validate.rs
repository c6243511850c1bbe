use std::collections::HashSet;

use super::types::{ProfileSet, SensorProfile};
use crate::logic::error::{DetectError, DetectResult};

/// Table and column names are spliced into SQL, so only plain identifiers pass
pub fn is_safe_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate one sensor profile
pub fn validate_profile(profile: &SensorProfile) -> DetectResult<()> {
    let sensor = profile.sensor.as_str();
    let fail = |msg: String| Err(DetectError::Config(format!("[{}] {}", sensor, msg)));

    if sensor.is_empty() {
        return Err(DetectError::Config("sensor type must not be empty".into()));
    }
    if !is_safe_identifier(&profile.table) {
        return fail(format!("invalid table name '{}'", profile.table));
    }
    if profile.features.is_empty() {
        return fail("no features configured".into());
    }
    if !(profile.contamination > 0.0 && profile.contamination <= 0.5) {
        return fail(format!(
            "contamination {} outside (0, 0.5]",
            profile.contamination
        ));
    }

    let mut seen = HashSet::new();
    for spec in &profile.features {
        if !is_safe_identifier(&spec.name) {
            return fail(format!("invalid feature name '{}'", spec.name));
        }
        if !seen.insert(spec.name.as_str()) {
            return fail(format!("duplicate feature '{}'", spec.name));
        }
        if !(spec.threshold >= 0.0) {
            return fail(format!("negative threshold for '{}'", spec.name));
        }
        if spec.normal_band.min > spec.normal_band.max {
            return fail(format!("inverted normal band for '{}'", spec.name));
        }
        if spec.training_range.min > spec.training_range.max {
            return fail(format!("inverted training range for '{}'", spec.name));
        }

        let p = &spec.estimator;
        if !(p.process_noise >= 0.0) || !(p.measurement_noise > 0.0) || !(p.initial_covariance >= 0.0) {
            return fail(format!("invalid noise/covariance for '{}'", spec.name));
        }
        if !p.transition.is_finite() || !p.observation.is_finite() || !p.initial_state.is_finite() {
            return fail(format!("non-finite estimator parameter for '{}'", spec.name));
        }
    }

    Ok(())
}

/// Validate a full profile set (unique sensor types)
pub fn validate_profiles(set: &ProfileSet) -> DetectResult<()> {
    if set.profiles.is_empty() {
        return Err(DetectError::Config("no sensor profiles configured".into()));
    }

    let mut seen = HashSet::new();
    for profile in &set.profiles {
        if !seen.insert(profile.sensor.clone()) {
            return Err(DetectError::Config(format!(
                "duplicate profile for sensor '{}'",
                profile.sensor
            )));
        }
        validate_profile(profile)?;
    }
    Ok(())
}
