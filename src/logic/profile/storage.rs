use std::fs;
use std::path::Path;

use super::types::ProfileSet;
use super::validate::validate_profiles;
use crate::logic::error::{DetectError, DetectResult};

/// Save profiles to disk (pretty JSON)
pub fn save_profiles(set: &ProfileSet, path: &Path) -> DetectResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| DetectError::Config(format!("{}: {}", parent.display(), e)))?;
    }

    let json = serde_json::to_vec_pretty(set)
        .map_err(|e| DetectError::Config(format!("serialize profiles: {}", e)))?;
    fs::write(path, json).map_err(|e| DetectError::Config(format!("{}: {}", path.display(), e)))?;
    Ok(())
}

/// Load profiles from disk with validation
pub fn load_profiles(path: &Path) -> DetectResult<ProfileSet> {
    let data = fs::read(path)
        .map_err(|e| DetectError::Config(format!("{}: {}", path.display(), e)))?;
    let set: ProfileSet = serde_json::from_slice(&data)
        .map_err(|e| DetectError::Config(format!("{}: {}", path.display(), e)))?;

    validate_profiles(&set)?;
    Ok(set)
}

/// Load from `path` when given, otherwise validated built-in defaults
pub fn load_or_default(path: Option<&Path>) -> DetectResult<ProfileSet> {
    match path {
        Some(p) => {
            let set = load_profiles(p)?;
            log::info!("Loaded {} sensor profiles from {}", set.profiles.len(), p.display());
            Ok(set)
        }
        None => {
            let set = ProfileSet::default();
            validate_profiles(&set)?;
            log::info!("Using built-in sensor profiles ({})", set.profiles.len());
            Ok(set)
        }
    }
}
