//! Engine configuration
//!
//! Resolved once at startup from the environment (and `.env`).

use std::path::PathBuf;

use crate::constants;
use crate::logic::error::DetectResult;
use crate::logic::profile::{load_or_default, ProfileSet};

/// Runtime configuration for the detection engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// SQLite file holding readings and anomalies
    pub db_path: PathBuf,

    /// Sensor profiles JSON (`None` = built-in profiles)
    pub profiles_path: Option<PathBuf>,

    /// Default training CSV
    pub training_csv: PathBuf,

    /// Alert webhook base URL (`None` = log only)
    pub alert_url: Option<String>,

    /// Isolation forest seed
    pub seed: u64,
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            db_path: constants::get_db_path(),
            profiles_path: constants::get_profiles_path(),
            training_csv: constants::get_training_csv(),
            alert_url: constants::get_alert_url(),
            seed: constants::get_seed(),
        }
    }

    /// Profiles from `profiles_path`, validated
    pub fn load_profiles(&self) -> DetectResult<ProfileSet> {
        load_or_default(self.profiles_path.as_deref())
    }
}
