//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! Every value can be overridden through the environment (or a `.env` file).

use std::path::PathBuf;

/// App name (also the data directory name)
pub const APP_NAME: &str = "smartroom";

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default SQLite database file name (readings + anomalies)
pub const DEFAULT_DB_FILE: &str = "smartroom.db";

/// Default readings table
pub const DEFAULT_READINGS_TABLE: &str = "smart_room_readings";

/// Default training data file
pub const DEFAULT_TRAINING_CSV: &str = "trainingData.csv";

/// Subject recorded when a reading carries none
pub const DEFAULT_SUBJECT_ID: &str = "10";

/// Seed for the isolation forest (reproducible training)
pub const DEFAULT_SEED: u64 = 42;

/// Default pause between detection cycles (seconds)
pub const DEFAULT_INTERVAL_SECS: u64 = 5;

/// Timestamp format shared by sensors, readings and the ledger
///
/// `%.f` reads and writes nothing for whole seconds.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// ============================================
// Alert topics
// ============================================

/// Movement directive for the robot
pub const TOPIC_ROBOT_MOVE: &str = "robot/move";

/// Human readable alert for the web dashboard
pub const TOPIC_WEB_ALERT: &str = "web/alert";

/// Message sent on the web alert topic
pub const ALERT_MESSAGE: &str = "Patient abnormal sound detected!";

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Base data directory (`<local data dir>/smartroom`)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Database path from environment or default data dir
pub fn get_db_path() -> PathBuf {
    std::env::var("SMARTROOM_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| get_data_dir().join(DEFAULT_DB_FILE))
}

/// Optional sensor profiles file (built-in profiles when unset)
pub fn get_profiles_path() -> Option<PathBuf> {
    std::env::var("SMARTROOM_PROFILES").ok().map(PathBuf::from)
}

/// Training CSV path from environment or default
pub fn get_training_csv() -> PathBuf {
    std::env::var("SMARTROOM_TRAINING_CSV")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_TRAINING_CSV))
}

/// Alert webhook base URL (log-only delivery when unset)
pub fn get_alert_url() -> Option<String> {
    std::env::var("SMARTROOM_ALERT_URL")
        .ok()
        .filter(|s| !s.trim().is_empty())
}

/// Forest seed from environment or default
pub fn get_seed() -> u64 {
    std::env::var("SMARTROOM_SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_SEED)
}
