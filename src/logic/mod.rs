//! Logic Module - detection engine
//!
//! ## Layout
//! - `profile/` - per-sensor configuration (data, not code)
//! - `features/` - readings as numeric feature vectors
//! - `estimator/` - sequential per-feature estimators
//! - `model/` - outlier classifier (isolation forest)
//! - `ledger/` - durable anomaly records
//! - `source/` - reading store and training data
//! - `orchestrator/` - one detection pass per sensor type

pub mod error;
pub mod config;
pub mod latch;
pub mod alert;
pub mod evaluation;

pub mod profile;
pub mod features;
pub mod estimator;
pub mod model;
pub mod ledger;
pub mod source;
pub mod orchestrator;

pub use error::{DetectError, DetectResult, Recovery};
pub use orchestrator::{CycleReport, DetectionOrchestrator, DetectionResult, PassOutcome};
