//! Smart room detection core
//!
//! Two detectors (isolation forest + per-feature Kalman estimators) must
//! agree before the one-shot alert fires.

pub mod constants;
pub mod logic;
