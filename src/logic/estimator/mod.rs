//! Estimator Module - per-feature sequential estimation
//!
//! - `kalman.rs`: scalar predict/update filter with configurable residual mode
//! - `bank.rs`: one filter per (sensor, feature) and the sensor-level verdict

pub mod kalman;
pub mod bank;

pub use kalman::{EstimatorState, SequentialEstimator, Step};
pub use bank::{EstimatorBank, EstimatorVerdict, FeatureResidual};
