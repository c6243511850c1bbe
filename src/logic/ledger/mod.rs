//! Anomaly Ledger - durable record of confirmed anomalies
//!
//! # Architecture
//! - `types.rs`: `AnomalyRecord`, `DetectionMethod`
//! - `sqlite.rs`: SQLite-backed ledger (transactional batches)

pub mod types;
pub mod sqlite;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::logic::error::DetectResult;
use crate::logic::profile::SensorType;

pub use sqlite::SqliteLedger;
pub use types::{AnomalyRecord, DetectionMethod};

pub trait AnomalyLedger: Send + Sync {
    /// True when any record exists for this (timestamp, sensor) pair
    fn exists(&self, timestamp: NaiveDateTime, sensor: &SensorType) -> DetectResult<bool>;

    /// Write all records or none of them
    fn append(&self, records: &[AnomalyRecord]) -> DetectResult<usize>;

    /// Records in timestamp order, optionally for one sensor
    fn list(&self, sensor: Option<&SensorType>) -> DetectResult<Vec<AnomalyRecord>>;
}

impl<T: AnomalyLedger + ?Sized> AnomalyLedger for Arc<T> {
    fn exists(&self, timestamp: NaiveDateTime, sensor: &SensorType) -> DetectResult<bool> {
        (**self).exists(timestamp, sensor)
    }

    fn append(&self, records: &[AnomalyRecord]) -> DetectResult<usize> {
        (**self).append(records)
    }

    fn list(&self, sensor: Option<&SensorType>) -> DetectResult<Vec<AnomalyRecord>> {
        (**self).list(sensor)
    }
}
