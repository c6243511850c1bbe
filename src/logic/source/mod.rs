//! Source Module - where readings and training data come from
//!
//! - `readings.rs`: SQLite reading store + sensor message ingestion
//! - `training.rs`: labeled CSV training data

pub mod readings;
pub mod training;

pub use readings::{SensorMessage, SqliteReadingSource};
pub use training::{read_labeled_csv, CsvTrainingSource};

use std::sync::Arc;

use crate::logic::error::DetectResult;
use crate::logic::features::RawReading;
use crate::logic::model::LabeledSample;
use crate::logic::profile::SensorType;

pub trait ReadingSource: Send + Sync {
    /// Newest row for a sensor, values ordered like `features`
    fn get_latest(&self, sensor: &SensorType, features: &[String], table: &str) -> DetectResult<Option<RawReading>>;
}

pub trait TrainingSource: Send + Sync {
    fn load_labeled_samples(&self, sensor: &SensorType, features: &[String]) -> DetectResult<Vec<LabeledSample>>;
}

impl<T: ReadingSource + ?Sized> ReadingSource for Arc<T> {
    fn get_latest(&self, sensor: &SensorType, features: &[String], table: &str) -> DetectResult<Option<RawReading>> {
        (**self).get_latest(sensor, features, table)
    }
}
