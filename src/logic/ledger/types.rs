use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::logic::features::FeatureVector;
use crate::logic::profile::SensorType;

/// Which detector confirmed the anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionMethod {
    #[serde(rename = "Isolation Forest")]
    IsolationForest,
    #[serde(rename = "Kalman Filter")]
    KalmanFilter,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::IsolationForest => "Isolation Forest",
            DetectionMethod::KalmanFilter => "Kalman Filter",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Isolation Forest" => Ok(DetectionMethod::IsolationForest),
            "Kalman Filter" => Ok(DetectionMethod::KalmanFilter),
            other => Err(format!("unknown detection method '{}'", other)),
        }
    }
}

/// One confirmed anomaly, immutable once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub subject_id: String,
    pub sensor_type: SensorType,
    pub features: BTreeMap<String, f64>,
    pub method: DetectionMethod,
    pub timestamp: NaiveDateTime,
}

impl AnomalyRecord {
    pub fn from_vector(fv: &FeatureVector, method: DetectionMethod) -> Self {
        Self {
            subject_id: fv.subject_id().to_string(),
            sensor_type: fv.sensor().clone(),
            features: fv.named_values(),
            method,
            timestamp: fv.timestamp(),
        }
    }
}
