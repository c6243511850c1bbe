//! Feature Vector - one sensor reading as detector input
//!
//! `RawReading` is what the reading store hands back (values may still be
//! text or missing). `FeatureVector` is the coerced, immutable form that
//! flows through both detectors and into the ledger.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::constants::TIMESTAMP_FORMAT;
use crate::logic::error::{DetectError, DetectResult};
use crate::logic::profile::SensorType;

// ============================================================================
// RAW READING
// ============================================================================

/// A stored value before numeric coercion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Missing,
}

impl RawValue {
    /// Coerce to a finite number
    pub fn coerce(&self, feature: &str) -> DetectResult<f64> {
        let value = match self {
            RawValue::Number(v) => *v,
            RawValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| DetectError::data(feature, format!("'{}' is not numeric", s)))?,
            RawValue::Missing => return Err(DetectError::data(feature, "value missing")),
        };

        if value.is_finite() {
            Ok(value)
        } else {
            Err(DetectError::data(feature, format!("{} is not finite", value)))
        }
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Number(v)
    }
}

/// Latest row for a sensor as returned by a `ReadingSource`
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    pub record_id: i64,
    pub subject_id: String,
    /// Ordered like the profile's feature names
    pub values: Vec<RawValue>,
    pub timestamp: NaiveDateTime,
}

// ============================================================================
// FEATURE VECTOR
// ============================================================================

/// Coerced reading: named numeric features for one sensor and timestamp
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    sensor: SensorType,
    record_id: i64,
    subject_id: String,
    timestamp: NaiveDateTime,
    names: Vec<String>,
    values: Vec<f64>,
}

impl FeatureVector {
    /// Build from a raw reading, failing on the first non-numeric feature
    pub fn from_raw(sensor: &SensorType, names: &[String], raw: &RawReading) -> DetectResult<Self> {
        if raw.values.len() != names.len() {
            return Err(DetectError::data(
                names.join(","),
                format!("expected {} values, got {}", names.len(), raw.values.len()),
            ));
        }

        let values = names
            .iter()
            .zip(&raw.values)
            .map(|(name, v)| v.coerce(name))
            .collect::<DetectResult<Vec<f64>>>()?;

        Ok(Self {
            sensor: sensor.clone(),
            record_id: raw.record_id,
            subject_id: raw.subject_id.clone(),
            timestamp: raw.timestamp,
            names: names.to_vec(),
            values,
        })
    }

    /// Build directly from numbers (training rows, evaluation)
    pub fn from_values(
        sensor: &SensorType,
        names: &[String],
        values: Vec<f64>,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            sensor: sensor.clone(),
            record_id: 0,
            subject_id: String::new(),
            timestamp,
            names: names.to_vec(),
            values,
        }
    }

    pub fn sensor(&self) -> &SensorType {
        &self.sensor
    }

    pub fn record_id(&self) -> i64 {
        self.record_id
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get feature by name
    pub fn get_by_name(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    /// (name, value) pairs in feature order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names.iter().map(String::as_str).zip(self.values.iter().copied())
    }

    pub fn named_values(&self) -> BTreeMap<String, f64> {
        self.iter().map(|(n, v)| (n.to_string(), v)).collect()
    }

    /// JSON form for logging
    pub fn to_log_entry(&self) -> serde_json::Value {
        serde_json::json!({
            "sensor": self.sensor,
            "record_id": self.record_id,
            "subject_id": self.subject_id,
            "timestamp": self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            "values": self.named_values(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn names() -> Vec<String> {
        vec!["rms".to_string(), "zcr".to_string()]
    }

    #[test]
    fn test_coerce_number_and_text() {
        assert_eq!(RawValue::Number(0.5).coerce("rms").unwrap(), 0.5);
        assert_eq!(RawValue::Text(" 0.25 ".into()).coerce("rms").unwrap(), 0.25);
    }

    #[test]
    fn test_coerce_failures() {
        assert!(matches!(
            RawValue::Text("loud".into()).coerce("rms"),
            Err(DetectError::Data { .. })
        ));
        assert!(RawValue::Missing.coerce("rms").is_err());
        assert!(RawValue::Number(f64::NAN).coerce("rms").is_err());
    }

    #[test]
    fn test_from_raw() {
        let raw = RawReading {
            record_id: 7,
            subject_id: "10".into(),
            values: vec![RawValue::Number(0.05), RawValue::Text("0.03".into())],
            timestamp: ts(),
        };
        let fv = FeatureVector::from_raw(&SensorType::sound(), &names(), &raw).unwrap();

        assert_eq!(fv.as_slice(), &[0.05, 0.03]);
        assert_eq!(fv.get_by_name("zcr"), Some(0.03));
        assert_eq!(fv.subject_id(), "10");
        assert_eq!(fv.record_id(), 7);
    }

    #[test]
    fn test_from_raw_reports_bad_feature() {
        let raw = RawReading {
            record_id: 1,
            subject_id: "10".into(),
            values: vec![RawValue::Number(0.05), RawValue::Text("n/a".into())],
            timestamp: ts(),
        };
        match FeatureVector::from_raw(&SensorType::sound(), &names(), &raw) {
            Err(DetectError::Data { feature, .. }) => assert_eq!(feature, "zcr"),
            other => panic!("expected data error, got {:?}", other),
        }
    }

    #[test]
    fn test_from_raw_length_mismatch() {
        let raw = RawReading {
            record_id: 1,
            subject_id: "10".into(),
            values: vec![RawValue::Number(0.05)],
            timestamp: ts(),
        };
        assert!(FeatureVector::from_raw(&SensorType::sound(), &names(), &raw).is_err());
    }

    #[test]
    fn test_log_entry() {
        let fv = FeatureVector::from_values(&SensorType::sound(), &names(), vec![0.1, 0.2], ts());
        let entry = fv.to_log_entry();
        assert_eq!(entry["sensor"], "sound");
        assert_eq!(entry["timestamp"], "2025-03-01 12:00:00");
        assert_eq!(entry["values"]["rms"], 0.1);
    }
}
