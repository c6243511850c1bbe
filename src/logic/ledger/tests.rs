use chrono::NaiveDateTime;

use super::types::{AnomalyRecord, DetectionMethod};
use super::{AnomalyLedger, SqliteLedger};
use crate::constants::TIMESTAMP_FORMAT;
use crate::logic::error::DetectError;
use crate::logic::features::FeatureVector;
use crate::logic::profile::{SensorProfile, SensorType};

fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
}

fn sound_record(at: &str, method: DetectionMethod) -> AnomalyRecord {
    let profile = SensorProfile::sound();
    let fv = FeatureVector::from_values(&profile.sensor, &profile.feature_names(), vec![0.05, 0.03], ts(at));
    AnomalyRecord::from_vector(&fv, method)
}

#[test]
fn test_append_and_exists() {
    let ledger = SqliteLedger::open_in_memory().unwrap();
    let at = "2025-03-01 10:00:00";

    assert!(!ledger.exists(ts(at), &SensorType::sound()).unwrap());
    let written = ledger
        .append(&[
            sound_record(at, DetectionMethod::IsolationForest),
            sound_record(at, DetectionMethod::KalmanFilter),
        ])
        .unwrap();

    assert_eq!(written, 2);
    assert!(ledger.exists(ts(at), &SensorType::sound()).unwrap());
    assert!(!ledger.exists(ts(at), &SensorType::light()).unwrap());
}

#[test]
fn test_list_round_trips_features() {
    let ledger = SqliteLedger::open_in_memory().unwrap();
    ledger
        .append(&[sound_record("2025-03-01 10:00:05", DetectionMethod::KalmanFilter)])
        .unwrap();

    let records = ledger.list(Some(&SensorType::sound())).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].method, DetectionMethod::KalmanFilter);
    assert_eq!(records[0].features.get("rms"), Some(&0.05));
    assert_eq!(records[0].timestamp, ts("2025-03-01 10:00:05"));

    assert!(ledger.list(Some(&SensorType::light())).unwrap().is_empty());
    assert_eq!(ledger.list(None).unwrap().len(), 1);
}

#[test]
fn test_duplicate_method_rejected() {
    let ledger = SqliteLedger::open_in_memory().unwrap();
    let at = "2025-03-01 10:00:10";
    ledger.append(&[sound_record(at, DetectionMethod::KalmanFilter)]).unwrap();

    let result = ledger.append(&[sound_record(at, DetectionMethod::KalmanFilter)]);
    assert!(matches!(result, Err(DetectError::Transaction(_))));
    assert_eq!(ledger.list(None).unwrap().len(), 1);
}

#[test]
fn test_sub_second_readings_are_distinct() {
    let ledger = SqliteLedger::open_in_memory().unwrap();
    ledger
        .append(&[sound_record("2025-03-01 10:00:00.250", DetectionMethod::KalmanFilter)])
        .unwrap();

    assert!(!ledger.exists(ts("2025-03-01 10:00:00.750"), &SensorType::sound()).unwrap());
    ledger
        .append(&[sound_record("2025-03-01 10:00:00.750", DetectionMethod::KalmanFilter)])
        .unwrap();

    let records = ledger.list(None).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].timestamp, ts("2025-03-01 10:00:00.250"));
}

#[test]
fn test_recorded_pair_rejects_later_batch() {
    let ledger = SqliteLedger::open_in_memory().unwrap();
    let at = "2025-03-01 10:00:12";
    ledger.append(&[sound_record(at, DetectionMethod::IsolationForest)]).unwrap();

    // a second writer that missed the first commit
    let result = ledger.append(&[sound_record(at, DetectionMethod::KalmanFilter)]);
    assert!(matches!(result, Err(DetectError::Transaction(_))));
    assert_eq!(ledger.list(None).unwrap().len(), 1);
}

#[test]
fn test_failed_second_insert_rolls_back_batch() {
    let ledger = SqliteLedger::open_in_memory().unwrap();
    ledger
        .execute_raw(
            "CREATE TRIGGER fail_kalman BEFORE INSERT ON anomalies
             WHEN NEW.detection_method = 'Kalman Filter'
             BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
        )
        .unwrap();

    let at = "2025-03-01 10:00:15";
    let result = ledger.append(&[
        sound_record(at, DetectionMethod::IsolationForest),
        sound_record(at, DetectionMethod::KalmanFilter),
    ]);

    assert!(matches!(result, Err(DetectError::Transaction(_))));
    assert!(ledger.list(None).unwrap().is_empty());
    assert!(!ledger.exists(ts(at), &SensorType::sound()).unwrap());
}

#[test]
fn test_on_disk_ledger_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("ledger.db");
    let at = "2025-03-01 10:00:20";

    {
        let ledger = SqliteLedger::open(&path).unwrap();
        ledger.append(&[sound_record(at, DetectionMethod::IsolationForest)]).unwrap();
    }

    let reopened = SqliteLedger::open(&path).unwrap();
    assert!(reopened.exists(ts(at), &SensorType::sound()).unwrap());
}

#[test]
fn test_empty_append_is_noop() {
    let ledger = SqliteLedger::open_in_memory().unwrap();
    assert_eq!(ledger.append(&[]).unwrap(), 0);
}

#[test]
fn test_method_names() {
    assert_eq!(DetectionMethod::IsolationForest.to_string(), "Isolation Forest");
    assert_eq!("Kalman Filter".parse::<DetectionMethod>().unwrap(), DetectionMethod::KalmanFilter);
    assert!("Random Forest".parse::<DetectionMethod>().is_err());
}
