//! SQLite anomaly ledger
//!
//! `anomalies` is append-only. Uniqueness on
//! (timestamp, sensor_type, detection_method) backs the per-pass dedupe
//! check, and every batch is checked and written inside one IMMEDIATE
//! transaction.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{NaiveDateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, TransactionBehavior};

use super::types::{AnomalyRecord, DetectionMethod};
use super::AnomalyLedger;
use crate::constants::TIMESTAMP_FORMAT;
use crate::logic::error::{DetectError, DetectResult};
use crate::logic::profile::SensorType;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS anomalies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        subject_id TEXT NOT NULL,
        sensor_type TEXT NOT NULL,
        features TEXT NOT NULL,
        detection_method TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        recorded_at TEXT NOT NULL,
        UNIQUE (timestamp, sensor_type, detection_method)
    );

    CREATE INDEX IF NOT EXISTS idx_anomalies_sensor_ts
        ON anomalies(sensor_type, timestamp);
"#;

fn connectivity(e: rusqlite::Error) -> DetectError {
    DetectError::Connectivity(format!("anomaly ledger: {}", e))
}

fn transaction(e: rusqlite::Error) -> DetectError {
    DetectError::Transaction(e.to_string())
}

pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    pub fn open(path: &Path) -> DetectResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DetectError::Connectivity(format!("{}: {}", parent.display(), e)))?;
            }
        }
        let conn = Connection::open(path).map_err(connectivity)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> DetectResult<Self> {
        let conn = Connection::open_in_memory().map_err(connectivity)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> DetectResult<Self> {
        conn.execute_batch(SCHEMA).map_err(transaction)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Raw SQL hook for tests (fault injection)
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> rusqlite::Result<()> {
        self.conn.lock().execute_batch(sql)
    }
}

impl AnomalyLedger for SqliteLedger {
    fn exists(&self, timestamp: NaiveDateTime, sensor: &SensorType) -> DetectResult<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM anomalies WHERE timestamp = ?1 AND sensor_type = ?2",
                params![timestamp.format(TIMESTAMP_FORMAT).to_string(), sensor.as_str()],
                |row| row.get(0),
            )
            .map_err(connectivity)?;
        Ok(count > 0)
    }

    fn append(&self, records: &[AnomalyRecord]) -> DetectResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(transaction)?;
        let recorded_at = Utc::now().to_rfc3339();

        // Re-check under the write lock: another writer may have recorded this pair
        let mut checked = BTreeSet::new();
        for record in records {
            let timestamp = record.timestamp.format(TIMESTAMP_FORMAT).to_string();
            if !checked.insert((timestamp.clone(), record.sensor_type.as_str())) {
                continue;
            }
            let count: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM anomalies WHERE timestamp = ?1 AND sensor_type = ?2",
                    params![timestamp, record.sensor_type.as_str()],
                    |row| row.get(0),
                )
                .map_err(transaction)?;
            if count > 0 {
                return Err(DetectError::Transaction(format!(
                    "{} at {} already recorded",
                    record.sensor_type, timestamp
                )));
            }
        }

        for record in records {
            let features = serde_json::to_string(&record.features)
                .map_err(|e| DetectError::Transaction(format!("features: {}", e)))?;
            // Dropping `tx` on error rolls the whole batch back
            tx.execute(
                "INSERT INTO anomalies (subject_id, sensor_type, features, detection_method, timestamp, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.subject_id,
                    record.sensor_type.as_str(),
                    features,
                    record.method.as_str(),
                    record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    recorded_at,
                ],
            )
            .map_err(transaction)?;
        }

        tx.commit().map_err(transaction)?;
        log::debug!("Ledger: committed {} anomaly record(s)", records.len());
        Ok(records.len())
    }

    fn list(&self, sensor: Option<&SensorType>) -> DetectResult<Vec<AnomalyRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT subject_id, sensor_type, features, detection_method, timestamp
                 FROM anomalies
                 WHERE ?1 IS NULL OR sensor_type = ?1
                 ORDER BY timestamp, id",
            )
            .map_err(connectivity)?;

        let rows = stmt
            .query_map(params![sensor.map(SensorType::as_str)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(connectivity)?;

        let mut records = Vec::new();
        for row in rows {
            let (subject_id, sensor_type, features, method, timestamp) = row.map_err(connectivity)?;
            records.push(AnomalyRecord {
                subject_id,
                sensor_type: SensorType::new(sensor_type),
                features: serde_json::from_str(&features)
                    .map_err(|e| DetectError::data("features", e.to_string()))?,
                method: method
                    .parse::<DetectionMethod>()
                    .map_err(|e| DetectError::data("detection_method", e))?,
                timestamp: NaiveDateTime::parse_from_str(&timestamp, TIMESTAMP_FORMAT)
                    .map_err(|e| DetectError::data("timestamp", e.to_string()))?,
            });
        }
        Ok(records)
    }
}
