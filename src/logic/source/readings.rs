//! SQLite reading store
//!
//! Sensors publish JSON messages; `ingest` stores them in the readings table
//! and `get_latest` hands the newest row for a sensor back to the detector.

use std::path::Path;

use chrono::NaiveDateTime;
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::ReadingSource;
use crate::constants::{DEFAULT_READINGS_TABLE, DEFAULT_SUBJECT_ID, TIMESTAMP_FORMAT};
use crate::logic::error::{DetectError, DetectResult};
use crate::logic::features::{RawReading, RawValue};
use crate::logic::profile::{is_safe_identifier, SensorType};

// ============================================================================
// SENSOR MESSAGES
// ============================================================================

/// Message published by the room sensors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sensor", rename_all = "lowercase")]
pub enum SensorMessage {
    Light {
        /// Illuminance in lux
        value: f64,
        timestamp: String,
        #[serde(default)]
        subject_id: Option<String>,
    },
    Sound {
        db: f64,
        rms: f64,
        zcr: f64,
        timestamp: String,
        #[serde(default)]
        subject_id: Option<String>,
    },
}

impl SensorMessage {
    pub fn parse(json: &str) -> DetectResult<Self> {
        serde_json::from_str(json).map_err(|e| DetectError::data("message", e.to_string()))
    }

    pub fn sensor(&self) -> SensorType {
        match self {
            SensorMessage::Light { .. } => SensorType::light(),
            SensorMessage::Sound { .. } => SensorType::sound(),
        }
    }

    pub fn timestamp(&self) -> DetectResult<NaiveDateTime> {
        let raw = match self {
            SensorMessage::Light { timestamp, .. } | SensorMessage::Sound { timestamp, .. } => timestamp,
        };
        parse_timestamp(raw)
    }

    fn subject_id(&self) -> &str {
        let subject = match self {
            SensorMessage::Light { subject_id, .. } | SensorMessage::Sound { subject_id, .. } => subject_id,
        };
        subject.as_deref().unwrap_or(DEFAULT_SUBJECT_ID)
    }
}

fn parse_timestamp(raw: &str) -> DetectResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|e| DetectError::data("timestamp", format!("'{}': {}", raw, e)))
}

// ============================================================================
// STORE
// ============================================================================

fn connectivity(e: rusqlite::Error) -> DetectError {
    DetectError::Connectivity(format!("reading store: {}", e))
}

fn to_raw_value(value: Value) -> RawValue {
    match value {
        Value::Real(v) => RawValue::Number(v),
        Value::Integer(v) => RawValue::Number(v as f64),
        Value::Text(s) => RawValue::Text(s),
        Value::Null => RawValue::Missing,
        Value::Blob(b) => RawValue::Text(String::from_utf8_lossy(&b).into_owned()),
    }
}

fn to_subject(value: Value) -> String {
    match value {
        Value::Text(s) => s,
        Value::Integer(v) => v.to_string(),
        Value::Real(v) => v.to_string(),
        Value::Null | Value::Blob(_) => DEFAULT_SUBJECT_ID.to_string(),
    }
}

pub struct SqliteReadingSource {
    conn: Mutex<Connection>,
}

impl SqliteReadingSource {
    pub fn open(path: &Path) -> DetectResult<Self> {
        let conn = Connection::open(path).map_err(connectivity)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> DetectResult<Self> {
        let conn = Connection::open_in_memory().map_err(connectivity)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> DetectResult<Self> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id TEXT NOT NULL,
                light_level REAL,
                db REAL,
                rms REAL,
                zcr REAL,
                timestamp TEXT NOT NULL
            );",
            DEFAULT_READINGS_TABLE
        ))
        .map_err(|e| DetectError::Transaction(format!("readings schema: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Store one sensor message, returning the new row id
    pub fn ingest(&self, message: &SensorMessage) -> DetectResult<i64> {
        let timestamp = message.timestamp()?.format(TIMESTAMP_FORMAT).to_string();
        let conn = self.conn.lock();

        let inserted = match message {
            SensorMessage::Light { value, .. } => conn.execute(
                &format!(
                    "INSERT INTO {} (subject_id, light_level, timestamp) VALUES (?1, ?2, ?3)",
                    DEFAULT_READINGS_TABLE
                ),
                params![message.subject_id(), value, timestamp],
            ),
            SensorMessage::Sound { db, rms, zcr, .. } => conn.execute(
                &format!(
                    "INSERT INTO {} (subject_id, db, rms, zcr, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
                    DEFAULT_READINGS_TABLE
                ),
                params![message.subject_id(), db, rms, zcr, timestamp],
            ),
        };

        inserted.map_err(|e| DetectError::Transaction(format!("ingest: {}", e)))?;
        let id = conn.last_insert_rowid();
        log::debug!("Ingested {} reading #{} at {}", message.sensor(), id, timestamp);
        Ok(id)
    }

    /// Parse and store a JSON message
    pub fn ingest_json(&self, json: &str) -> DetectResult<i64> {
        let message = SensorMessage::parse(json)?;
        self.ingest(&message)
    }

    /// Insert a row with arbitrary column values (used for malformed-data tests)
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> rusqlite::Result<()> {
        self.conn.lock().execute_batch(sql)
    }
}

impl ReadingSource for SqliteReadingSource {
    fn get_latest(&self, sensor: &SensorType, features: &[String], table: &str) -> DetectResult<Option<RawReading>> {
        if features.is_empty() {
            return Err(DetectError::Config(format!("[{}] no feature columns", sensor)));
        }
        if !is_safe_identifier(table) || !features.iter().all(|f| is_safe_identifier(f)) {
            return Err(DetectError::Config(format!("[{}] unsafe table or column name", sensor)));
        }

        let sql = format!(
            "SELECT id, subject_id, {}, timestamp FROM {} WHERE {} IS NOT NULL ORDER BY timestamp DESC LIMIT 1",
            features.join(", "),
            table,
            features[0]
        );

        let conn = self.conn.lock();
        let row = conn
            .query_row(&sql, [], |row| {
                let record_id: i64 = row.get(0)?;
                let subject: Value = row.get(1)?;
                let mut values = Vec::with_capacity(features.len());
                for i in 0..features.len() {
                    values.push(to_raw_value(row.get::<_, Value>(2 + i)?));
                }
                let timestamp: String = row.get(2 + features.len())?;
                Ok((record_id, to_subject(subject), values, timestamp))
            })
            .optional()
            .map_err(connectivity)?;

        let Some((record_id, subject_id, values, timestamp)) = row else {
            return Ok(None);
        };

        Ok(Some(RawReading {
            record_id,
            subject_id,
            values,
            timestamp: parse_timestamp(&timestamp)?,
        }))
    }
}
