//! Offline Evaluation
//!
//! Trains the classifier on a labeled training CSV, replays a labeled test
//! CSV through both detectors row by row, writes the per-row verdicts next
//! to the input columns and scores each detector against the labels.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::logic::error::{DetectError, DetectResult};
use crate::logic::estimator::EstimatorBank;
use crate::logic::features::FeatureVector;
use crate::logic::model::OutlierClassifier;
use crate::logic::profile::{ProfileSet, SensorProfile};
use crate::logic::source::read_labeled_csv;
use crate::logic::source::training::LABEL_COLUMN;

pub const ABNORMAL: &str = "abnormal";
pub const NORMAL: &str = "normal";

// ============================================================================
// METRICS
// ============================================================================

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Confusion counts with "abnormal" as the positive class
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Metrics {
    pub tp: usize,
    pub tn: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
}

impl Metrics {
    /// Compare predicted labels against the truth (pairs beyond the shorter list are ignored)
    pub fn from_labels<T: AsRef<str>, P: AsRef<str>>(truth: &[T], predicted: &[P]) -> Self {
        let mut m = Metrics::default();
        for (t, p) in truth.iter().zip(predicted) {
            let t = is_abnormal(t.as_ref());
            let p = is_abnormal(p.as_ref());
            match (t, p) {
                (true, true) => m.tp += 1,
                (false, false) => m.tn += 1,
                (false, true) => m.fp += 1,
                (true, false) => m.fn_ += 1,
            }
        }

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { round2(num as f64 / den as f64) };
        m.accuracy = ratio(m.tp + m.tn, m.tp + m.tn + m.fp + m.fn_);
        m.precision = ratio(m.tp, m.tp + m.fp);
        m.recall = ratio(m.tp, m.tp + m.fn_);
        m
    }
}

fn is_abnormal(label: &str) -> bool {
    label.trim().eq_ignore_ascii_case(ABNORMAL)
}

fn verdict(abnormal: bool) -> &'static str {
    if abnormal {
        ABNORMAL
    } else {
        NORMAL
    }
}

// ============================================================================
// RUN
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub training_samples: usize,
    pub rows: usize,
    pub isolation: Metrics,
    pub kalman: Metrics,
    pub output: PathBuf,
}

pub struct Evaluation {
    profile: SensorProfile,
    seed: u64,
}

impl Evaluation {
    pub fn new(profile: SensorProfile, seed: u64) -> Self {
        Self { profile, seed }
    }

    /// Evaluation profile for sound recordings (ANY rule, relaxed thresholds)
    pub fn sound(seed: u64) -> Self {
        Self::new(SensorProfile::sound_evaluation(), seed)
    }

    pub fn run(&self, train_csv: &Path, test_csv: &Path, output: &Path) -> DetectResult<EvaluationReport> {
        let profile = &self.profile;
        let names = profile.feature_names();

        let mut classifier = OutlierClassifier::isolation_forest(profile, self.seed);
        let samples = read_labeled_csv(train_csv, profile.sensor.as_str(), &names)?;
        let training_samples = classifier.fit_labeled(profile, &samples)?;

        // fresh estimators: evaluation never touches live state
        let estimators = EstimatorBank::from_profiles(&ProfileSet {
            profiles: vec![profile.clone()],
        });

        let file = File::open(test_csv).map_err(|e| DetectError::data("test_csv", format!("{}: {}", test_csv.display(), e)))?;
        let mut reader = csv::Reader::from_reader(BufReader::new(file));
        let headers = reader
            .headers()
            .map_err(|e| DetectError::data("test_csv", e.to_string()))?
            .clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| DetectError::data(name, format!("column missing in {}", test_csv.display())))
        };
        let label_idx = column(LABEL_COLUMN)?;
        let feature_idx = names
            .iter()
            .map(|n| column(n.as_str()))
            .collect::<DetectResult<Vec<usize>>>()?;

        let write_err = |e: csv::Error| DetectError::Transaction(format!("{}: {}", output.display(), e));
        let mut writer = csv::Writer::from_path(output).map_err(write_err)?;
        let mut out_headers = headers.clone();
        out_headers.push_field("isolation_result");
        out_headers.push_field("kalman_result");
        writer.write_record(&out_headers).map_err(write_err)?;

        let mut truth = Vec::new();
        let mut iso_preds = Vec::new();
        let mut kalman_preds = Vec::new();

        for (row, result) in reader.records().enumerate() {
            let record = result.map_err(|e| DetectError::data("test_csv", format!("row {}: {}", row + 1, e)))?;
            let values = feature_idx
                .iter()
                .zip(&names)
                .map(|(&i, name)| {
                    let raw = record.get(i).unwrap_or("");
                    raw.trim()
                        .parse::<f64>()
                        .map_err(|_| DetectError::data(name.as_str(), format!("row {}: '{}' is not numeric", row + 1, raw)))
                })
                .collect::<DetectResult<Vec<f64>>>()?;

            let fv = FeatureVector::from_values(&profile.sensor, &names, values, NaiveDateTime::default());
            let iso = classifier.classify(&fv).map(|c| c.is_outlier()).unwrap_or(false);
            let kalman = estimators.evaluate(profile, &fv)?.abnormal;

            let mut out = record.clone();
            out.push_field(verdict(iso));
            out.push_field(verdict(kalman));
            writer.write_record(&out).map_err(write_err)?;

            truth.push(record.get(label_idx).unwrap_or("").to_string());
            iso_preds.push(verdict(iso));
            kalman_preds.push(verdict(kalman));
        }
        writer
            .flush()
            .map_err(|e| DetectError::Transaction(format!("{}: {}", output.display(), e)))?;

        let report = EvaluationReport {
            training_samples,
            rows: truth.len(),
            isolation: Metrics::from_labels(&truth, &iso_preds),
            kalman: Metrics::from_labels(&truth, &kalman_preds),
            output: output.to_path_buf(),
        };
        log::info!(
            "Evaluation: {} rows, isolation acc={} kalman acc={}",
            report.rows,
            report.isolation.accuracy,
            report.kalman.accuracy
        );
        Ok(report)
    }
}
