//! CSV training data
//!
//! One file can hold rows for several sensors: a `label` column plus the
//! feature columns. Rows whose requested features are empty or non-numeric
//! belong to another sensor and are skipped.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use super::TrainingSource;
use crate::logic::error::{DetectError, DetectResult};
use crate::logic::model::LabeledSample;
use crate::logic::profile::SensorType;

pub const LABEL_COLUMN: &str = "label";

#[derive(Debug, Clone)]
pub struct CsvTrainingSource {
    path: PathBuf,
}

impl CsvTrainingSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read labeled rows for the given feature columns from a CSV file
pub fn read_labeled_csv(path: &Path, sensor: &str, features: &[String]) -> DetectResult<Vec<LabeledSample>> {
    let file = File::open(path)
        .map_err(|e| DetectError::training(sensor, format!("{}: {}", path.display(), e)))?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    let headers = reader
        .headers()
        .map_err(|e| DetectError::training(sensor, format!("failed to read headers: {}", e)))?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| DetectError::training(sensor, format!("column '{}' not found in {}", name, path.display())))
    };

    let label_idx = column(LABEL_COLUMN)?;
    let feature_idx = features
        .iter()
        .map(|f| column(f.as_str()))
        .collect::<DetectResult<Vec<usize>>>()?;

    let mut samples = Vec::new();
    let mut skipped = 0usize;
    for result in reader.records() {
        let record = result.map_err(|e| DetectError::training(sensor, format!("bad CSV row: {}", e)))?;

        let values: Option<Vec<f64>> = feature_idx
            .iter()
            .map(|&i| record.get(i).and_then(|v| v.trim().parse::<f64>().ok()))
            .map(|v| v.filter(|x| x.is_finite()))
            .collect();

        match (record.get(label_idx), values) {
            (Some(label), Some(values)) => samples.push(LabeledSample::new(label, values)),
            _ => skipped += 1,
        }
    }

    log::debug!(
        "[{}] {} labeled rows from {} ({} skipped)",
        sensor,
        samples.len(),
        path.display(),
        skipped
    );
    Ok(samples)
}

impl TrainingSource for CsvTrainingSource {
    fn load_labeled_samples(&self, sensor: &SensorType, features: &[String]) -> DetectResult<Vec<LabeledSample>> {
        read_labeled_csv(&self.path, sensor.as_str(), features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_reads_rows_for_requested_features() {
        let file = write_csv(
            "label,light_level,rms,zcr\n\
             normal,,0.02,0.015\n\
             abnormal,,0.09,0.05\n\
             normal,11.5,,\n",
        );
        let source = CsvTrainingSource::new(file.path());

        let sound = source
            .load_labeled_samples(&SensorType::sound(), &["rms".into(), "zcr".into()])
            .unwrap();
        assert_eq!(sound.len(), 2);
        assert!(sound[0].is_normal());
        assert_eq!(sound[1].values, vec![0.09, 0.05]);

        let light = source
            .load_labeled_samples(&SensorType::light(), &["light_level".into()])
            .unwrap();
        assert_eq!(light, vec![LabeledSample::normal(vec![11.5])]);
    }

    #[test]
    fn test_missing_column_is_training_error() {
        let file = write_csv("label,rms\nnormal,0.02\n");
        let source = CsvTrainingSource::new(file.path());
        let result = source.load_labeled_samples(&SensorType::sound(), &["rms".into(), "zcr".into()]);
        assert!(matches!(result, Err(DetectError::Training { .. })));
    }

    #[test]
    fn test_missing_file_is_training_error() {
        let source = CsvTrainingSource::new("/nonexistent/trainingData.csv");
        let result = source.load_labeled_samples(&SensorType::light(), &["light_level".into()]);
        assert!(matches!(result, Err(DetectError::Training { .. })));
    }
}
