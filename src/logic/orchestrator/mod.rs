//! Detection Orchestrator
//!
//! Runs one detection pass per sensor type: latest reading -> dedupe check ->
//! classifier + estimators -> ledger -> (sound only) alert latch and publish.
//!
//! Every pass returns a `PassOutcome`; failures never escape a pass, so a
//! bad reading for one sensor never stops the next one.


use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use crate::constants::{DEFAULT_SEED, TIMESTAMP_FORMAT};
use crate::logic::alert::{alert_messages, AlertChannel};
use crate::logic::error::{DetectError, DetectResult, Recovery};
use crate::logic::estimator::{EstimatorBank, EstimatorVerdict};
use crate::logic::features::FeatureVector;
use crate::logic::latch::AlertLatch;
use crate::logic::ledger::{AnomalyLedger, AnomalyRecord, DetectionMethod};
use crate::logic::model::{confirm, Classification, ClassifierState, OutlierClassifier};
use crate::logic::profile::{validate_profiles, ProfileSet, SensorProfile, SensorType, TrainingSelector};
use crate::logic::source::{CsvTrainingSource, ReadingSource, TrainingSource};

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Everything decided in one evaluated pass
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub pass_id: Uuid,
    pub sensor: SensorType,
    pub record_id: i64,
    pub subject_id: String,
    pub timestamp: NaiveDateTime,
    /// `None` when the classifier is untrained (estimator-only mode)
    pub classification: Option<Classification>,
    pub estimator: EstimatorVerdict,
    pub classifier_confirmed: bool,
    pub estimator_confirmed: bool,
    pub records_written: usize,
    pub alert_fired: bool,
}

impl DetectionResult {
    pub fn is_anomalous(&self) -> bool {
        self.classifier_confirmed || self.estimator_confirmed
    }
}

#[derive(Debug)]
pub enum PassOutcome {
    /// Latch already fired: nothing was read or written
    Suppressed,
    NoReading,
    /// Ledger already holds a record for this (timestamp, sensor)
    AlreadyRecorded { timestamp: NaiveDateTime },
    Evaluated(DetectionResult),
    Failed(DetectError),
}

impl PassOutcome {
    pub fn result(&self) -> Option<&DetectionResult> {
        match self {
            PassOutcome::Evaluated(result) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&DetectError> {
        match self {
            PassOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PassOutcome::Suppressed => "suppressed",
            PassOutcome::NoReading => "no_reading",
            PassOutcome::AlreadyRecorded { .. } => "already_recorded",
            PassOutcome::Evaluated(_) => "evaluated",
            PassOutcome::Failed(_) => "failed",
        }
    }
}

/// One pass per configured sensor, in profile order
#[derive(Debug, Default)]
pub struct CycleReport {
    pub passes: Vec<(SensorType, PassOutcome)>,
}

impl CycleReport {
    pub fn outcome(&self, sensor: &SensorType) -> Option<&PassOutcome> {
        self.passes.iter().find(|(s, _)| s == sensor).map(|(_, o)| o)
    }

    pub fn records_written(&self) -> usize {
        self.passes
            .iter()
            .filter_map(|(_, o)| o.result())
            .map(|r| r.records_written)
            .sum()
    }

    pub fn failures(&self) -> usize {
        self.passes.iter().filter(|(_, o)| o.error().is_some()).count()
    }

    pub fn alert_fired(&self) -> bool {
        self.passes
            .iter()
            .filter_map(|(_, o)| o.result())
            .any(|r| r.alert_fired)
    }
}

/// Classifier state per sensor after `train`
pub type TrainingReport = Vec<(SensorType, ClassifierState)>;

// ============================================================================
// ORCHESTRATOR
// ============================================================================

pub struct DetectionOrchestrator {
    profiles: ProfileSet,
    estimators: EstimatorBank,
    classifiers: HashMap<SensorType, OutlierClassifier>,
    latch: Arc<AlertLatch>,
    readings: Box<dyn ReadingSource>,
    ledger: Box<dyn AnomalyLedger>,
    channel: Box<dyn AlertChannel>,
    seed: u64,
}

impl DetectionOrchestrator {
    /// Validates the profiles and creates one estimator per (sensor, feature)
    pub fn new(
        profiles: ProfileSet,
        readings: Box<dyn ReadingSource>,
        ledger: Box<dyn AnomalyLedger>,
        channel: Box<dyn AlertChannel>,
        latch: Arc<AlertLatch>,
    ) -> DetectResult<Self> {
        validate_profiles(&profiles)?;
        let estimators = EstimatorBank::from_profiles(&profiles);
        log::info!(
            "Detection engine ready: {} sensor(s), {} estimator(s)",
            profiles.profiles.len(),
            estimators.len()
        );

        Ok(Self {
            profiles,
            estimators,
            classifiers: HashMap::new(),
            latch,
            readings,
            ledger,
            channel,
            seed: DEFAULT_SEED,
        })
    }

    /// Seed used for classifiers built by `train`
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }

    pub fn latch(&self) -> Arc<AlertLatch> {
        Arc::clone(&self.latch)
    }

    pub fn estimators(&self) -> &EstimatorBank {
        &self.estimators
    }

    pub fn classifier(&self, sensor: &SensorType) -> Option<&OutlierClassifier> {
        self.classifiers.get(sensor)
    }

    /// Install a pre-built classifier (custom `OutlierModel`, already fitted)
    pub fn set_classifier(&mut self, classifier: OutlierClassifier) {
        self.classifiers.insert(classifier.sensor().clone(), classifier);
    }

    // ------------------------------------------------------------------------
    // Training
    // ------------------------------------------------------------------------

    /// Fit one classifier per sensor
    ///
    /// Profiles selecting `Csv { path: None }` read from `default_source`.
    /// A training failure disables that sensor's classifier only.
    pub fn train(&mut self, default_source: &dyn TrainingSource) -> DetectResult<TrainingReport> {
        let mut report = Vec::new();

        for profile in &self.profiles.profiles {
            let mut classifier = OutlierClassifier::isolation_forest(profile, self.seed);
            let names = profile.feature_names();

            let loaded = match &profile.training {
                TrainingSelector::Disabled => Err(DetectError::training(
                    profile.sensor.as_str(),
                    "training disabled by profile",
                )),
                TrainingSelector::Csv { path: Some(path) } => {
                    CsvTrainingSource::new(path).load_labeled_samples(&profile.sensor, &names)
                }
                TrainingSelector::Csv { path: None } => {
                    default_source.load_labeled_samples(&profile.sensor, &names)
                }
            };

            let fitted = loaded.and_then(|samples| classifier.fit_labeled(profile, &samples));
            match fitted {
                Ok(n) => log::info!("[{}] {} trained on {} samples", profile.sensor, classifier.model_name(), n),
                Err(e) => match e.at_startup() {
                    Recovery::DisableClassifier => {
                        log::warn!("[{}] classifier disabled, estimator-only mode: {}", profile.sensor, e)
                    }
                    _ => return Err(e),
                },
            }

            report.push((profile.sensor.clone(), classifier.state().clone()));
            self.classifiers.insert(profile.sensor.clone(), classifier);
        }

        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Detection
    // ------------------------------------------------------------------------

    /// One pass for every configured sensor type
    pub fn run_cycle(&self) -> CycleReport {
        let passes = self
            .profiles
            .iter()
            .map(|profile| (profile.sensor.clone(), self.run_profile(profile)))
            .collect();
        CycleReport { passes }
    }

    /// One pass for a single sensor type
    pub fn run_pass(&self, sensor: &SensorType) -> PassOutcome {
        match self.profiles.get(sensor) {
            Some(profile) => self.run_profile(profile),
            None => PassOutcome::Failed(DetectError::Config(format!("no profile for sensor '{}'", sensor))),
        }
    }

    fn run_profile(&self, profile: &SensorProfile) -> PassOutcome {
        // Global suppression: a fired latch silences every sensor
        if self.latch.is_fired() {
            log::debug!("[{}] latch fired, pass suppressed", profile.sensor);
            return PassOutcome::Suppressed;
        }

        match self.evaluate(profile) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!(
                    "[{}] detection pass failed ({:?}): {}",
                    profile.sensor,
                    e.during_pass(),
                    e
                );
                PassOutcome::Failed(e)
            }
        }
    }

    fn evaluate(&self, profile: &SensorProfile) -> DetectResult<PassOutcome> {
        let sensor = &profile.sensor;
        let names = profile.feature_names();

        let Some(raw) = self.readings.get_latest(sensor, &names, &profile.table)? else {
            return Ok(PassOutcome::NoReading);
        };

        if self.ledger.exists(raw.timestamp, sensor)? {
            log::debug!("[{}] reading at {} already recorded", sensor, raw.timestamp);
            return Ok(PassOutcome::AlreadyRecorded {
                timestamp: raw.timestamp,
            });
        }

        let fv = FeatureVector::from_raw(sensor, &names, &raw)?;
        let pass_id = Uuid::new_v4();
        log::info!("[{}] pass {} reading at {}: {}", sensor, pass_id, fv.timestamp(), fv.to_log_entry());

        // Classifier (skipped entirely when untrained)
        let classification = self.classifiers.get(sensor).and_then(|c| c.classify(&fv));
        let classifier_confirmed = classification
            .as_ref()
            .map(|c| confirm(profile, &fv, c))
            .unwrap_or(false);

        // Estimators always run so their state tracks every reading
        let estimator = self.estimators.evaluate(profile, &fv)?;
        let estimator_confirmed = estimator.abnormal;

        let mut records = Vec::new();
        if classifier_confirmed {
            log::warn!("[ALERT] {} abnormal {}: {}", DetectionMethod::IsolationForest, sensor, fv.to_log_entry());
            records.push(AnomalyRecord::from_vector(&fv, DetectionMethod::IsolationForest));
        }
        if estimator_confirmed {
            let flagged: Vec<String> = estimator
                .abnormal_features()
                .iter()
                .map(|r| format!("{}={:.5} (residual={:.5})", r.feature, r.value, r.residual))
                .collect();
            log::warn!("[ALERT] {} abnormal {}: {}", DetectionMethod::KalmanFilter, sensor, flagged.join(", "));
            records.push(AnomalyRecord::from_vector(&fv, DetectionMethod::KalmanFilter));
        }

        // All-or-nothing; an error here leaves no record for this pass
        let records_written = self.ledger.append(&records)?;

        let mut alert_fired = false;
        if profile.fires_alert() && classifier_confirmed && estimator_confirmed {
            if self.latch.try_fire() {
                alert_fired = true;
                self.publish_alert(&fv);
            } else {
                log::info!("[{}] alarm already sent, waiting for manual reset", sensor);
            }
        }

        Ok(PassOutcome::Evaluated(DetectionResult {
            pass_id,
            sensor: sensor.clone(),
            record_id: fv.record_id(),
            subject_id: fv.subject_id().to_string(),
            timestamp: fv.timestamp(),
            classification,
            estimator,
            classifier_confirmed,
            estimator_confirmed,
            records_written,
            alert_fired,
        }))
    }

    /// At-most-once: the latch is already fired, failures are only logged
    fn publish_alert(&self, fv: &FeatureVector) {
        let timestamp = fv.timestamp().format(TIMESTAMP_FORMAT).to_string();
        let messages = match alert_messages(fv.subject_id(), &timestamp) {
            Ok(m) => m,
            Err(e) => {
                log::error!("Failed to build alert messages: {}", e);
                return;
            }
        };

        for (topic, payload) in messages {
            if let Err(e) = self.channel.publish(topic, &payload) {
                log::error!("Alert publish to '{}' failed (not retried): {}", topic, e);
            }
        }
    }
}
