//! Engine error taxonomy
//!
//! Every collaborator failure is mapped into one of these variants so the
//! orchestrator can apply the fatal-vs-recoverable table without inspecting
//! the underlying driver error.

use serde::Serialize;

pub type DetectResult<T> = Result<T, DetectError>;

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// Ledger, reading store or alert bus unreachable
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// Not enough usable training samples
    #[error("training error for '{sensor}': {reason}")]
    Training { sensor: String, reason: String },

    /// Non-numeric or missing feature value
    #[error("data error on feature '{feature}': {reason}")]
    Data { feature: String, reason: String },

    /// Ledger write failed (batch rolled back)
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Invalid profile or engine configuration
    #[error("configuration error: {0}")]
    Config(String),
}

/// What the engine does with an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Recovery {
    /// Stop the process
    Fatal,
    /// Log and skip the current pass
    SkipPass,
    /// Roll back the pass and skip it
    RollbackPass,
    /// Disable the classifier, keep estimator-only detection
    DisableClassifier,
}

impl DetectError {
    pub fn data(feature: impl Into<String>, reason: impl Into<String>) -> Self {
        DetectError::Data {
            feature: feature.into(),
            reason: reason.into(),
        }
    }

    pub fn training(sensor: impl Into<String>, reason: impl Into<String>) -> Self {
        DetectError::Training {
            sensor: sensor.into(),
            reason: reason.into(),
        }
    }

    /// Recovery policy while starting up (connect, schema, training)
    pub fn at_startup(&self) -> Recovery {
        match self {
            DetectError::Training { .. } => Recovery::DisableClassifier,
            DetectError::Data { .. } => Recovery::SkipPass,
            DetectError::Connectivity(_)
            | DetectError::Transaction(_)
            | DetectError::Config(_) => Recovery::Fatal,
        }
    }

    /// Recovery policy inside a detection pass
    pub fn during_pass(&self) -> Recovery {
        match self {
            DetectError::Transaction(_) => Recovery::RollbackPass,
            DetectError::Training { .. } => Recovery::DisableClassifier,
            DetectError::Connectivity(_)
            | DetectError::Data { .. }
            | DetectError::Config(_) => Recovery::SkipPass,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DetectError::Connectivity(_) => "connectivity",
            DetectError::Training { .. } => "training",
            DetectError::Data { .. } => "data",
            DetectError::Transaction(_) => "transaction",
            DetectError::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_table() {
        let conn = DetectError::Connectivity("refused".into());
        assert_eq!(conn.at_startup(), Recovery::Fatal);
        assert_eq!(conn.during_pass(), Recovery::SkipPass);

        let train = DetectError::training("sound", "2 samples");
        assert_eq!(train.at_startup(), Recovery::DisableClassifier);

        let data = DetectError::data("rms", "not a number");
        assert_eq!(data.during_pass(), Recovery::SkipPass);

        let tx = DetectError::Transaction("constraint".into());
        assert_eq!(tx.during_pass(), Recovery::RollbackPass);
    }

    #[test]
    fn test_display() {
        let err = DetectError::data("zcr", "missing");
        assert_eq!(err.to_string(), "data error on feature 'zcr': missing");
        assert_eq!(err.kind(), "data");
    }
}
