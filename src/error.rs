//! Error taxonomy. Assessment-path errors are absorbed and degrade to a safe default;
//! only construction, storage and config errors are returned to callers.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// One or more detectors failed; recovered by weight redistribution.
    #[error("detector unavailable: {detector}: {reason}")]
    DetectorUnavailable { detector: String, reason: String },

    /// Every detector failed; surfaced as a zero-confidence `monitor` assessment.
    #[error("assessment degraded: all {failed} detectors failed")]
    AssessmentDegraded { failed: usize },

    /// Federated or on-device learning submission failed; dropped, never retried.
    #[error("learning submission failed: {0}")]
    LearningSubmissionFailed(String),

    /// A scan tick was still running when the next one was due; the new tick was skipped.
    #[error("schedule overrun: tick skipped while previous tick in flight")]
    ScheduleOverrun,

    #[error("policy error: {0}")]
    Policy(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Storage(format!("serialization: {}", e))
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Transport(e.to_string())
    }
}

impl EngineError {
    /// True for errors the engine absorbs locally instead of returning.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::DetectorUnavailable { .. }
                | EngineError::AssessmentDegraded { .. }
                | EngineError::LearningSubmissionFailed(_)
                | EngineError::ScheduleOverrun
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_is_recoverable() {
        assert!(EngineError::ScheduleOverrun.is_recoverable());
        assert!(EngineError::AssessmentDegraded { failed: 3 }.is_recoverable());
        assert!(!EngineError::Config("bad".into()).is_recoverable());
    }

    #[test]
    fn display_names_detector() {
        let e = EngineError::DetectorUnavailable {
            detector: "lexicon".into(),
            reason: "timed out".into(),
        };
        assert_eq!(e.to_string(), "detector unavailable: lexicon: timed out");
    }
}
