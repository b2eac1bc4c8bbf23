//! Detector capability: the uniform contract every detection model satisfies,
//! plus the registry that fans one input out to all registered detectors.

mod evasion;
mod lexicon;
mod sequence;

pub use evasion::EvasionDetector;
pub use lexicon::LexiconDetector;
pub use sequence::SequenceDetector;

use crate::error::EngineError;
use crate::features::AssessmentInput;
use crate::policy::DetectorRole;
use crate::risk::ThreatType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Output of one detector invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorResult {
    pub detector: String,
    /// How sure the detector is of its own verdict (0-1).
    pub confidence: f64,
    /// The detector's threat contribution (0-1) fed to the weighted sum.
    pub threat_score: f64,
    pub threat_type: ThreatType,
    pub features: Vec<f32>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

impl DetectorError {
    pub fn into_engine_error(self, detector: &str) -> EngineError {
        EngineError::DetectorUnavailable {
            detector: detector.to_string(),
            reason: self.to_string(),
        }
    }
}

/// A pluggable detection model. Implementations must not keep mutable state between calls.
///
/// Return `DetectorError::InvalidInput` when the input carries no evidence the detector
/// can read; the voter then redistributes its weight like any other failure.
#[async_trait]
pub trait Detector: Send + Sync {
    fn id(&self) -> &str;

    fn role(&self) -> DetectorRole;

    async fn assess(&self, input: &AssessmentInput) -> Result<DetectorResult, DetectorError>;
}

/// One detector's result (or failure) for a single assessment.
#[derive(Debug, Clone)]
pub struct DetectorOutcome {
    pub detector: String,
    pub role: DetectorRole,
    pub result: Result<DetectorResult, DetectorError>,
}

#[derive(Clone, Default)]
pub struct DetectorRegistry {
    detectors: Vec<Arc<dyn Detector>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the three built-in heuristic detectors.
    pub fn builtin() -> Self {
        let mut r = Self::new();
        r.register(Arc::new(SequenceDetector::default()));
        r.register(Arc::new(LexiconDetector::default()));
        r.register(Arc::new(EvasionDetector::default()));
        r
    }

    pub fn register(&mut self, detector: Arc<dyn Detector>) {
        self.detectors.push(detector);
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Roles in registration order; aligned with the weight vector handed to the voter.
    pub fn roles(&self) -> Vec<DetectorRole> {
        self.detectors.iter().map(|d| d.role()).collect()
    }

    /// Run every detector concurrently. A detector that has not answered by the shared
    /// deadline is reported as timed out; its task keeps running and its late result is
    /// discarded.
    pub async fn run_all(&self, input: Arc<AssessmentInput>, timeout: Duration) -> Vec<DetectorOutcome> {
        let deadline = tokio::time::Instant::now() + timeout;
        let handles: Vec<_> = self
            .detectors
            .iter()
            .map(|d| {
                let d = Arc::clone(d);
                let input = Arc::clone(&input);
                tokio::spawn(async move { d.assess(&input).await })
            })
            .collect();

        let mut out = Vec::with_capacity(handles.len());
        for (d, handle) in self.detectors.iter().zip(handles) {
            let result = match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(r)) => r,
                Ok(Err(join)) => Err(DetectorError::Unavailable(format!("task failed: {}", join))),
                Err(_) => Err(DetectorError::TimedOut(timeout)),
            };
            match &result {
                Err(DetectorError::InvalidInput(reason)) => {
                    debug!(detector = d.id(), input_id = %input.id, reason = %reason, "detector abstained");
                }
                Err(e) => warn!(detector = d.id(), input_id = %input.id, error = %e, "detector unavailable"),
                Ok(_) => {}
            }
            out.push(DetectorOutcome {
                detector: d.id().to_string(),
                role: d.role(),
                result,
            });
        }
        out
    }
}

/// Map a hit count onto (0, 1): 1 hit = 0.5, 2 = 0.75, 3 = 0.875 ...
pub(crate) fn saturating_score(hits: usize) -> f64 {
    1.0 - 0.5f64.powi(hits.min(16) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protection::ProtectionDomain;

    struct Slow;

    #[async_trait]
    impl Detector for Slow {
        fn id(&self) -> &str {
            "slow"
        }
        fn role(&self) -> DetectorRole {
            DetectorRole::Temporal
        }
        async fn assess(&self, _input: &AssessmentInput) -> Result<DetectorResult, DetectorError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(DetectorError::Unavailable("never".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_detector_times_out() {
        let mut r = DetectorRegistry::new();
        r.register(Arc::new(Slow));
        r.register(Arc::new(LexiconDetector::default()));
        let input = Arc::new(AssessmentInput::text(ProtectionDomain::Communication, "hello"));
        let out = r.run_all(input, Duration::from_millis(100)).await;
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0].result, Err(DetectorError::TimedOut(_))));
        assert!(out[1].result.is_ok());
    }

    #[tokio::test]
    async fn builtin_abstains_without_text_or_series() {
        let r = DetectorRegistry::builtin();
        let input = Arc::new(
            AssessmentInput::new(ProtectionDomain::Network).with_signal("threat.quantum_attack", 1.0),
        );
        let out = r.run_all(input, Duration::from_millis(250)).await;
        assert!(matches!(out[0].result, Err(DetectorError::InvalidInput(_))));
        assert_eq!(out[1].result.as_ref().unwrap().threat_score, 1.0);
        assert!(matches!(out[2].result, Err(DetectorError::InvalidInput(_))));
    }

    #[test]
    fn builtin_covers_three_roles() {
        let r = DetectorRegistry::builtin();
        assert_eq!(
            r.roles(),
            vec![DetectorRole::Temporal, DetectorRole::Static, DetectorRole::Resilience]
        );
    }

    #[test]
    fn saturating_score_steps() {
        assert_eq!(saturating_score(0), 0.0);
        assert_eq!(saturating_score(1), 0.5);
        assert_eq!(saturating_score(2), 0.75);
    }
}
