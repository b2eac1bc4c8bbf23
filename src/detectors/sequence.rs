//! Temporal detector: bursts and escalating trends in the subject's activity series.

use super::{Detector, DetectorError, DetectorResult};
use crate::features::{scan, AssessmentInput, FeatureExtractor, SequenceStats};
use crate::policy::DetectorRole;
use crate::risk::ThreatType;
use async_trait::async_trait;

/// Series shorter than this give no temporal evidence.
const MIN_SERIES: usize = 3;

pub struct SequenceDetector {
    id: String,
    extractor: FeatureExtractor,
    /// z-score at which a burst starts to count.
    burst_floor: f32,
}

impl Default for SequenceDetector {
    fn default() -> Self {
        Self {
            id: "sequence".to_string(),
            extractor: FeatureExtractor::default(),
            burst_floor: 2.0,
        }
    }
}

impl SequenceDetector {
    fn classify(&self, input: &AssessmentInput) -> ThreatType {
        if let Some(h) = input.hint {
            return h;
        }
        match scan(&input.searchable_text()).top() {
            Some((t, _)) => t,
            None => ThreatType::Unknown,
        }
    }
}

#[async_trait]
impl Detector for SequenceDetector {
    fn id(&self) -> &str {
        &self.id
    }

    fn role(&self) -> DetectorRole {
        DetectorRole::Temporal
    }

    async fn assess(&self, input: &AssessmentInput) -> Result<DetectorResult, DetectorError> {
        let stats = SequenceStats::from_series(&input.sequence);
        if stats.len < MIN_SERIES {
            return Err(DetectorError::InvalidInput(format!(
                "activity series of {} points, need {}",
                stats.len, MIN_SERIES
            )));
        }
        let features = self.extractor.extract(input).values;

        let burst = ((stats.burst_z - self.burst_floor) / 6.0).clamp(0.0, 1.0) as f64;
        let trend = (stats.trend.max(0.0) * 0.8).min(1.0) as f64;
        let threat_score = burst.max(trend);
        let confidence = 0.5 + 0.45 * (stats.len.min(20) as f64 / 20.0);

        Ok(DetectorResult {
            detector: self.id.clone(),
            confidence,
            threat_score,
            threat_type: if threat_score > 0.0 {
                self.classify(input)
            } else {
                ThreatType::Unknown
            },
            features,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protection::ProtectionDomain;

    #[tokio::test]
    async fn short_series_abstains() {
        let d = SequenceDetector::default();
        let r = d
            .assess(&AssessmentInput::text(ProtectionDomain::Social, "hi").with_sequence(vec![1.0]))
            .await;
        assert!(matches!(r, Err(DetectorError::InvalidInput(_))));
        let r = d.assess(&AssessmentInput::new(ProtectionDomain::Network)).await;
        assert!(matches!(r, Err(DetectorError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn burst_with_hint_scores_high() {
        let d = SequenceDetector::default();
        let input = AssessmentInput::text(ProtectionDomain::Social, "hey")
            .with_sequence(vec![1.0, 1.0, 2.0, 1.0, 1.0, 1.0, 2.0, 1.0, 30.0])
            .with_hint(ThreatType::Cyberbullying);
        let r = d.assess(&input).await.unwrap();
        assert!(r.threat_score > 0.9, "{:?}", r.threat_score);
        assert_eq!(r.threat_type, ThreatType::Cyberbullying);
        assert!(r.confidence > 0.6);
    }

    #[tokio::test]
    async fn flat_series_scores_zero() {
        let d = SequenceDetector::default();
        let input = AssessmentInput::new(ProtectionDomain::Network).with_sequence(vec![3.0; 10]);
        let r = d.assess(&input).await.unwrap();
        assert_eq!(r.threat_score, 0.0);
        assert_eq!(r.threat_type, ThreatType::Unknown);
    }
}
