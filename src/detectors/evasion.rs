//! Resilience detector: scores inputs whose threat keywords only appear once
//! obfuscation (leetspeak, zero-width characters, separator padding) is undone.

use super::{Detector, DetectorError, DetectorResult};
use crate::features::{normalize_obfuscation, scan, AssessmentInput, FeatureExtractor};
use crate::policy::DetectorRole;
use crate::risk::ThreatType;
use async_trait::async_trait;

pub struct EvasionDetector {
    id: String,
    extractor: FeatureExtractor,
}

impl Default for EvasionDetector {
    fn default() -> Self {
        Self {
            id: "evasion".to_string(),
            extractor: FeatureExtractor::default(),
        }
    }
}

#[async_trait]
impl Detector for EvasionDetector {
    fn id(&self) -> &str {
        &self.id
    }

    fn role(&self) -> DetectorRole {
        DetectorRole::Resilience
    }

    async fn assess(&self, input: &AssessmentInput) -> Result<DetectorResult, DetectorError> {
        let text = input.content.as_deref().unwrap_or("");
        if text.trim().is_empty() {
            return Err(DetectorError::InvalidInput("no text content".into()));
        }
        let features = self.extractor.extract(input).values;

        let raw = scan(text);
        let normalized = scan(&normalize_obfuscation(text));
        let hidden = normalized.total().saturating_sub(raw.total());
        let zero_width = text
            .chars()
            .any(|c| matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}'));

        let mut threat_score: f64 = 0.0;
        if hidden > 0 {
            threat_score = 0.5 + 0.2 * hidden as f64;
        }
        if zero_width {
            threat_score += 0.2;
        }
        let threat_score = threat_score.min(1.0);
        let threat_type = if threat_score > 0.0 {
            normalized.top().map(|(t, _)| t).unwrap_or(ThreatType::Unknown)
        } else {
            ThreatType::Unknown
        };

        Ok(DetectorResult {
            detector: self.id.clone(),
            confidence: if hidden > 0 { 0.85 } else { 0.6 },
            threat_score,
            threat_type,
            features,
        })
    }
}
