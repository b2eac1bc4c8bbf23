//! Static classification detector: keyword lexicon, URL heuristics and upstream scores.

use super::{saturating_score, Detector, DetectorError, DetectorResult};
use crate::features::{is_ip_literal, scan, url_host, AssessmentInput, FeatureExtractor};
use crate::policy::DetectorRole;
use crate::risk::ThreatType;
use async_trait::async_trait;

pub struct LexiconDetector {
    id: String,
    extractor: FeatureExtractor,
}

impl Default for LexiconDetector {
    fn default() -> Self {
        Self {
            id: "lexicon".to_string(),
            extractor: FeatureExtractor::default(),
        }
    }
}

fn url_risk(url: &str) -> f64 {
    if url.is_empty() {
        return 0.0;
    }
    let host = url_host(url);
    let mut r: f64 = 0.0;
    if is_ip_literal(host) {
        r += 0.3;
    }
    if url.contains('@') {
        r += 0.2;
    }
    if host.matches('.').count() > 3 {
        r += 0.1;
    }
    r.min(1.0)
}

#[async_trait]
impl Detector for LexiconDetector {
    fn id(&self) -> &str {
        &self.id
    }

    fn role(&self) -> DetectorRole {
        DetectorRole::Static
    }

    async fn assess(&self, input: &AssessmentInput) -> Result<DetectorResult, DetectorError> {
        let features = self.extractor.extract(input).values;
        let hits = scan(&input.searchable_text());
        let url = url_risk(input.url.as_deref().unwrap_or(""));

        let (mut threat_type, count) = hits.top().unwrap_or((ThreatType::Unknown, 0));
        let mut threat_score = saturating_score(count);
        if url > 0.0 {
            if threat_type == ThreatType::Unknown {
                threat_type = ThreatType::Phishing;
            }
            threat_score = (threat_score + url).min(1.0);
        }

        // Upstream module scores win when they exceed the lexicon's own evidence.
        for t in ThreatType::ALL {
            if let Some(s) = input.upstream_score(t) {
                let s = s.clamp(0.0, 1.0);
                if s > threat_score {
                    threat_score = s;
                    threat_type = t;
                }
            }
        }
        if threat_type == ThreatType::Unknown {
            if let Some(h) = input.hint {
                threat_type = h;
            }
        }

        let confidence = if count == 0 && url == 0.0 {
            0.7
        } else {
            (0.6 + 0.1 * count as f64 + url * 0.2).min(0.95)
        };

        Ok(DetectorResult {
            detector: self.id.clone(),
            confidence,
            threat_score,
            threat_type,
            features,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protection::ProtectionDomain;

    #[tokio::test]
    async fn clean_message_scores_zero() {
        let d = LexiconDetector::default();
        let r = d
            .assess(&AssessmentInput::text(ProtectionDomain::Communication, "dinner at six?"))
            .await
            .unwrap();
        assert_eq!(r.threat_score, 0.0);
        assert_eq!(r.threat_type, ThreatType::Unknown);
        assert_eq!(r.confidence, 0.7);
    }

    #[tokio::test]
    async fn fraud_keywords_classified() {
        let d = LexiconDetector::default();
        let input = AssessmentInput::text(
            ProtectionDomain::Financial,
            "Send a wire transfer to this bank account for a guaranteed return",
        );
        let r = d.assess(&input).await.unwrap();
        assert_eq!(r.threat_type, ThreatType::FinancialFraud);
        assert!((r.threat_score - 0.875).abs() < 1e-9);
        assert!((r.confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn suspicious_url_defaults_to_phishing() {
        let d = LexiconDetector::default();
        let input = AssessmentInput::new(ProtectionDomain::Network).with_url("http://admin@192.0.2.44/login");
        let r = d.assess(&input).await.unwrap();
        assert_eq!(r.threat_type, ThreatType::Phishing);
        assert!((r.threat_score - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn upstream_score_overrides_weaker_evidence() {
        let d = LexiconDetector::default();
        let input = AssessmentInput::new(ProtectionDomain::Apps).with_signal("threat.malware", 0.95);
        let r = d.assess(&input).await.unwrap();
        assert_eq!(r.threat_type, ThreatType::Malware);
        assert_eq!(r.threat_score, 0.95);
    }
}
