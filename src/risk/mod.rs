//! Threat assessment types, ensemble voting and age-policy filtering.

mod ensemble;
mod filter;

pub use ensemble::{vote, EnsembleVote};
pub use filter::{apply_policy, is_consistent};

use serde::{Deserialize, Serialize};

/// Closed set of threat categories a detector may classify an input into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatType {
    Malware,
    Phishing,
    Scam,
    Cyberbullying,
    InappropriateContent,
    PrivacyViolation,
    SocialEngineering,
    FinancialFraud,
    QuantumAttack,
    Unknown,
}

impl ThreatType {
    pub const ALL: [ThreatType; 10] = [
        ThreatType::Malware,
        ThreatType::Phishing,
        ThreatType::Scam,
        ThreatType::Cyberbullying,
        ThreatType::InappropriateContent,
        ThreatType::PrivacyViolation,
        ThreatType::SocialEngineering,
        ThreatType::FinancialFraud,
        ThreatType::QuantumAttack,
        ThreatType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatType::Malware => "malware",
            ThreatType::Phishing => "phishing",
            ThreatType::Scam => "scam",
            ThreatType::Cyberbullying => "cyberbullying",
            ThreatType::InappropriateContent => "inappropriate_content",
            ThreatType::PrivacyViolation => "privacy_violation",
            ThreatType::SocialEngineering => "social_engineering",
            ThreatType::FinancialFraud => "financial_fraud",
            ThreatType::QuantumAttack => "quantum_attack",
            ThreatType::Unknown => "unknown",
        }
    }
}

/// What the caller should do with the assessed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Allow,
    Monitor,
    Warn,
    Block,
    BlockAndEducate,
    WarnAndEducate,
    EducateAndAllow,
    BlockAndAlert,
}

impl Recommendation {
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            Recommendation::Block | Recommendation::BlockAndEducate | Recommendation::BlockAndAlert
        )
    }

    pub fn is_educational(&self) -> bool {
        matches!(
            self,
            Recommendation::BlockAndEducate
                | Recommendation::WarnAndEducate
                | Recommendation::EducateAndAllow
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Allow => "allow",
            Recommendation::Monitor => "monitor",
            Recommendation::Warn => "warn",
            Recommendation::Block => "block",
            Recommendation::BlockAndEducate => "block_and_educate",
            Recommendation::WarnAndEducate => "warn_and_educate",
            Recommendation::EducateAndAllow => "educate_and_allow",
            Recommendation::BlockAndAlert => "block_and_alert",
        }
    }
}

/// Age-specific annotations attached by the threat filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    pub parental_notification: bool,
    pub family_notification: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simplified_explanation: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub guidance_steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub educational_content: Option<String>,
}

/// Fused, policy-adjusted verdict for one input. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatAssessment {
    pub threat_level: f64,
    pub confidence: f64,
    pub threat_type: ThreatType,
    pub recommendation: Recommendation,
    /// How hard the input is for a non-expert to judge (0-1); drives step guidance.
    pub complexity: f64,
    #[serde(default)]
    pub annotations: Annotations,
}

impl ThreatAssessment {
    pub fn new(threat_level: f64, confidence: f64, threat_type: ThreatType) -> Self {
        Self {
            threat_level: clamp_unit(threat_level),
            confidence: clamp_unit(confidence),
            threat_type,
            recommendation: Recommendation::Monitor,
            complexity: 0.0,
            annotations: Annotations::default(),
        }
    }

    /// Safe default used when no detector produced a result.
    pub fn degraded() -> Self {
        Self::new(0.0, 0.0, ThreatType::Unknown)
    }

    pub fn with_complexity(mut self, complexity: f64) -> Self {
        self.complexity = clamp_unit(complexity);
        self
    }
}

/// Clamp to [0, 1], mapping NaN to 0.
pub(crate) fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clamps_values() {
        let a = ThreatAssessment::new(1.7, -0.2, ThreatType::Scam);
        assert_eq!(a.threat_level, 1.0);
        assert_eq!(a.confidence, 0.0);
        let n = ThreatAssessment::new(f64::NAN, 0.5, ThreatType::Scam);
        assert_eq!(n.threat_level, 0.0);
    }

    #[test]
    fn degraded_is_monitor_zero() {
        let a = ThreatAssessment::degraded();
        assert_eq!(a.recommendation, Recommendation::Monitor);
        assert_eq!(a.threat_level, 0.0);
        assert_eq!(a.confidence, 0.0);
    }

    #[test]
    fn recommendation_serializes_snake_case() {
        let s = serde_json::to_string(&Recommendation::BlockAndAlert).unwrap();
        assert_eq!(s, "\"block_and_alert\"");
        let t: ThreatType = serde_json::from_str("\"financial_fraud\"").unwrap();
        assert_eq!(t, ThreatType::FinancialFraud);
    }
}
