//! Configurable per-domain module: threshold rules over snapshot signals plus a
//! lexicon pre-screen of pending observations for the domain.

use super::{DetectedThreat, ProtectionDomain, ProtectionModule, SystemSnapshot};
use crate::detectors::saturating_score;
use crate::error::EngineError;
use crate::features::{normalize_obfuscation, scan, AssessmentInput};
use crate::risk::ThreatType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRule {
    pub signal: String,
    pub above: f64,
    pub threat_type: ThreatType,
}

impl SignalRule {
    pub fn new(signal: &str, above: f64, threat_type: ThreatType) -> Self {
        Self {
            signal: signal.to_string(),
            above,
            threat_type,
        }
    }
}

pub struct SignalRuleModule {
    domain: ProtectionDomain,
    rules: Vec<SignalRule>,
    /// Observations pre-screening below this severity are dropped.
    candidate_floor: f64,
}

impl SignalRuleModule {
    pub fn new(domain: ProtectionDomain, rules: Vec<SignalRule>) -> Self {
        Self {
            domain,
            rules,
            candidate_floor: 0.2,
        }
    }

    pub fn with_candidate_floor(mut self, floor: f64) -> Self {
        self.candidate_floor = floor;
        self
    }

    fn screen(&self, obs: &AssessmentInput) -> Option<DetectedThreat> {
        let hits = scan(&normalize_obfuscation(&obs.searchable_text()));
        let mut severity = saturating_score(hits.total());
        let mut threat_type = hits.top().map(|(t, _)| t).or(obs.hint).unwrap_or(ThreatType::Unknown);
        for t in ThreatType::ALL {
            if let Some(s) = obs.upstream_score(t) {
                if s > severity {
                    severity = s;
                    threat_type = t;
                }
            }
        }
        if obs.hint.is_some() {
            severity = severity.max(0.3);
        }
        if severity < self.candidate_floor {
            return None;
        }
        Some(DetectedThreat::new(self.domain, threat_type, severity, obs.clone()))
    }
}

#[async_trait]
impl ProtectionModule for SignalRuleModule {
    fn domain(&self) -> ProtectionDomain {
        self.domain
    }

    async fn scan_for_threats(&self, snapshot: &SystemSnapshot) -> Result<Vec<DetectedThreat>, EngineError> {
        let mut out = Vec::new();
        for rule in &self.rules {
            let Some(value) = snapshot.signal(&rule.signal) else {
                continue;
            };
            if value > rule.above {
                let input = AssessmentInput::new(self.domain)
                    .with_signal(rule.signal.clone(), value)
                    .with_signal(format!("threat.{}", rule.threat_type.as_str()), value)
                    .with_hint(rule.threat_type);
                out.push(DetectedThreat::new(self.domain, rule.threat_type, value, input));
            }
        }
        for obs in snapshot.observations.iter().filter(|o| o.domain == self.domain) {
            if let Some(t) = self.screen(obs) {
                out.push(t);
            }
        }
        Ok(out)
    }
}

/// One module per protection domain with the standard signal rules.
/// Signals are normalised to [0, 1] by the platform layer.
pub fn default_modules() -> Vec<SignalRuleModule> {
    use ProtectionDomain::*;
    use ThreatType::*;
    ProtectionDomain::ALL
        .iter()
        .map(|d| {
            let rules = match d {
                Network => vec![
                    SignalRule::new("network.unknown_hosts_ratio", 0.5, Malware),
                    SignalRule::new("network.tls_downgrade", 0.0, QuantumAttack),
                ],
                Apps => vec![SignalRule::new("apps.unverified_installs", 0.0, Malware)],
                Data => vec![SignalRule::new("data.exfiltration_ratio", 0.3, PrivacyViolation)],
                Communication => vec![SignalRule::new("communication.unknown_sender_ratio", 0.6, Phishing)],
                Identity => vec![SignalRule::new("identity.credential_exposure", 0.0, Phishing)],
                Content => vec![SignalRule::new("content.restricted_ratio", 0.2, InappropriateContent)],
                Location => vec![SignalRule::new("location.shared_with_unknown", 0.0, PrivacyViolation)],
                Financial => vec![SignalRule::new("financial.anomalous_payment", 0.5, FinancialFraud)],
                Social => vec![SignalRule::new("social.hostile_message_rate", 0.4, Cyberbullying)],
                Health => vec![SignalRule::new("health.data_shared", 0.5, PrivacyViolation)],
            };
            SignalRuleModule::new(*d, rules)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_above_threshold_surfaces_threat() {
        let m = SignalRuleModule::new(
            ProtectionDomain::Financial,
            vec![SignalRule::new("financial.anomalous_payment", 0.5, ThreatType::FinancialFraud)],
        );
        let mut snap = SystemSnapshot::empty();
        snap.signals.insert("financial.anomalous_payment".into(), 0.8);
        let found = m.scan_for_threats(&snap).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].threat_type, ThreatType::FinancialFraud);
        assert_eq!(found[0].severity, 0.8);
        assert_eq!(found[0].input.upstream_score(ThreatType::FinancialFraud), Some(0.8));

        snap.signals.insert("financial.anomalous_payment".into(), 0.4);
        assert!(m.scan_for_threats(&snap).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn observations_screened_per_domain() {
        let m = SignalRuleModule::new(ProtectionDomain::Communication, Vec::new());
        let mut snap = SystemSnapshot::empty();
        snap.observations.push(AssessmentInput::text(
            ProtectionDomain::Communication,
            "You have won! Claim your prize with a gift card",
        ));
        snap.observations.push(AssessmentInput::text(ProtectionDomain::Communication, "lunch?"));
        snap.observations.push(AssessmentInput::text(ProtectionDomain::Social, "claim your prize"));
        let found = m.scan_for_threats(&snap).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].threat_type, ThreatType::Scam);
        assert!(found[0].severity > 0.8);
    }

    #[test]
    fn default_modules_one_per_domain() {
        let mods = default_modules();
        assert_eq!(mods.len(), 10);
        for (m, d) in mods.iter().zip(ProtectionDomain::ALL) {
            assert_eq!(m.domain(), d);
            assert!(!m.rules.is_empty());
        }
    }
}
