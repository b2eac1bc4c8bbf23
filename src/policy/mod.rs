//! Age policy store: one static policy record per age group.
//!
//! The threat filter is a single generic function over [`AgePolicy`]; everything that
//! differs between age groups lives in the table built by [`PolicyTable::standard`].

use crate::error::{EngineError, Result};
use crate::risk::{Recommendation, ThreatType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeGroup {
    Child,
    Teen,
    YoungAdult,
    Adult,
    Senior,
}

impl AgeGroup {
    pub const ALL: [AgeGroup; 5] = [
        AgeGroup::Child,
        AgeGroup::Teen,
        AgeGroup::YoungAdult,
        AgeGroup::Adult,
        AgeGroup::Senior,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeGroup::Child => "child",
            AgeGroup::Teen => "teen",
            AgeGroup::YoungAdult => "young_adult",
            AgeGroup::Adult => "adult",
            AgeGroup::Senior => "senior",
        }
    }
}

/// Detector role expected by the ensemble. Weights are assigned per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorRole {
    /// Temporal / sequential-pattern detector.
    Temporal,
    /// Static classification detector.
    Static,
    /// Resilience / robustness detector.
    Resilience,
}

/// Ordered (temporal, static, resilience) weights. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub temporal: f64,
    pub static_: f64,
    pub resilience: f64,
}

pub const WEIGHT_TOLERANCE: f64 = 1e-6;

impl EnsembleWeights {
    pub const fn new(temporal: f64, static_: f64, resilience: f64) -> Self {
        Self {
            temporal,
            static_,
            resilience,
        }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.temporal, self.static_, self.resilience]
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }

    pub fn weight_for(&self, role: DetectorRole) -> f64 {
        match role {
            DetectorRole::Temporal => self.temporal,
            DetectorRole::Static => self.static_,
            DetectorRole::Resilience => self.resilience,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.as_array().iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(EngineError::Policy(format!("invalid weights {:?}", self)));
        }
        if (self.sum() - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(EngineError::Policy(format!(
                "weights sum to {} (expected 1.0)",
                self.sum()
            )));
        }
        Ok(())
    }

    /// Expand role weights into one weight per registered detector, in registry order.
    ///
    /// Detectors sharing a role split that role's weight evenly; weight of roles with no
    /// registered detector is redistributed proportionally, so the result sums to 1.0.
    pub fn per_detector(&self, roles: &[DetectorRole]) -> Vec<f64> {
        if roles.is_empty() {
            return Vec::new();
        }
        let mut counts: BTreeMap<DetectorRole, usize> = BTreeMap::new();
        for r in roles {
            *counts.entry(*r).or_insert(0) += 1;
        }
        let raw: Vec<f64> = roles
            .iter()
            .map(|r| self.weight_for(*r) / counts[r] as f64)
            .collect();
        let total: f64 = raw.iter().sum();
        if total <= 0.0 {
            return vec![1.0 / roles.len() as f64; roles.len()];
        }
        raw.iter().map(|w| w / total).collect()
    }
}

/// Privacy configuration derived deterministically from an age group.
/// Replaced wholesale on age group change, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacyConfiguration {
    /// 0 = maximum privacy (most noise on shared features), 1 = least.
    pub privacy_budget: f64,
    pub allow_on_device_learning: bool,
    pub allow_federated_learning: bool,
    /// Assessments below this confidence are submitted for learning.
    pub learning_confidence_floor: f64,
    /// Coarse focus tags shared with the federated backend (e.g. "fraud", "content").
    pub focus_tags: Vec<String>,
}

/// Level thresholds and the recommendations used for focus and non-focus types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationTable {
    pub block_above: f64,
    pub warn_above: f64,
    pub focus_block: Recommendation,
    pub focus_warn: Recommendation,
}

impl Default for EscalationTable {
    fn default() -> Self {
        Self {
            block_above: 0.7,
            warn_above: 0.4,
            focus_block: Recommendation::Block,
            focus_warn: Recommendation::Warn,
        }
    }
}

impl EscalationTable {
    pub fn recommend(&self, level: f64, focus: bool) -> Recommendation {
        if level > self.block_above {
            if focus {
                self.focus_block
            } else {
                Recommendation::Block
            }
        } else if level > self.warn_above {
            if focus {
                self.focus_warn
            } else {
                Recommendation::Warn
            }
        } else {
            Recommendation::Monitor
        }
    }
}

/// Unconditional rule for one threat type, applied after escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyOverride {
    pub threat_type: ThreatType,
    pub force_level: Option<f64>,
    pub recommendation: Option<Recommendation>,
    pub parental_notification: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgePolicy {
    pub age_group: AgeGroup,
    pub privacy: PrivacyConfiguration,
    pub weights: EnsembleWeights,
    pub escalation_multiplier: f64,
    pub focus_areas: Vec<ThreatType>,
    pub escalation: EscalationTable,
    pub overrides: Vec<PolicyOverride>,
    /// Any focus-area match notifies family.
    pub notify_family_on_focus: bool,
    /// Any blocking recommendation notifies the parent/guardian.
    pub notify_guardian_on_block: bool,
    /// Attach plain-language explanations on focus-area matches.
    pub simplify_focus_explanations: bool,
    /// Attach step-by-step guidance when input complexity exceeds this.
    pub guidance_complexity_above: Option<f64>,
    pub default_scan_interval_secs: u64,
}

impl AgePolicy {
    pub fn is_focus(&self, threat_type: ThreatType) -> bool {
        self.focus_areas.contains(&threat_type)
    }

    pub fn override_for(&self, threat_type: ThreatType) -> Option<&PolicyOverride> {
        self.overrides.iter().find(|o| o.threat_type == threat_type)
    }

    /// Recommendation this policy's escalation table mandates for an adjusted level.
    pub fn expected_recommendation(&self, level: f64, threat_type: ThreatType) -> Recommendation {
        if let Some(rec) = self.override_for(threat_type).and_then(|o| o.recommendation) {
            return rec;
        }
        self.escalation.recommend(level, self.is_focus(threat_type))
    }

    pub fn default_scan_interval(&self) -> Duration {
        Duration::from_secs(self.default_scan_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        if !(self.escalation_multiplier.is_finite() && self.escalation_multiplier >= 1.0) {
            return Err(EngineError::Policy(format!(
                "{}: escalation multiplier {} < 1.0",
                self.age_group.as_str(),
                self.escalation_multiplier
            )));
        }
        if self.escalation.warn_above > self.escalation.block_above {
            return Err(EngineError::Policy(format!(
                "{}: warn threshold above block threshold",
                self.age_group.as_str()
            )));
        }
        if !(0.0..=1.0).contains(&self.privacy.privacy_budget) {
            return Err(EngineError::Policy(format!(
                "{}: privacy budget out of range",
                self.age_group.as_str()
            )));
        }
        Ok(())
    }
}

/// Mapping from age group to policy record.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    policies: BTreeMap<AgeGroup, AgePolicy>,
}

impl PolicyTable {
    pub fn standard() -> Self {
        let policies = AgeGroup::ALL
            .iter()
            .map(|g| (*g, standard_policy(*g)))
            .collect();
        Self { policies }
    }

    pub fn get(&self, group: AgeGroup) -> &AgePolicy {
        // Table is built over AgeGroup::ALL, so every group is present.
        &self.policies[&group]
    }

    /// Replace the policy for one group (e.g. deployment-specific tuning).
    pub fn with_policy(mut self, policy: AgePolicy) -> Result<Self> {
        policy.validate()?;
        self.policies.insert(policy.age_group, policy);
        Ok(self)
    }

    /// Apply one learning confidence floor to every group.
    pub fn with_learning_floor(mut self, floor: f64) -> Self {
        for p in self.policies.values_mut() {
            p.privacy.learning_confidence_floor = floor;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        for p in self.policies.values() {
            p.validate()?;
        }
        Ok(())
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn privacy(budget: f64, federated: bool, tags: &[&str]) -> PrivacyConfiguration {
    PrivacyConfiguration {
        privacy_budget: budget,
        allow_on_device_learning: true,
        allow_federated_learning: federated,
        learning_confidence_floor: 0.7,
        focus_tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

fn standard_policy(group: AgeGroup) -> AgePolicy {
    match group {
        AgeGroup::Child => AgePolicy {
            age_group: group,
            privacy: privacy(0.1, false, &["content", "contact"]),
            weights: EnsembleWeights::new(0.3, 0.5, 0.2),
            escalation_multiplier: 1.5,
            focus_areas: vec![ThreatType::InappropriateContent, ThreatType::SocialEngineering],
            escalation: EscalationTable {
                focus_block: Recommendation::BlockAndEducate,
                focus_warn: Recommendation::WarnAndEducate,
                ..EscalationTable::default()
            },
            overrides: vec![PolicyOverride {
                threat_type: ThreatType::InappropriateContent,
                force_level: Some(1.0),
                recommendation: Some(Recommendation::BlockAndEducate),
                parental_notification: true,
            }],
            notify_family_on_focus: false,
            notify_guardian_on_block: true,
            simplify_focus_explanations: true,
            guidance_complexity_above: None,
            default_scan_interval_secs: 60,
        },
        AgeGroup::Teen => AgePolicy {
            age_group: group,
            privacy: privacy(0.3, false, &["social", "privacy"]),
            weights: EnsembleWeights::new(0.4, 0.4, 0.2),
            escalation_multiplier: 1.3,
            focus_areas: vec![ThreatType::Cyberbullying, ThreatType::SocialEngineering],
            escalation: EscalationTable {
                focus_block: Recommendation::Block,
                focus_warn: Recommendation::WarnAndEducate,
                ..EscalationTable::default()
            },
            overrides: vec![PolicyOverride {
                threat_type: ThreatType::PrivacyViolation,
                force_level: None,
                recommendation: Some(Recommendation::EducateAndAllow),
                parental_notification: false,
            }],
            notify_family_on_focus: false,
            notify_guardian_on_block: false,
            simplify_focus_explanations: false,
            guidance_complexity_above: None,
            default_scan_interval_secs: 60,
        },
        AgeGroup::YoungAdult => AgePolicy {
            age_group: group,
            privacy: privacy(0.6, true, &["general"]),
            weights: EnsembleWeights::new(0.4, 0.35, 0.25),
            escalation_multiplier: 1.0,
            focus_areas: Vec::new(),
            escalation: EscalationTable::default(),
            overrides: Vec::new(),
            notify_family_on_focus: false,
            notify_guardian_on_block: false,
            simplify_focus_explanations: false,
            guidance_complexity_above: None,
            default_scan_interval_secs: 120,
        },
        AgeGroup::Adult => AgePolicy {
            age_group: group,
            privacy: privacy(0.8, true, &["general"]),
            weights: EnsembleWeights::new(0.35, 0.4, 0.25),
            escalation_multiplier: 1.0,
            focus_areas: Vec::new(),
            escalation: EscalationTable::default(),
            overrides: Vec::new(),
            notify_family_on_focus: false,
            notify_guardian_on_block: false,
            simplify_focus_explanations: false,
            guidance_complexity_above: None,
            default_scan_interval_secs: 300,
        },
        AgeGroup::Senior => AgePolicy {
            age_group: group,
            privacy: privacy(0.5, true, &["fraud"]),
            weights: EnsembleWeights::new(0.5, 0.3, 0.2),
            escalation_multiplier: 2.0,
            focus_areas: vec![ThreatType::Scam, ThreatType::FinancialFraud, ThreatType::Phishing],
            escalation: EscalationTable {
                focus_block: Recommendation::BlockAndAlert,
                focus_warn: Recommendation::WarnAndEducate,
                ..EscalationTable::default()
            },
            overrides: Vec::new(),
            notify_family_on_focus: true,
            notify_guardian_on_block: false,
            simplify_focus_explanations: true,
            guidance_complexity_above: Some(0.7),
            default_scan_interval_secs: 60,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_weights_sum_to_one() {
        let table = PolicyTable::standard();
        for g in AgeGroup::ALL {
            let w = table.get(g).weights;
            assert!((w.sum() - 1.0).abs() <= WEIGHT_TOLERANCE, "{:?} sums to {}", g, w.sum());
        }
        table.validate().unwrap();
    }

    #[test]
    fn default_intervals_per_group() {
        let table = PolicyTable::standard();
        assert_eq!(table.get(AgeGroup::Child).default_scan_interval_secs, 60);
        assert_eq!(table.get(AgeGroup::Teen).default_scan_interval_secs, 60);
        assert_eq!(table.get(AgeGroup::YoungAdult).default_scan_interval_secs, 120);
        assert_eq!(table.get(AgeGroup::Adult).default_scan_interval_secs, 300);
        assert_eq!(table.get(AgeGroup::Senior).default_scan_interval_secs, 60);
    }

    #[test]
    fn per_detector_redistributes_missing_roles() {
        let w = EnsembleWeights::new(0.5, 0.3, 0.2);
        let per = w.per_detector(&[DetectorRole::Temporal, DetectorRole::Static]);
        assert!((per[0] - 0.625).abs() < 1e-9);
        assert!((per[1] - 0.375).abs() < 1e-9);

        let shared = w.per_detector(&[
            DetectorRole::Static,
            DetectorRole::Static,
            DetectorRole::Temporal,
            DetectorRole::Resilience,
        ]);
        assert!((shared.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!((shared[0] - 0.15).abs() < 1e-9);
    }

    #[test]
    fn invalid_weights_rejected() {
        assert!(EnsembleWeights::new(0.5, 0.5, 0.5).validate().is_err());
        assert!(EnsembleWeights::new(-0.2, 0.7, 0.5).validate().is_err());
        let mut p = PolicyTable::standard().get(AgeGroup::Adult).clone();
        p.escalation_multiplier = 0.5;
        assert!(PolicyTable::standard().with_policy(p).is_err());
    }

    #[test]
    fn escalation_table_thresholds_are_exclusive() {
        let t = EscalationTable::default();
        assert_eq!(t.recommend(0.7, false), Recommendation::Warn);
        assert_eq!(t.recommend(0.71, false), Recommendation::Block);
        assert_eq!(t.recommend(0.4, false), Recommendation::Monitor);
        assert_eq!(t.recommend(0.41, false), Recommendation::Warn);
    }

    #[test]
    fn only_adult_tiers_allow_federated() {
        let table = PolicyTable::standard();
        assert!(!table.get(AgeGroup::Child).privacy.allow_federated_learning);
        assert!(!table.get(AgeGroup::Teen).privacy.allow_federated_learning);
        assert!(table.get(AgeGroup::Adult).privacy.allow_federated_learning);
    }
}
