//! Threat filter: pure function of (raw assessment, age policy).

use super::{clamp_unit, Annotations, ThreatAssessment};
use crate::policy::AgePolicy;
use crate::response::messages;

/// Apply an age policy to a raw ensemble assessment.
///
/// Focus-area types are escalated by the policy multiplier (capped at 1.0), then
/// per-type overrides force level and recommendation. Annotations are rebuilt from
/// scratch, so the output depends only on the two arguments.
pub fn apply_policy(raw: &ThreatAssessment, policy: &AgePolicy) -> ThreatAssessment {
    let threat_type = raw.threat_type;
    let focus = policy.is_focus(threat_type);
    let over = policy.override_for(threat_type);

    let mut level = clamp_unit(raw.threat_level);
    if focus {
        level = (level * policy.escalation_multiplier).min(1.0);
    }
    if let Some(forced) = over.and_then(|o| o.force_level) {
        level = clamp_unit(forced);
    }
    let recommendation = policy.expected_recommendation(level, threat_type);

    let mut annotations = Annotations::default();
    if over.map_or(false, |o| o.parental_notification)
        || (policy.notify_guardian_on_block && recommendation.is_blocking())
    {
        annotations.parental_notification = true;
    }
    if focus {
        annotations.family_notification = policy.notify_family_on_focus;
        if policy.simplify_focus_explanations {
            annotations.simplified_explanation = Some(messages::plain_language(threat_type).to_string());
        }
        if let Some(above) = policy.guidance_complexity_above {
            if raw.complexity > above {
                annotations.guidance_steps = messages::guidance_steps(threat_type)
                    .iter()
                    .map(|s| s.to_string())
                    .collect();
            }
        }
    }
    if recommendation.is_educational() {
        annotations.educational_content =
            Some(messages::educational_content(threat_type, policy.age_group).to_string());
    }

    ThreatAssessment {
        threat_level: level,
        confidence: clamp_unit(raw.confidence),
        threat_type,
        recommendation,
        complexity: clamp_unit(raw.complexity),
        annotations,
    }
}

/// True when the recommendation matches what the policy's escalation table mandates.
pub fn is_consistent(assessment: &ThreatAssessment, policy: &AgePolicy) -> bool {
    assessment.recommendation
        == policy.expected_recommendation(assessment.threat_level, assessment.threat_type)
}
