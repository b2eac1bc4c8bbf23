//! Strip identifying fields from an (input, assessment) pair before it leaves the device.

use crate::features::{AssessmentInput, FeatureExtractor};
use crate::policy::{AgeGroup, AgePolicy};
use crate::protection::ProtectionDomain;
use crate::risk::{Recommendation, ThreatAssessment, ThreatType};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Laplace scale at privacy budget 0.
const MAX_NOISE_SCALE: f64 = 0.5;

/// Federated payload. Has no id, text, URL, sender or timestamp fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymizedSample {
    pub features: Vec<f32>,
    pub signals: BTreeMap<String, f64>,
    pub domain: ProtectionDomain,
    pub threat_type: ThreatType,
    pub threat_level: f64,
    pub confidence: f64,
    pub recommendation: Recommendation,
    pub age_group: AgeGroup,
    pub focus_tags: Vec<String>,
    pub privacy_budget: f64,
}

pub fn anonymize(
    input: &AssessmentInput,
    assessment: &ThreatAssessment,
    policy: &AgePolicy,
    extractor: &FeatureExtractor,
) -> AnonymizedSample {
    anonymize_with_rng(input, assessment, policy, extractor, &mut rand::thread_rng())
}

pub fn anonymize_with_rng<R: Rng>(
    input: &AssessmentInput,
    assessment: &ThreatAssessment,
    policy: &AgePolicy,
    extractor: &FeatureExtractor,
    rng: &mut R,
) -> AnonymizedSample {
    let budget = policy.privacy.privacy_budget.clamp(0.0, 1.0);
    let scale = (1.0 - budget) * MAX_NOISE_SCALE;

    let features = extractor
        .extract(input)
        .values
        .into_iter()
        .map(|v| v + laplace(rng, scale) as f32)
        .collect();
    let signals = input
        .signals
        .iter()
        .map(|(k, v)| (k.clone(), v + laplace(rng, scale)))
        .collect();

    AnonymizedSample {
        features,
        signals,
        domain: input.domain,
        threat_type: assessment.threat_type,
        threat_level: assessment.threat_level,
        confidence: assessment.confidence,
        recommendation: assessment.recommendation,
        age_group: policy.age_group,
        focus_tags: policy.privacy.focus_tags.clone(),
        privacy_budget: budget,
    }
}

fn laplace<R: Rng>(rng: &mut R, scale: f64) -> f64 {
    if scale <= 0.0 {
        return 0.0;
    }
    let u: f64 = rng.gen_range(-0.5..0.5);
    -scale * u.signum() * (1.0 - 2.0 * u.abs()).max(f64::MIN_POSITIVE).ln()
}
