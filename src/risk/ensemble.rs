//! Ensemble voter: weighted fusion of detector outputs with failure redistribution.

use super::{clamp_unit, ThreatAssessment, ThreatType};
use crate::detectors::DetectorOutcome;
use crate::error::EngineError;
use std::collections::BTreeMap;

const TIE_EPSILON: f64 = 1e-9;

/// Raw (pre-policy) ensemble verdict plus the diagnostics gathered while fusing.
#[derive(Debug, Clone)]
pub struct EnsembleVote {
    pub assessment: ThreatAssessment,
    pub diagnostics: Vec<EngineError>,
    /// Renormalised weights actually applied, aligned with the outcomes (0 for failures).
    pub effective_weights: Vec<f64>,
}

impl EnsembleVote {
    pub fn is_degraded(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d, EngineError::AssessmentDegraded { .. }))
    }
}

#[derive(Default)]
struct TypeSupport {
    weighted: f64,
    best_confidence: f64,
}

/// Fuse detector outcomes into one raw assessment.
///
/// `weights` is aligned with `outcomes`. Weight of failed detectors is redistributed
/// proportionally across the survivors for this vote only. When every detector failed
/// the result is the zero-confidence `monitor` default plus an `AssessmentDegraded`
/// diagnostic.
pub fn vote(outcomes: &[DetectorOutcome], weights: &[f64], complexity: f64) -> EnsembleVote {
    let mut diagnostics = Vec::new();
    let uniform = 1.0 / outcomes.len().max(1) as f64;
    let weight_of = |i: usize| -> f64 {
        if weights.len() == outcomes.len() {
            weights[i].max(0.0)
        } else {
            uniform
        }
    };

    let mut survivors = Vec::new();
    for (i, o) in outcomes.iter().enumerate() {
        match &o.result {
            Ok(r) if r.threat_score.is_finite() && r.confidence.is_finite() => survivors.push((i, r)),
            Ok(_) => diagnostics.push(EngineError::DetectorUnavailable {
                detector: o.detector.clone(),
                reason: "non-finite output".to_string(),
            }),
            Err(e) => diagnostics.push(e.clone().into_engine_error(&o.detector)),
        }
    }

    let mut effective_weights = vec![0.0; outcomes.len()];
    if survivors.is_empty() {
        diagnostics.push(EngineError::AssessmentDegraded {
            failed: outcomes.len(),
        });
        return EnsembleVote {
            assessment: ThreatAssessment::degraded().with_complexity(complexity),
            diagnostics,
            effective_weights,
        };
    }

    let total: f64 = survivors.iter().map(|(i, _)| weight_of(*i)).sum();
    for (i, _) in &survivors {
        effective_weights[*i] = if total > 0.0 {
            weight_of(*i) / total
        } else {
            1.0 / survivors.len() as f64
        };
    }

    let mut level = 0.0;
    let mut confidence = 0.0;
    let mut support: BTreeMap<ThreatType, TypeSupport> = BTreeMap::new();
    for (i, r) in &survivors {
        let w = effective_weights[*i];
        let score = clamp_unit(r.threat_score);
        let conf = clamp_unit(r.confidence);
        level += w * score;
        confidence += w * conf;
        if score > 0.0 && r.threat_type != ThreatType::Unknown {
            let s = support.entry(r.threat_type).or_default();
            s.weighted += w * score;
            s.best_confidence = s.best_confidence.max(conf);
        }
    }

    EnsembleVote {
        assessment: ThreatAssessment::new(level, confidence, pick_type(&support)).with_complexity(complexity),
        diagnostics,
        effective_weights,
    }
}

/// Highest weighted support wins; equal support goes to the type backed by the single
/// most confident detector, so a rare severe category is not averaged away.
fn pick_type(support: &BTreeMap<ThreatType, TypeSupport>) -> ThreatType {
    let mut best: Option<(ThreatType, &TypeSupport)> = None;
    for (t, s) in support {
        best = match best {
            None => Some((*t, s)),
            Some((bt, bs)) => {
                if s.weighted > bs.weighted + TIE_EPSILON
                    || ((s.weighted - bs.weighted).abs() <= TIE_EPSILON
                        && s.best_confidence > bs.best_confidence)
                {
                    Some((*t, s))
                } else {
                    Some((bt, bs))
                }
            }
        };
    }
    best.map(|(t, _)| t).unwrap_or(ThreatType::Unknown)
}
