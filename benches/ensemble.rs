//! Voter + threat filter benchmark: the per-assessment hot path without detector I/O.

use ageguard_engine::detectors::{DetectorOutcome, DetectorResult};
use ageguard_engine::policy::{AgeGroup, DetectorRole, PolicyTable};
use ageguard_engine::risk::{apply_policy, vote, ThreatType};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn outcome(id: &str, role: DetectorRole, score: f64, t: ThreatType) -> DetectorOutcome {
    DetectorOutcome {
        detector: id.to_string(),
        role,
        result: Ok(DetectorResult {
            detector: id.to_string(),
            confidence: 0.8,
            threat_score: score,
            threat_type: t,
            features: vec![0.0; 32],
        }),
    }
}

fn bench_vote_and_filter(c: &mut Criterion) {
    let table = PolicyTable::standard();
    let outcomes = vec![
        outcome("sequence", DetectorRole::Temporal, 0.9, ThreatType::FinancialFraud),
        outcome("lexicon", DetectorRole::Static, 0.6, ThreatType::Scam),
        outcome("evasion", DetectorRole::Resilience, 0.2, ThreatType::Scam),
    ];
    let roles: Vec<_> = outcomes.iter().map(|o| o.role).collect();

    for group in [AgeGroup::Child, AgeGroup::Senior, AgeGroup::Adult] {
        let policy = table.get(group);
        let weights = policy.weights.per_detector(&roles);
        c.bench_function(&format!("vote_filter_{}", group.as_str()), |b| {
            b.iter(|| {
                let v = vote(black_box(&outcomes), &weights, 0.5);
                black_box(apply_policy(&v.assessment, policy))
            })
        });
    }
}

criterion_group!(benches, bench_vote_and_filter);
criterion_main!(benches);
