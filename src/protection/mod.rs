//! Protection modules: per-domain scanners invoked once per scheduler tick.
//! Platform layers feed observations; shared snapshot and threat types live here.

mod rules;
mod snapshot;

pub use rules::{default_modules, SignalRule, SignalRuleModule};
pub use snapshot::{ObservationQueue, SnapshotSource, StaticSnapshotSource, SysinfoSnapshotSource};

use crate::error::EngineError;
use crate::features::AssessmentInput;
use crate::risk::ThreatType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionDomain {
    Network,
    Apps,
    Data,
    Communication,
    Identity,
    Content,
    Location,
    Financial,
    Social,
    Health,
}

impl ProtectionDomain {
    pub const ALL: [ProtectionDomain; 10] = [
        ProtectionDomain::Network,
        ProtectionDomain::Apps,
        ProtectionDomain::Data,
        ProtectionDomain::Communication,
        ProtectionDomain::Identity,
        ProtectionDomain::Content,
        ProtectionDomain::Location,
        ProtectionDomain::Financial,
        ProtectionDomain::Social,
        ProtectionDomain::Health,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtectionDomain::Network => "network",
            ProtectionDomain::Apps => "apps",
            ProtectionDomain::Data => "data",
            ProtectionDomain::Communication => "communication",
            ProtectionDomain::Identity => "identity",
            ProtectionDomain::Content => "content",
            ProtectionDomain::Location => "location",
            ProtectionDomain::Financial => "financial",
            ProtectionDomain::Social => "social",
            ProtectionDomain::Health => "health",
        }
    }
}

/// Point-in-time view of device state handed to every protection module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub captured_at: DateTime<Utc>,
    /// Numeric signals keyed `<domain>.<name>`, e.g. `network.unknown_hosts`.
    pub signals: BTreeMap<String, f64>,
    /// Pending content (messages, links, app events) awaiting assessment.
    pub observations: Vec<AssessmentInput>,
}

impl SystemSnapshot {
    pub fn empty() -> Self {
        Self {
            captured_at: Utc::now(),
            signals: BTreeMap::new(),
            observations: Vec::new(),
        }
    }

    pub fn signal(&self, name: &str) -> Option<f64> {
        self.signals.get(name).copied()
    }
}

/// Candidate surfaced by a scan; folded into a `ThreatEvent` or discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedThreat {
    pub id: String,
    pub domain: ProtectionDomain,
    pub threat_type: ThreatType,
    pub severity: f64,
    pub ts: DateTime<Utc>,
    /// The input that triggered detection; re-assessed by the full pipeline.
    pub input: AssessmentInput,
}

impl DetectedThreat {
    pub fn new(domain: ProtectionDomain, threat_type: ThreatType, severity: f64, input: AssessmentInput) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            domain,
            threat_type,
            severity: crate::risk::clamp_unit(severity),
            ts: Utc::now(),
            input,
        }
    }
}

#[async_trait]
pub trait ProtectionModule: Send + Sync {
    fn domain(&self) -> ProtectionDomain;

    async fn scan_for_threats(&self, snapshot: &SystemSnapshot) -> Result<Vec<DetectedThreat>, EngineError>;
}

/// All registered protection modules, scanned concurrently.
#[derive(Clone, Default)]
pub struct ProtectionSuite {
    modules: Vec<Arc<dyn ProtectionModule>>,
}

impl ProtectionSuite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_modules() -> Self {
        let mut s = Self::new();
        for m in default_modules() {
            s.register(Arc::new(m));
        }
        s
    }

    pub fn register(&mut self, module: Arc<dyn ProtectionModule>) {
        self.modules.push(module);
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Run every module against the snapshot. A failing or panicking module is logged
    /// and skipped; the others are unaffected.
    pub async fn scan(&self, snapshot: Arc<SystemSnapshot>) -> Vec<DetectedThreat> {
        let handles: Vec<_> = self
            .modules
            .iter()
            .map(|m| {
                let m = Arc::clone(m);
                let snapshot = Arc::clone(&snapshot);
                tokio::spawn(async move { m.scan_for_threats(&snapshot).await })
            })
            .collect();

        let mut out = Vec::new();
        for (m, handle) in self.modules.iter().zip(handles) {
            match handle.await {
                Ok(Ok(threats)) => {
                    debug!(domain = m.domain().as_str(), count = threats.len(), "module scanned");
                    out.extend(threats);
                }
                Ok(Err(e)) => warn!(domain = m.domain().as_str(), error = %e, "protection module failed"),
                Err(e) => warn!(domain = m.domain().as_str(), error = %e, "protection module task failed"),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    #[async_trait]
    impl ProtectionModule for Broken {
        fn domain(&self) -> ProtectionDomain {
            ProtectionDomain::Health
        }
        async fn scan_for_threats(&self, _s: &SystemSnapshot) -> Result<Vec<DetectedThreat>, EngineError> {
            Err(EngineError::Transport("sensor offline".into()))
        }
    }

    struct Fixed;

    #[async_trait]
    impl ProtectionModule for Fixed {
        fn domain(&self) -> ProtectionDomain {
            ProtectionDomain::Financial
        }
        async fn scan_for_threats(&self, _s: &SystemSnapshot) -> Result<Vec<DetectedThreat>, EngineError> {
            Ok(vec![DetectedThreat::new(
                ProtectionDomain::Financial,
                ThreatType::FinancialFraud,
                0.9,
                AssessmentInput::new(ProtectionDomain::Financial),
            )])
        }
    }

    #[tokio::test]
    async fn failing_module_does_not_block_others() {
        let mut suite = ProtectionSuite::new();
        suite.register(Arc::new(Broken));
        suite.register(Arc::new(Fixed));
        let found = suite.scan(Arc::new(SystemSnapshot::empty())).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].threat_type, ThreatType::FinancialFraud);
    }

    #[test]
    fn default_suite_covers_all_domains() {
        let suite = ProtectionSuite::with_default_modules();
        assert_eq!(suite.len(), ProtectionDomain::ALL.len());
    }
}
