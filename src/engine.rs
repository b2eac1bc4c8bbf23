//! Threat engine: an explicitly owned instance holding the active age policy, the
//! detector registry, the learning coordinator and the scan scheduler.
//!
//! Every assessment and every scheduler tick reads the active policy once and uses
//! that snapshot throughout, so [`ThreatEngine::set_age_group`] takes effect between
//! ticks, never mid-tick.

use crate::config::EngineConfig;
use crate::detectors::{Detector, DetectorRegistry};
use crate::error::{EngineError, Result};
use crate::events::{EventHistory, ThreatEvent};
use crate::features::AssessmentInput;
use crate::learning::{
    DeviceStatus, FederatedClient, LearningBackend, LearningCoordinator, LocalLearner,
    MemoryLearner, StaticDeviceStatus,
};
use crate::policy::{AgeGroup, AgePolicy, DetectorRole, PolicyTable};
use crate::protection::{
    default_modules, DetectedThreat, ObservationQueue, ProtectionModule, ProtectionSuite,
    SnapshotSource, StaticSnapshotSource,
};
use crate::response::{self, ThreatResponse};
use crate::risk::{apply_policy, vote, ThreatAssessment};
use crate::scheduler::{Cadence, ScanScheduler, ScanTick, SchedulerHandle, SchedulerStats};
use crate::storage::SecureStore;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Policy record plus per-detector weights, swapped as one unit.
#[derive(Debug, Clone)]
pub struct ActivePolicy {
    pub policy: AgePolicy,
    /// Aligned with the registry's detector order.
    pub weights: Vec<f64>,
}

impl ActivePolicy {
    fn new(policy: &AgePolicy, roles: &[DetectorRole]) -> Self {
        Self {
            policy: policy.clone(),
            weights: policy.weights.per_detector(roles),
        }
    }

    pub fn age_group(&self) -> AgeGroup {
        self.policy.age_group
    }
}

/// Result of one pass through detectors, voter, filter and response generator.
#[derive(Debug, Clone)]
pub struct AssessmentOutcome {
    pub input_id: String,
    pub age_group: AgeGroup,
    /// Ensemble verdict before the age policy was applied.
    pub raw: ThreatAssessment,
    pub assessment: ThreatAssessment,
    pub response: ThreatResponse,
    pub diagnostics: Vec<EngineError>,
}

impl AssessmentOutcome {
    pub fn is_degraded(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d, EngineError::AssessmentDegraded { .. }))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub assessments: u64,
    pub degraded: u64,
    pub events_emitted: u64,
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub learning_triggered: u64,
}

/// External authority for the user's age group. Its verdict is applied as given.
#[async_trait]
pub trait AgeVerifier: Send + Sync {
    async fn verify(&self) -> Result<AgeGroup>;
}

pub struct StaticAgeVerifier(pub AgeGroup);

#[async_trait]
impl AgeVerifier for StaticAgeVerifier {
    async fn verify(&self) -> Result<AgeGroup> {
        Ok(self.0)
    }
}

#[derive(Default)]
struct Counters {
    assessments: AtomicU64,
    degraded: AtomicU64,
    events_emitted: AtomicU64,
    learning_triggered: AtomicU64,
}

struct EngineCore {
    config: EngineConfig,
    policies: PolicyTable,
    active: RwLock<Arc<ActivePolicy>>,
    detectors: DetectorRegistry,
    roles: Vec<DetectorRole>,
    suite: ProtectionSuite,
    snapshots: Arc<dyn SnapshotSource>,
    learning: Arc<LearningCoordinator>,
    store: Option<Arc<SecureStore>>,
    history: Mutex<EventHistory>,
    events: RwLock<Option<broadcast::Sender<ThreatEvent>>>,
    counters: Counters,
    scheduler_stats: Arc<SchedulerStats>,
}

impl EngineCore {
    fn active(&self) -> Arc<ActivePolicy> {
        match self.active.read() {
            Ok(a) => Arc::clone(&a),
            Err(p) => Arc::clone(&p.into_inner()),
        }
    }

    fn set_active(&self, group: AgeGroup) {
        let next = Arc::new(ActivePolicy::new(self.policies.get(group), &self.roles));
        match self.active.write() {
            Ok(mut a) => *a = next,
            Err(p) => *p.into_inner() = next,
        }
    }

    fn history(&self) -> MutexGuard<'_, EventHistory> {
        self.history.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn sender(&self) -> Option<broadcast::Sender<ThreatEvent>> {
        match self.events.read() {
            Ok(tx) => tx.clone(),
            Err(p) => p.into_inner().clone(),
        }
    }

    async fn assess_with(&self, active: &Arc<ActivePolicy>, input: AssessmentInput) -> AssessmentOutcome {
        let input = Arc::new(input);
        let outcomes = self
            .detectors
            .run_all(Arc::clone(&input), self.config.detectors.timeout())
            .await;
        let ensemble = vote(&outcomes, &active.weights, input.complexity_estimate());
        self.counters.assessments.fetch_add(1, Ordering::Relaxed);

        let degraded = ensemble.is_degraded();
        if degraded {
            self.counters.degraded.fetch_add(1, Ordering::Relaxed);
            let err = EngineError::AssessmentDegraded {
                failed: outcomes.len(),
            };
            warn!(input_id = %input.id, error = %err, "assessment degraded to monitor");
        }

        let assessment = apply_policy(&ensemble.assessment, &active.policy);
        let response = response::generate(&assessment, active.age_group());
        debug!(
            input_id = %input.id,
            age_group = active.age_group().as_str(),
            threat_type = assessment.threat_type.as_str(),
            threat_level = assessment.threat_level,
            confidence = assessment.confidence,
            recommendation = assessment.recommendation.as_str(),
            "assessed"
        );

        if !degraded && LearningCoordinator::should_learn(&assessment, &active.policy) {
            self.counters.learning_triggered.fetch_add(1, Ordering::Relaxed);
            let learning = Arc::clone(&self.learning);
            let active = Arc::clone(active);
            let input = Arc::clone(&input);
            let a = assessment.clone();
            tokio::spawn(async move {
                learning.consider(&input, &a, &active.policy).await;
            });
        }

        AssessmentOutcome {
            input_id: input.id.clone(),
            age_group: active.age_group(),
            raw: ensemble.assessment,
            assessment,
            response,
            diagnostics: ensemble.diagnostics,
        }
    }

    async fn handle_with(&self, active: &Arc<ActivePolicy>, threat: DetectedThreat) -> Option<ThreatEvent> {
        let mut input = threat.input.clone();
        if input.hint.is_none() {
            input.hint = Some(threat.threat_type);
        }
        let outcome = self.assess_with(active, input).await;
        if outcome.assessment.threat_level <= self.config.scheduler.emit_threshold {
            debug!(
                domain = threat.domain.as_str(),
                threat_level = outcome.assessment.threat_level,
                "candidate below emit threshold"
            );
            return None;
        }
        let event = ThreatEvent::new(threat, outcome.assessment, outcome.response, outcome.age_group);
        self.emit(&event).then_some(event)
    }

    /// Record, persist and broadcast. Returns false once the stream is closed.
    fn emit(&self, event: &ThreatEvent) -> bool {
        let Some(tx) = self.sender() else {
            debug!(event_id = %event.id, "event stream closed, event discarded");
            return false;
        };
        self.history().record(event.clone());
        if self.config.events.persist {
            if let Some(store) = &self.store {
                if let Err(e) = store.insert_threat_event(event) {
                    warn!(event_id = %event.id, error = %e, "event not persisted");
                }
            }
        }
        // No subscribers is not an error.
        let _ = tx.send(event.clone());
        self.counters.events_emitted.fetch_add(1, Ordering::Relaxed);
        info!(
            event_id = %event.id,
            domain = event.domain.as_str(),
            threat_type = event.assessment.threat_type.as_str(),
            threat_level = event.assessment.threat_level,
            action = event.response.action.as_str(),
            "threat event"
        );
        true
    }

    async fn scan_with(&self, active: &Arc<ActivePolicy>) -> Vec<ThreatEvent> {
        let snapshot = Arc::new(self.snapshots.capture());
        let candidates = self.suite.scan(snapshot).await;
        let mut events = Vec::new();
        for threat in candidates {
            if let Some(ev) = self.handle_with(active, threat).await {
                events.push(ev);
            }
        }
        events
    }
}

#[async_trait]
impl ScanTick for EngineCore {
    fn next_cadence(&self) -> Cadence {
        let now = Utc::now();
        let count = {
            let mut h = self.history();
            h.expire(now);
            h.high_severity_count(now)
        };
        Cadence::select(count, &self.active().policy)
    }

    async fn tick(&self) {
        let active = self.active();
        let events = self.scan_with(&active).await;
        debug!(age_group = active.age_group().as_str(), emitted = events.len(), "scan tick complete");
    }
}

pub struct ThreatEngine {
    core: Arc<EngineCore>,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl ThreatEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Start the background scan scheduler. No-op if already running or disabled.
    pub fn start(&self) -> Result<()> {
        if self.core.sender().is_none() {
            return Err(EngineError::Config("engine has been shut down".into()));
        }
        if !self.core.config.scheduler.enabled {
            info!("background scanning disabled");
            return Ok(());
        }
        let mut slot = self.scheduler.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_none() {
            let ticker: Arc<dyn ScanTick> = self.core.clone();
            *slot = Some(ScanScheduler::spawn(ticker, Arc::clone(&self.core.scheduler_stats)));
            info!(age_group = self.age_group().as_str(), "engine started");
        }
        Ok(())
    }

    /// Stop the scheduler and close the event stream. Results of in-flight work are discarded.
    pub async fn shutdown(&self) {
        let closed = match self.core.events.write() {
            Ok(mut tx) => tx.take(),
            Err(p) => p.into_inner().take(),
        };
        let handle = self.scheduler.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(h) = handle {
            h.stop().await;
        }
        if closed.is_some() {
            info!("engine stopped");
        }
    }

    /// New receiver on the event stream. After shutdown the receiver reports closed.
    pub fn subscribe(&self) -> broadcast::Receiver<ThreatEvent> {
        match self.core.sender() {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Assess one input under the current age policy. Never fails; detector failures
    /// degrade the result instead.
    pub async fn assess(&self, input: AssessmentInput) -> AssessmentOutcome {
        let active = self.core.active();
        self.core.assess_with(&active, input).await
    }

    /// Run a protection module's candidate through the pipeline; emits and returns an
    /// event when the filtered level exceeds the emit threshold.
    pub async fn handle_detected(&self, threat: DetectedThreat) -> Option<ThreatEvent> {
        let active = self.core.active();
        self.core.handle_with(&active, threat).await
    }

    /// One scan outside the schedule.
    pub async fn scan_now(&self) -> Vec<ThreatEvent> {
        let active = self.core.active();
        self.core.scan_with(&active).await
    }

    pub fn set_age_group(&self, group: AgeGroup) {
        let previous = self.age_group();
        self.core.set_active(group);
        info!(from = previous.as_str(), to = group.as_str(), "age group switched");
    }

    /// Ask the verification collaborator for the current age group and apply it.
    pub async fn reverify(&self, verifier: &dyn AgeVerifier) -> Result<AgeGroup> {
        let group = verifier.verify().await?;
        if group != self.age_group() {
            self.set_age_group(group);
        }
        Ok(group)
    }

    pub fn age_group(&self) -> AgeGroup {
        self.core.active().age_group()
    }

    pub fn active_policy(&self) -> Arc<ActivePolicy> {
        self.core.active()
    }

    /// Most recent first.
    pub fn recent_events(&self, limit: usize) -> Vec<ThreatEvent> {
        self.core.history().recent(limit)
    }

    pub fn stats(&self) -> EngineStats {
        let c = &self.core.counters;
        EngineStats {
            assessments: c.assessments.load(Ordering::Relaxed),
            degraded: c.degraded.load(Ordering::Relaxed),
            events_emitted: c.events_emitted.load(Ordering::Relaxed),
            ticks: self.core.scheduler_stats.ticks(),
            skipped_ticks: self.core.scheduler_stats.skipped(),
            learning_triggered: c.learning_triggered.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ThreatEngine {
    fn drop(&mut self) {
        if let Ok(mut tx) = self.core.events.write() {
            tx.take();
        }
        if let Ok(slot) = self.scheduler.lock() {
            if let Some(h) = slot.as_ref() {
                h.cancel();
            }
        }
    }
}

pub struct EngineBuilder {
    config: EngineConfig,
    policies: Option<PolicyTable>,
    detectors: Option<DetectorRegistry>,
    suite: Option<ProtectionSuite>,
    snapshots: Option<Arc<dyn SnapshotSource>>,
    device: Option<Arc<dyn DeviceStatus>>,
    local: Option<Arc<dyn LocalLearner>>,
    backend: Option<Arc<dyn LearningBackend>>,
    store: Option<Arc<SecureStore>>,
}

impl EngineBuilder {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            policies: None,
            detectors: None,
            suite: None,
            snapshots: None,
            device: None,
            local: None,
            backend: None,
            store: None,
        }
    }

    pub fn policies(mut self, policies: PolicyTable) -> Self {
        self.policies = Some(policies);
        self
    }

    /// Replace the detector set. Without this the built-in detectors are used.
    pub fn detectors(mut self, registry: DetectorRegistry) -> Self {
        self.detectors = Some(registry);
        self
    }

    pub fn detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detectors.get_or_insert_with(DetectorRegistry::new).register(detector);
        self
    }

    /// Replace the protection suite. Without this one rule module per domain is used.
    pub fn protection_suite(mut self, suite: ProtectionSuite) -> Self {
        self.suite = Some(suite);
        self
    }

    pub fn protection_module(mut self, module: Arc<dyn ProtectionModule>) -> Self {
        self.suite.get_or_insert_with(ProtectionSuite::new).register(module);
        self
    }

    pub fn snapshot_source(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.snapshots = Some(source);
        self
    }

    pub fn device_status(mut self, device: Arc<dyn DeviceStatus>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn local_learner(mut self, local: Arc<dyn LocalLearner>) -> Self {
        self.local = Some(local);
        self
    }

    pub fn learning_backend(mut self, backend: Arc<dyn LearningBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn store(mut self, store: Arc<SecureStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<ThreatEngine> {
        let config = self.config;
        config.validate()?;

        let policies = self
            .policies
            .unwrap_or_default()
            .with_learning_floor(config.learning.confidence_floor);
        policies.validate()?;

        let detectors = self.detectors.unwrap_or_else(DetectorRegistry::builtin);
        if detectors.is_empty() {
            return Err(EngineError::Config("at least one detector is required".into()));
        }
        let roles = detectors.roles();

        let suite = self.suite.unwrap_or_else(|| {
            let mut s = ProtectionSuite::new();
            for m in default_modules() {
                s.register(Arc::new(m.with_candidate_floor(config.scheduler.candidate_floor)));
            }
            s
        });
        let snapshots = self
            .snapshots
            .unwrap_or_else(|| Arc::new(StaticSnapshotSource::new(Arc::new(ObservationQueue::default()))));

        let device = self
            .device
            .unwrap_or_else(|| Arc::new(StaticDeviceStatus::new(config.device.conditions())));
        let local: Arc<dyn LocalLearner> = match (self.local, &self.store) {
            (Some(l), _) => l,
            (None, Some(store)) if config.learning.persist_samples => store.clone() as Arc<dyn LocalLearner>,
            _ => Arc::new(MemoryLearner::new(config.learning.max_local_samples)),
        };
        let backend: Option<Arc<dyn LearningBackend>> = match self.backend {
            Some(b) => Some(b),
            None => match (&config.learning.federated.endpoint, config.learning.federated.enabled) {
                (Some(endpoint), true) => {
                    let client = FederatedClient::new(
                        endpoint,
                        Duration::from_secs(config.learning.federated.timeout_secs),
                    )?;
                    Some(Arc::new(client) as Arc<dyn LearningBackend>)
                }
                _ => None,
            },
        };
        let mut learning = LearningCoordinator::new(device).with_local(local);
        if let Some(b) = backend {
            learning = learning.with_backend(b);
        }

        let window = config.scheduler.history_window();
        let mut history = EventHistory::new(window, config.scheduler.history_capacity);
        if let Some(store) = &self.store {
            match store.threat_events_since((Utc::now() - window).timestamp_millis()) {
                Ok(events) => events.into_iter().for_each(|e| history.record(e)),
                Err(e) => warn!(error = %e, "event history not restored"),
            }
        }

        let active = ActivePolicy::new(policies.get(config.age_group), &roles);
        let (tx, _) = broadcast::channel(config.events.channel_capacity);
        info!(
            age_group = config.age_group.as_str(),
            detectors = detectors.len(),
            modules = suite.len(),
            "engine built"
        );

        Ok(ThreatEngine {
            core: Arc::new(EngineCore {
                policies,
                active: RwLock::new(Arc::new(active)),
                detectors,
                roles,
                suite,
                snapshots,
                learning: Arc::new(learning),
                store: self.store,
                history: Mutex::new(history),
                events: RwLock::new(Some(tx)),
                counters: Counters::default(),
                scheduler_stats: Arc::new(SchedulerStats::default()),
                config,
            }),
            scheduler: Mutex::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(group: AgeGroup) -> ThreatEngine {
        let mut config = EngineConfig::default();
        config.age_group = group;
        ThreatEngine::builder(config).build().unwrap()
    }

    #[test]
    fn empty_registry_is_rejected() {
        let r = ThreatEngine::builder(EngineConfig::default())
            .detectors(DetectorRegistry::new())
            .build();
        assert!(matches!(r, Err(EngineError::Config(_))));
    }

    #[test]
    fn age_switch_replaces_weights_with_policy() {
        let e = engine(AgeGroup::Adult);
        let before = e.active_policy();
        e.set_age_group(AgeGroup::Senior);
        let after = e.active_policy();
        assert_eq!(before.age_group(), AgeGroup::Adult);
        assert_eq!(after.age_group(), AgeGroup::Senior);
        // builtin order: temporal, static, resilience
        let close = |a: &[f64], b: &[f64]| a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-9);
        assert!(close(&after.weights, &[0.5, 0.3, 0.2]));
        // a snapshot taken earlier is unaffected
        assert!(close(&before.weights, &[0.35, 0.4, 0.25]));
    }

    #[tokio::test]
    async fn reverify_applies_verdict() {
        let e = engine(AgeGroup::Adult);
        let g = e.reverify(&StaticAgeVerifier(AgeGroup::Teen)).await.unwrap();
        assert_eq!(g, AgeGroup::Teen);
        assert_eq!(e.age_group(), AgeGroup::Teen);
    }

    #[tokio::test]
    async fn subscribe_after_shutdown_is_closed() {
        let e = engine(AgeGroup::Adult);
        e.shutdown().await;
        let mut rx = e.subscribe();
        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Closed)));
        assert!(e.start().is_err());
    }
}
