//! Adaptive learning coordinator.
//!
//! Low-confidence assessments become training signal. The on-device path is gated
//! by the age group's privacy configuration only; the federated path additionally
//! requires the device to be charging, on an unmetered network and above half battery.

mod anonymize;
mod federated;

pub use anonymize::{anonymize, anonymize_with_rng, AnonymizedSample};
pub use federated::FederatedClient;

use crate::error::{EngineError, Result};
use crate::features::{AssessmentInput, FeatureExtractor};
use crate::policy::{AgeGroup, AgePolicy};
use crate::risk::ThreatAssessment;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

const MIN_BATTERY: f64 = 0.5;

/// Raw input plus filtered assessment, kept on the device only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSample {
    pub id: String,
    pub recorded_at: DateTime<Utc>,
    pub age_group: AgeGroup,
    pub input: AssessmentInput,
    pub assessment: ThreatAssessment,
}

impl TrainingSample {
    pub fn new(input: AssessmentInput, assessment: ThreatAssessment, age_group: AgeGroup) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            recorded_at: Utc::now(),
            age_group,
            input,
            assessment,
        }
    }
}

/// On-device training sink.
pub trait LocalLearner: Send + Sync {
    fn learn(&self, sample: &TrainingSample) -> Result<()>;
}

/// Remote aggregation endpoint for anonymized samples.
#[async_trait]
pub trait LearningBackend: Send + Sync {
    async fn submit(&self, sample: &AnonymizedSample) -> Result<()>;
}

/// Bounded in-memory learner; oldest samples are evicted first.
pub struct MemoryLearner {
    samples: Mutex<VecDeque<TrainingSample>>,
    capacity: usize,
}

impl MemoryLearner {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn samples(&self) -> Vec<TrainingSample> {
        self.samples
            .lock()
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocalLearner for MemoryLearner {
    fn learn(&self, sample: &TrainingSample) -> Result<()> {
        let mut s = self
            .samples
            .lock()
            .map_err(|_| EngineError::Storage("learner lock poisoned".into()))?;
        if s.len() >= self.capacity {
            s.pop_front();
        }
        s.push_back(sample.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceConditions {
    /// 0-1
    pub battery_level: f64,
    pub unmetered_network: bool,
    pub charging: bool,
}

impl DeviceConditions {
    pub fn allows_federated(&self) -> bool {
        self.battery_level > MIN_BATTERY && self.unmetered_network && self.charging
    }
}

impl Default for DeviceConditions {
    fn default() -> Self {
        Self {
            battery_level: 0.0,
            unmetered_network: false,
            charging: false,
        }
    }
}

/// Source of current battery/network/charging state.
pub trait DeviceStatus: Send + Sync {
    fn conditions(&self) -> DeviceConditions;
}

/// Device status set by the host (or from config in the daemon).
#[derive(Default)]
pub struct StaticDeviceStatus {
    conditions: Mutex<DeviceConditions>,
}

impl StaticDeviceStatus {
    pub fn new(conditions: DeviceConditions) -> Self {
        Self {
            conditions: Mutex::new(conditions),
        }
    }

    pub fn set(&self, conditions: DeviceConditions) {
        if let Ok(mut c) = self.conditions.lock() {
            *c = conditions;
        }
    }
}

impl DeviceStatus for StaticDeviceStatus {
    fn conditions(&self) -> DeviceConditions {
        self.conditions.lock().map(|c| *c).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FederatedOutcome {
    Submitted,
    /// Age group's privacy configuration forbids federated learning.
    NotPermitted,
    DeviceConditionsUnmet,
    NoBackend,
    Failed(EngineError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LearningOutcome {
    pub triggered: bool,
    pub on_device: bool,
    pub federated: Option<FederatedOutcome>,
}

impl LearningOutcome {
    fn skipped() -> Self {
        Self {
            triggered: false,
            on_device: false,
            federated: None,
        }
    }
}

pub struct LearningCoordinator {
    local: Option<Arc<dyn LocalLearner>>,
    backend: Option<Arc<dyn LearningBackend>>,
    device: Arc<dyn DeviceStatus>,
    extractor: FeatureExtractor,
}

impl LearningCoordinator {
    pub fn new(device: Arc<dyn DeviceStatus>) -> Self {
        Self {
            local: None,
            backend: None,
            device,
            extractor: FeatureExtractor::default(),
        }
    }

    pub fn with_local(mut self, local: Arc<dyn LocalLearner>) -> Self {
        self.local = Some(local);
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn LearningBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_extractor(mut self, extractor: FeatureExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn should_learn(assessment: &ThreatAssessment, policy: &AgePolicy) -> bool {
        assessment.confidence < policy.privacy.learning_confidence_floor
    }

    /// Run both learning paths for one assessment. Failures are logged and reported in
    /// the outcome, never returned.
    pub async fn consider(
        &self,
        input: &AssessmentInput,
        assessment: &ThreatAssessment,
        policy: &AgePolicy,
    ) -> LearningOutcome {
        if !Self::should_learn(assessment, policy) {
            return LearningOutcome::skipped();
        }

        let mut on_device = false;
        if policy.privacy.allow_on_device_learning {
            if let Some(local) = &self.local {
                let sample = TrainingSample::new(input.clone(), assessment.clone(), policy.age_group);
                match local.learn(&sample) {
                    Ok(()) => on_device = true,
                    Err(e) => {
                        let e = EngineError::LearningSubmissionFailed(e.to_string());
                        warn!(input_id = %input.id, error = %e, "on-device learning dropped");
                    }
                }
            }
        }

        let federated = self.federated(input, assessment, policy).await;
        LearningOutcome {
            triggered: true,
            on_device,
            federated: Some(federated),
        }
    }

    async fn federated(
        &self,
        input: &AssessmentInput,
        assessment: &ThreatAssessment,
        policy: &AgePolicy,
    ) -> FederatedOutcome {
        if !policy.privacy.allow_federated_learning {
            return FederatedOutcome::NotPermitted;
        }
        let Some(backend) = &self.backend else {
            return FederatedOutcome::NoBackend;
        };
        let conditions = self.device.conditions();
        if !conditions.allows_federated() {
            debug!(
                battery = conditions.battery_level,
                charging = conditions.charging,
                unmetered = conditions.unmetered_network,
                "federated submission skipped"
            );
            return FederatedOutcome::DeviceConditionsUnmet;
        }
        let sample = anonymize(input, assessment, policy, &self.extractor);
        match backend.submit(&sample).await {
            Ok(()) => FederatedOutcome::Submitted,
            Err(e) => {
                warn!(input_id = %input.id, error = %e, "federated submission dropped");
                FederatedOutcome::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyTable;
    use crate::protection::ProtectionDomain;
    use crate::risk::ThreatType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recording {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl LearningBackend for Recording {
        async fn submit(&self, _sample: &AnonymizedSample) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(EngineError::LearningSubmissionFailed("503".into()))
            } else {
                Ok(())
            }
        }
    }

    fn good_device() -> DeviceConditions {
        DeviceConditions {
            battery_level: 0.8,
            unmetered_network: true,
            charging: true,
        }
    }

    fn low_confidence() -> ThreatAssessment {
        ThreatAssessment::new(0.5, 0.4, ThreatType::Scam)
    }

    fn input() -> AssessmentInput {
        AssessmentInput::text(ProtectionDomain::Financial, "send a gift card")
    }

    #[test]
    fn federated_gate_needs_all_three_conditions() {
        assert!(good_device().allows_federated());
        let mut d = good_device();
        d.battery_level = 0.5;
        assert!(!d.allows_federated());
        let mut d = good_device();
        d.charging = false;
        assert!(!d.allows_federated());
        let mut d = good_device();
        d.unmetered_network = false;
        assert!(!d.allows_federated());
    }

    #[tokio::test]
    async fn confident_assessments_do_not_trigger() {
        let local = Arc::new(MemoryLearner::new(8));
        let c = LearningCoordinator::new(Arc::new(StaticDeviceStatus::new(good_device())))
            .with_local(local.clone());
        let table = PolicyTable::standard();
        let a = ThreatAssessment::new(0.9, 0.7, ThreatType::Scam);
        let out = c.consider(&input(), &a, table.get(AgeGroup::Adult)).await;
        assert!(!out.triggered);
        assert!(local.is_empty());
    }

    #[tokio::test]
    async fn adult_submits_both_paths() {
        let local = Arc::new(MemoryLearner::new(8));
        let backend = Arc::new(Recording::default());
        let c = LearningCoordinator::new(Arc::new(StaticDeviceStatus::new(good_device())))
            .with_local(local.clone())
            .with_backend(backend.clone());
        let table = PolicyTable::standard();
        let out = c.consider(&input(), &low_confidence(), table.get(AgeGroup::Adult)).await;
        assert!(out.triggered && out.on_device);
        assert_eq!(out.federated, Some(FederatedOutcome::Submitted));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(local.samples()[0].age_group, AgeGroup::Adult);
    }

    #[tokio::test]
    async fn child_never_federates() {
        let backend = Arc::new(Recording::default());
        let c = LearningCoordinator::new(Arc::new(StaticDeviceStatus::new(good_device())))
            .with_backend(backend.clone());
        let table = PolicyTable::standard();
        let out = c.consider(&input(), &low_confidence(), table.get(AgeGroup::Child)).await;
        assert_eq!(out.federated, Some(FederatedOutcome::NotPermitted));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unmet_device_conditions_skip_without_error() {
        let backend = Arc::new(Recording::default());
        let status = Arc::new(StaticDeviceStatus::new(good_device()));
        let c = LearningCoordinator::new(status.clone()).with_backend(backend.clone());
        status.set(DeviceConditions {
            charging: false,
            ..good_device()
        });
        let table = PolicyTable::standard();
        let out = c.consider(&input(), &low_confidence(), table.get(AgeGroup::Senior)).await;
        assert_eq!(out.federated, Some(FederatedOutcome::DeviceConditionsUnmet));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn backend_failure_is_dropped_not_retried() {
        let backend = Arc::new(Recording {
            fail: true,
            ..Default::default()
        });
        let c = LearningCoordinator::new(Arc::new(StaticDeviceStatus::new(good_device())))
            .with_backend(backend.clone());
        let table = PolicyTable::standard();
        let out = c.consider(&input(), &low_confidence(), table.get(AgeGroup::YoungAdult)).await;
        assert!(matches!(out.federated, Some(FederatedOutcome::Failed(_))));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }
}
