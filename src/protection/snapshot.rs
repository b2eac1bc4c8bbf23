//! Snapshot sources: what each scheduler tick hands to the protection modules.

use super::SystemSnapshot;
use crate::features::AssessmentInput;
use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use sysinfo::{Networks, System};

const MAX_PENDING: usize = 1000;

pub trait SnapshotSource: Send + Sync {
    fn capture(&self) -> SystemSnapshot;
}

/// Pending content fed by platform hooks (message received, link opened, app installed).
/// Drained on each capture.
pub struct ObservationQueue {
    pending: Mutex<VecDeque<AssessmentInput>>,
}

impl Default for ObservationQueue {
    fn default() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
        }
    }
}

impl ObservationQueue {
    /// Record an observation (call from platform layer)
    pub fn record(&self, input: AssessmentInput) {
        if let Ok(mut q) = self.pending.lock() {
            q.push_back(input);
            if q.len() > MAX_PENDING {
                q.pop_front();
            }
        }
    }

    pub fn drain(&self) -> Vec<AssessmentInput> {
        match self.pending.lock() {
            Ok(mut q) => q.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Device snapshot from sysinfo plus platform-provided signals and observations.
pub struct SysinfoSnapshotSource {
    sys: Mutex<System>,
    signals: Mutex<BTreeMap<String, f64>>,
    queue: std::sync::Arc<ObservationQueue>,
}

impl SysinfoSnapshotSource {
    pub fn new(queue: std::sync::Arc<ObservationQueue>) -> Self {
        Self {
            sys: Mutex::new(System::new()),
            signals: Mutex::new(BTreeMap::new()),
            queue,
        }
    }

    /// Set a domain signal (call from platform layer), e.g. `social.hostile_message_rate`.
    pub fn set_signal(&self, name: impl Into<String>, value: f64) {
        if let Ok(mut s) = self.signals.lock() {
            s.insert(name.into(), value);
        }
    }

    fn device_signals(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        if let Ok(mut sys) = self.sys.lock() {
            sys.refresh_processes();
            sys.refresh_memory();
            out.insert("apps.process_load".to_string(), (sys.processes().len() as f64 / 1000.0).min(1.0));
            let total = sys.total_memory();
            if total > 0 {
                out.insert("device.memory_pressure".to_string(), sys.used_memory() as f64 / total as f64);
            }
        }
        let networks = Networks::new_with_refreshed_list();
        let mut transmitted: u64 = 0;
        for (_, data) in &networks {
            transmitted += data.total_transmitted();
        }
        out.insert("network.tx_gb".to_string(), transmitted as f64 / 1e9);
        out
    }
}

impl SnapshotSource for SysinfoSnapshotSource {
    fn capture(&self) -> SystemSnapshot {
        let mut signals = self.device_signals();
        if let Ok(s) = self.signals.lock() {
            signals.extend(s.iter().map(|(k, v)| (k.clone(), *v)));
        }
        SystemSnapshot {
            captured_at: Utc::now(),
            signals,
            observations: self.queue.drain(),
        }
    }
}

/// Fixed signals plus a drained observation queue; for embedding and tests.
pub struct StaticSnapshotSource {
    signals: Mutex<BTreeMap<String, f64>>,
    queue: std::sync::Arc<ObservationQueue>,
}

impl StaticSnapshotSource {
    pub fn new(queue: std::sync::Arc<ObservationQueue>) -> Self {
        Self {
            signals: Mutex::new(BTreeMap::new()),
            queue,
        }
    }

    pub fn set_signal(&self, name: impl Into<String>, value: f64) {
        if let Ok(mut s) = self.signals.lock() {
            s.insert(name.into(), value);
        }
    }
}

impl SnapshotSource for StaticSnapshotSource {
    fn capture(&self) -> SystemSnapshot {
        SystemSnapshot {
            captured_at: Utc::now(),
            signals: self.signals.lock().map(|s| s.clone()).unwrap_or_default(),
            observations: self.queue.drain(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protection::ProtectionDomain;
    use std::sync::Arc;

    #[test]
    fn queue_is_bounded_and_drains() {
        let q = ObservationQueue::default();
        for _ in 0..(MAX_PENDING + 5) {
            q.record(AssessmentInput::new(ProtectionDomain::Content));
        }
        assert_eq!(q.len(), MAX_PENDING);
        assert_eq!(q.drain().len(), MAX_PENDING);
        assert!(q.is_empty());
    }

    #[test]
    fn static_source_drains_observations_once() {
        let q = Arc::new(ObservationQueue::default());
        let src = StaticSnapshotSource::new(q.clone());
        src.set_signal("social.hostile_message_rate", 0.9);
        q.record(AssessmentInput::text(ProtectionDomain::Social, "hi"));
        let first = src.capture();
        assert_eq!(first.observations.len(), 1);
        assert_eq!(first.signal("social.hostile_message_rate"), Some(0.9));
        assert!(src.capture().observations.is_empty());
    }

    #[test]
    fn sysinfo_source_merges_platform_signals() {
        let src = SysinfoSnapshotSource::new(Arc::new(ObservationQueue::default()));
        src.set_signal("financial.anomalous_payment", 0.7);
        let snap = src.capture();
        assert_eq!(snap.signal("financial.anomalous_payment"), Some(0.7));
        assert!(snap.signal("apps.process_load").is_some());
    }
}
