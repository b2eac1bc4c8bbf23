//! Threat events emitted to subscribers, and the rolling history the scheduler
//! uses to pick its cadence.

use crate::policy::AgeGroup;
use crate::protection::{DetectedThreat, ProtectionDomain};
use crate::response::ThreatResponse;
use crate::risk::ThreatAssessment;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Severity above which an event counts towards the high-alert cadence tiers.
pub const HIGH_SEVERITY: f64 = 0.7;

/// Notification unit delivered on the engine's broadcast stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatEvent {
    pub id: String,
    pub ts: DateTime<Utc>,
    pub age_group: AgeGroup,
    pub domain: ProtectionDomain,
    pub detected: DetectedThreat,
    pub assessment: ThreatAssessment,
    pub response: ThreatResponse,
}

impl ThreatEvent {
    pub fn new(
        detected: DetectedThreat,
        assessment: ThreatAssessment,
        response: ThreatResponse,
        age_group: AgeGroup,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            age_group,
            domain: detected.domain,
            detected,
            assessment,
            response,
        }
    }

    /// Post-policy threat level.
    pub fn severity(&self) -> f64 {
        self.assessment.threat_level
    }

    pub fn is_high_severity(&self) -> bool {
        self.severity() > HIGH_SEVERITY
    }
}

/// Bounded, time-ordered log of recently emitted events.
#[derive(Debug, Clone)]
pub struct EventHistory {
    events: VecDeque<ThreatEvent>,
    window: Duration,
    capacity: usize,
}

impl EventHistory {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            window,
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, event: ThreatEvent) {
        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Drop events older than the window relative to `now`.
    pub fn expire(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        while self.events.front().map_or(false, |e| e.ts < cutoff) {
            self.events.pop_front();
        }
    }

    /// Events with severity > 0.7 inside the window ending at `now`.
    pub fn high_severity_count(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        self.events
            .iter()
            .filter(|e| e.ts >= cutoff && e.ts <= now && e.is_high_severity())
            .count()
    }

    /// Most recent first.
    pub fn recent(&self, limit: usize) -> Vec<ThreatEvent> {
        self.events.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
