//! Engine configuration, loaded from a JSON file.

use crate::error::{EngineError, Result};
use crate::learning::DeviceConditions;
use crate::policy::AgeGroup;
use crate::scheduler::HIGH_ALERT_EVENTS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Data directory (encrypted store)
    pub data_dir: PathBuf,
    /// Initial age group, as last verified by the age verification collaborator
    pub age_group: AgeGroup,
    pub detectors: DetectorsConfig,
    pub scheduler: SchedulerConfig,
    pub learning: LearningConfig,
    /// Static device status used when the host provides none
    pub device: DeviceConfig,
    pub events: EventsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorsConfig {
    /// Per-assessment deadline shared by all detectors
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Rolling window for the high-severity event count
    pub history_window_mins: i64,
    pub history_capacity: usize,
    /// Events are emitted only above this post-policy threat level
    pub emit_threshold: f64,
    /// Protection modules drop candidates below this severity
    pub candidate_floor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Assessments below this confidence become training signal
    pub confidence_floor: f64,
    /// Persist on-device samples in the encrypted store
    pub persist_samples: bool,
    pub max_local_samples: usize,
    pub federated: FederatedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FederatedConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub battery_level: f64,
    pub charging: bool,
    pub unmetered_network: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast buffer; slow subscribers lag past this
    pub channel_capacity: usize,
    /// Persist emitted events in the encrypted store
    pub persist: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            age_group: AgeGroup::Adult,
            detectors: DetectorsConfig::default(),
            scheduler: SchedulerConfig::default(),
            learning: LearningConfig::default(),
            device: DeviceConfig::default(),
            events: EventsConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for DetectorsConfig {
    fn default() -> Self {
        Self { timeout_ms: 250 }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_window_mins: 60,
            history_capacity: 512,
            emit_threshold: 0.5,
            candidate_floor: 0.2,
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.7,
            persist_samples: true,
            max_local_samples: 10_000,
            federated: FederatedConfig::default(),
        }
    }
}

impl Default for FederatedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            timeout_secs: 15,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            battery_level: 1.0,
            charging: false,
            unmetered_network: false,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            persist: true,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl DetectorsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl SchedulerConfig {
    pub fn history_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.history_window_mins)
    }
}

impl DeviceConfig {
    pub fn conditions(&self) -> DeviceConditions {
        DeviceConditions {
            battery_level: self.battery_level,
            unmetered_network: self.unmetered_network,
            charging: self.charging,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("ageguard"))
        .unwrap_or_else(|| PathBuf::from(".ageguard"))
}

fn unit(name: &str, v: f64) -> Result<()> {
    if (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(EngineError::Config(format!("{} must be in [0, 1], got {}", name, v)))
    }
}

impl EngineConfig {
    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::try_load(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
                Self::default()
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        let config: EngineConfig = serde_json::from_str(&data)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        unit("scheduler.emit_threshold", self.scheduler.emit_threshold)?;
        unit("scheduler.candidate_floor", self.scheduler.candidate_floor)?;
        unit("learning.confidence_floor", self.learning.confidence_floor)?;
        unit("device.battery_level", self.device.battery_level)?;
        if self.detectors.timeout_ms == 0 {
            return Err(EngineError::Config("detectors.timeout_ms must be > 0".into()));
        }
        if self.scheduler.history_window_mins <= 0 {
            return Err(EngineError::Config("scheduler.history_window_mins must be > 0".into()));
        }
        if self.scheduler.history_capacity <= HIGH_ALERT_EVENTS {
            return Err(EngineError::Config(format!(
                "scheduler.history_capacity must be > {}, got {}",
                HIGH_ALERT_EVENTS, self.scheduler.history_capacity
            )));
        }
        if self.events.channel_capacity == 0 {
            return Err(EngineError::Config("events.channel_capacity must be > 0".into()));
        }
        if self.learning.federated.enabled && self.learning.federated.endpoint.is_none() {
            return Err(EngineError::Config("learning.federated.endpoint required when enabled".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let c = EngineConfig::default();
        c.validate().unwrap();
        assert_eq!(c.detectors.timeout(), Duration::from_millis(250));
        assert_eq!(c.scheduler.history_window(), chrono::Duration::minutes(60));
        assert_eq!(c.learning.confidence_floor, 0.7);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"age_group":"senior","scheduler":{{"emit_threshold":0.6}}}}"#).unwrap();
        let c = EngineConfig::try_load(f.path()).unwrap();
        assert_eq!(c.age_group, AgeGroup::Senior);
        assert_eq!(c.scheduler.emit_threshold, 0.6);
        assert_eq!(c.scheduler.history_capacity, 512);
    }

    #[test]
    fn malformed_file_falls_back() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "not json").unwrap();
        assert!(matches!(EngineConfig::try_load(f.path()), Err(EngineError::Config(_))));
        assert_eq!(EngineConfig::load(f.path()).age_group, AgeGroup::Adult);
    }

    #[test]
    fn rejects_out_of_range() {
        let mut c = EngineConfig::default();
        c.scheduler.emit_threshold = 1.5;
        assert!(c.validate().is_err());
        let mut c = EngineConfig::default();
        c.learning.federated.enabled = true;
        assert!(c.validate().is_err());
    }

    #[test]
    fn history_capacity_must_fit_high_alert_tier() {
        let mut c = EngineConfig::default();
        c.scheduler.history_capacity = HIGH_ALERT_EVENTS;
        assert!(matches!(c.validate(), Err(EngineError::Config(_))));
        c.scheduler.history_capacity = HIGH_ALERT_EVENTS + 1;
        c.validate().unwrap();
    }
}
