//! AgeGuard engine: age-adaptive ensemble threat assessment.
//!
//! Modular structure:
//! - [`detectors`] — Detector contract, registry and built-in heuristic detectors
//! - [`features`] — Assessment input and statistical feature extraction
//! - [`risk`] — Ensemble voter and age-policy threat filter
//! - [`policy`] — Per-age-group policy table
//! - [`response`] — Age-calibrated response and notification payloads
//! - [`learning`] — Adaptive on-device and federated learning
//! - [`protection`] — Domain protection modules and system snapshots
//! - [`scheduler`] — Adaptive background scan scheduler
//! - [`storage`] — Encrypted local storage
//! - [`engine`] — Engine lifecycle and event stream
//! - [`logging`] — Structured JSON logging

pub mod config;
pub mod detectors;
pub mod engine;
pub mod error;
pub mod events;
pub mod features;
pub mod learning;
pub mod logging;
pub mod policy;
pub mod protection;
pub mod response;
pub mod risk;
pub mod scheduler;
pub mod storage;

pub use config::EngineConfig;
pub use detectors::{Detector, DetectorRegistry, DetectorResult};
pub use engine::{AgeVerifier, AssessmentOutcome, EngineStats, ThreatEngine};
pub use error::{EngineError, Result};
pub use events::ThreatEvent;
pub use features::{AssessmentInput, FeatureExtractor, FeatureVector};
pub use logging::StructuredLogger;
pub use policy::{AgeGroup, AgePolicy, PolicyTable};
pub use protection::{DetectedThreat, ProtectionDomain, ProtectionModule, SystemSnapshot};
pub use response::ThreatResponse;
pub use risk::{Recommendation, ThreatAssessment, ThreatType};
pub use storage::SecureStore;
