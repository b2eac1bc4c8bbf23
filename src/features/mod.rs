//! Assessment input and statistical feature extraction.

mod lexicon;
mod pipeline;
mod sequence;

pub use lexicon::{normalize_obfuscation, scan, LexiconHits};
pub use pipeline::{FeatureExtractor, DEFAULT_FEATURE_DIM};
pub(crate) use pipeline::{is_ip_literal, url_host};
pub use sequence::SequenceStats;

use crate::protection::ProtectionDomain;
use crate::risk::{clamp_unit, ThreatType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One item to assess: a message, URL, app event, or domain signal bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentInput {
    pub id: String,
    pub ts: DateTime<Utc>,
    pub domain: ProtectionDomain,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Recent activity series for the subject (oldest first), e.g. messages per minute.
    #[serde(default)]
    pub sequence: Vec<f32>,
    /// Numeric domain signals. Keys of the form `threat.<type>` are upstream scores.
    #[serde(default)]
    pub signals: BTreeMap<String, f64>,
    /// Threat type suggested by whichever module surfaced the input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<ThreatType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<f64>,
}

impl AssessmentInput {
    pub fn new(domain: ProtectionDomain) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            domain,
            content: None,
            url: None,
            sender: None,
            sequence: Vec::new(),
            signals: BTreeMap::new(),
            hint: None,
            complexity: None,
        }
    }

    pub fn text(domain: ProtectionDomain, content: impl Into<String>) -> Self {
        let mut input = Self::new(domain);
        input.content = Some(content.into());
        input
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_sequence(mut self, sequence: Vec<f32>) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_signal(mut self, name: impl Into<String>, value: f64) -> Self {
        self.signals.insert(name.into(), value);
        self
    }

    pub fn with_hint(mut self, hint: ThreatType) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn with_complexity(mut self, complexity: f64) -> Self {
        self.complexity = Some(complexity);
        self
    }

    /// Text the lexicon detectors look at: content followed by URL.
    pub fn searchable_text(&self) -> String {
        match (&self.content, &self.url) {
            (Some(c), Some(u)) => format!("{} {}", c, u),
            (Some(c), None) => c.clone(),
            (None, Some(u)) => u.clone(),
            (None, None) => String::new(),
        }
    }

    /// Caller-supplied complexity, or an estimate from text length and link density.
    pub fn complexity_estimate(&self) -> f64 {
        if let Some(c) = self.complexity {
            return clamp_unit(c);
        }
        let text = self.content.as_deref().unwrap_or("");
        let words = text.split_whitespace().count() as f64;
        let digits = text.chars().filter(|c| c.is_ascii_digit()).count() as f64;
        let mut c = (words / 150.0).min(0.5);
        if self.url.is_some() {
            c += 0.2;
        }
        if !text.is_empty() {
            c += (digits / text.len() as f64 * 2.0).min(0.3);
        }
        clamp_unit(c)
    }

    /// Upstream score for a threat type, if a module attached one.
    pub fn upstream_score(&self, threat_type: ThreatType) -> Option<f64> {
        self.signals
            .get(&format!("threat.{}", threat_type.as_str()))
            .copied()
    }
}

/// Fixed-size feature vector (e.g. 32-dim) describing one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub dim: usize,
    pub values: Vec<f32>,
    pub input_id: String,
    pub ts: i64,
}

impl FeatureVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.values[..self.dim.min(self.values.len())]
    }
}
