//! Feature extraction pipeline: input → text/url/sequence/signal stats → vector.

use super::{scan, AssessmentInput, FeatureVector, SequenceStats};
use crate::risk::ThreatType;

pub const DEFAULT_FEATURE_DIM: usize = 32;

#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    dim: usize,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_FEATURE_DIM)
    }
}

impl FeatureExtractor {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn extract(&self, input: &AssessmentInput) -> FeatureVector {
        let text = input.content.as_deref().unwrap_or("");
        let chars = text.chars().count().max(1) as f32;
        let upper = text.chars().filter(|c| c.is_uppercase()).count() as f32;
        let digits = text.chars().filter(|c| c.is_ascii_digit()).count() as f32;
        let bangs = text.chars().filter(|c| *c == '!').count() as f32;
        let words = text.split_whitespace().count() as f32;

        let url = input.url.as_deref().unwrap_or("");
        let host = url_host(url);
        let seq = SequenceStats::from_series(&input.sequence);
        let hits = scan(&input.searchable_text());

        let mut raw: Vec<f32> = vec![
            (text.len() as f32 / 1000.0).min(1.0),
            (words / 200.0).min(1.0),
            upper / chars,
            digits / chars,
            (bangs / 10.0).min(1.0),
            if url.is_empty() { 0.0 } else { 1.0 },
            (url.len() as f32 / 200.0).min(1.0),
            if is_ip_literal(host) { 1.0 } else { 0.0 },
            if url.contains('@') { 1.0 } else { 0.0 },
            (host.matches('.').count() as f32 / 5.0).min(1.0),
            (seq.len as f32 / 50.0).min(1.0),
            (seq.burst_z / 10.0).clamp(-1.0, 1.0),
            seq.trend.clamp(-1.0, 1.0),
            (input.signals.len() as f32 / 10.0).min(1.0),
            input.complexity_estimate() as f32,
        ];
        for t in ThreatType::ALL.iter().filter(|t| **t != ThreatType::Unknown) {
            raw.push((hits.count(*t) as f32 / 3.0).min(1.0));
        }

        // Pad or truncate to dim
        let mut values = vec![0.0f32; self.dim];
        let copy = raw.len().min(self.dim);
        values[..copy].copy_from_slice(&raw[..copy]);
        FeatureVector {
            dim: self.dim,
            values,
            input_id: input.id.clone(),
            ts: input.ts.timestamp_millis(),
        }
    }
}

pub(crate) fn url_host(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host_port = authority.rsplit('@').next().unwrap_or(authority);
    host_port.split(':').next().unwrap_or(host_port)
}

pub(crate) fn is_ip_literal(host: &str) -> bool {
    host.parse::<std::net::IpAddr>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protection::ProtectionDomain;

    #[test]
    fn vector_has_configured_dim() {
        let input = AssessmentInput::text(ProtectionDomain::Communication, "hello there");
        let fv = FeatureExtractor::new(8).extract(&input);
        assert_eq!(fv.dim, 8);
        assert_eq!(fv.values.len(), 8);
        let wide = FeatureExtractor::new(64).extract(&input);
        assert_eq!(wide.values.len(), 64);
        assert_eq!(wide.input_id, input.id);
    }

    #[test]
    fn values_are_bounded() {
        let input = AssessmentInput::text(
            ProtectionDomain::Communication,
            "WIN!!! You have won a gift card!!! Claim your prize 1234567",
        )
        .with_url("http://user@203.0.113.9/claim")
        .with_sequence(vec![1.0, 1.0, 40.0]);
        let fv = FeatureExtractor::default().extract(&input);
        assert!(fv.as_slice().iter().all(|v| (-1.0..=1.0).contains(v)));
        assert_eq!(fv.values[7], 1.0, "ip literal host");
        assert_eq!(fv.values[8], 1.0, "userinfo in url");
    }

    #[test]
    fn host_parsing() {
        assert_eq!(url_host("https://a.b.example.com:8443/x?y"), "a.b.example.com");
        assert_eq!(url_host("http://me@10.0.0.1/login"), "10.0.0.1");
        assert_eq!(url_host("example.org/path"), "example.org");
        assert!(is_ip_literal("10.0.0.1"));
        assert!(!is_ip_literal("example.org"));
    }
}
