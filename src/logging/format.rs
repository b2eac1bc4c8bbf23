//! JSON log lines: one JSON object per line (ndjson) for ingestion and audit.

use crate::events::ThreatEvent;
use serde::Serialize;
use std::io::Write;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Audit record for one emitted threat event.
#[derive(Serialize)]
pub struct ThreatLogLine<'a> {
    pub ts: String,
    pub level: &'a str,
    pub event_id: &'a str,
    pub age_group: &'a str,
    pub domain: &'a str,
    pub threat_type: &'a str,
    pub threat_level: f64,
    pub confidence: f64,
    pub recommendation: &'a str,
    pub action: &'a str,
    pub parental_notification: bool,
    pub family_notification: bool,
}

impl<'a> ThreatLogLine<'a> {
    pub fn from_event(event: &'a ThreatEvent) -> Self {
        let a = &event.assessment;
        Self {
            ts: event.ts.to_rfc3339(),
            level: if a.recommendation.is_blocking() { "warn" } else { "info" },
            event_id: &event.id,
            age_group: event.age_group.as_str(),
            domain: event.domain.as_str(),
            threat_type: a.threat_type.as_str(),
            threat_level: a.threat_level,
            confidence: a.confidence,
            recommendation: a.recommendation.as_str(),
            action: event.response.action.as_str(),
            parental_notification: a.annotations.parental_notification,
            family_notification: a.annotations.family_notification,
        }
    }
}

/// Initialize tracing with JSON format (one JSON object per line)
pub struct StructuredLogger;

impl StructuredLogger {
    /// Install global subscriber: JSON lines to stdout, level from RUST_LOG or default.
    pub fn init(json: bool, default_level: &str) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        if json {
            let fmt = tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(FmtSpan::NONE)
                .with_writer(std::io::stdout);
            let _ = tracing_subscriber::registry().with(filter).with(fmt).try_init();
        } else {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
                .try_init();
        }
    }

    /// Emit a single structured log line without going through tracing
    pub fn emit_json(event: &impl Serialize, w: &mut impl Write) {
        if let Ok(line) = serde_json::to_string(event) {
            let _ = writeln!(w, "{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::tests::event_at;

    #[test]
    fn one_line_per_event() {
        let ev = event_at(0.9, chrono::Utc::now());
        let mut out = Vec::new();
        StructuredLogger::emit_json(&ThreatLogLine::from_event(&ev), &mut out);
        StructuredLogger::emit_json(&ThreatLogLine::from_event(&ev), &mut out);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
        let v: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(v["threat_type"], "scam");
        assert_eq!(v["event_id"], ev.id.as_str());
        assert_eq!(v["level"], "warn");
    }
}
