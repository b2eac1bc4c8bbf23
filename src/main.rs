//! AgeGuard daemon: offline-first background threat scanning with an ndjson event log.
//! Runs the scan scheduler until Ctrl+C; every emitted threat event is written to stdout.

use ageguard_engine::{
    config::EngineConfig,
    logging::{StructuredLogger, ThreatLogLine},
    protection::{ObservationQueue, SysinfoSnapshotSource},
    storage::SecureStore,
    ThreatEngine,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, Notify};
use tracing::{info, warn};

const RETENTION_DAYS: i64 = 30;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::var("AGEGUARD_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"));
    let config = EngineConfig::load(&config_path);

    StructuredLogger::init(config.log.json, &config.log.level);

    info!(data_dir = ?config.data_dir, age_group = config.age_group.as_str(), "AgeGuard engine starting");

    std::fs::create_dir_all(&config.data_dir)?;
    let store_path = config.data_dir.join("store.db");
    let secret = b"device-secret-placeholder"; // In production: from Secure Enclave / Keystore
    let store = Arc::new(
        SecureStore::open(&store_path, secret)?.with_sample_limit(config.learning.max_local_samples as u64),
    );
    let cutoff = chrono::Utc::now() - chrono::Duration::days(RETENTION_DAYS);
    match store.prune_before(cutoff.timestamp_millis()) {
        Ok(n) if n > 0 => info!(removed = n, "retention prune"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "retention prune failed"),
    }

    let observations = Arc::new(ObservationQueue::default());
    let engine = ThreatEngine::builder(config)
        .store(store)
        .snapshot_source(Arc::new(SysinfoSnapshotSource::new(observations)))
        .build()?;

    let mut events = engine.subscribe();
    let writer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ev) => {
                    let mut out = std::io::stdout().lock();
                    StructuredLogger::emit_json(&ThreatLogLine::from_event(&ev), &mut out);
                }
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "event log lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let stop = Arc::new(Notify::new());
    let on_signal = Arc::clone(&stop);
    ctrlc::set_handler(move || on_signal.notify_one())?;

    engine.start()?;
    info!("daemon mode (Ctrl+C to stop)");
    stop.notified().await;

    engine.shutdown().await;
    let _ = writer.await;
    let stats = engine.stats();
    info!(
        assessments = stats.assessments,
        events = stats.events_emitted,
        ticks = stats.ticks,
        skipped = stats.skipped_ticks,
        "AgeGuard engine stopped"
    );
    Ok(())
}
