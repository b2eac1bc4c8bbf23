//! Background scan scheduler: adaptive cadence, cancellable, never overlapping.

use crate::error::EngineError;
use crate::policy::AgePolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const HIGH_ALERT_INTERVAL: Duration = Duration::from_secs(30);
pub const ELEVATED_INTERVAL: Duration = Duration::from_secs(120);
/// High-severity events in the window above which scans switch to `HIGH_ALERT_INTERVAL`.
pub const HIGH_ALERT_EVENTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CadenceTier {
    HighAlert,
    Elevated,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub tier: CadenceTier,
    pub interval: Duration,
}

impl Cadence {
    /// Tier from the rolling count of high-severity events in the last window.
    pub fn select(high_severity_events: usize, policy: &AgePolicy) -> Self {
        match high_severity_events {
            n if n > HIGH_ALERT_EVENTS => Cadence {
                tier: CadenceTier::HighAlert,
                interval: HIGH_ALERT_INTERVAL,
            },
            5..=HIGH_ALERT_EVENTS => Cadence {
                tier: CadenceTier::Elevated,
                interval: ELEVATED_INTERVAL,
            },
            _ => Cadence {
                tier: CadenceTier::Default,
                interval: policy.default_scan_interval(),
            },
        }
    }
}

/// Work performed by the scheduler once per tick.
#[async_trait]
pub trait ScanTick: Send + Sync + 'static {
    /// Consulted after every tick to decide how long to wait for the next one.
    fn next_cadence(&self) -> Cadence;

    async fn tick(&self);
}

#[derive(Debug, Default)]
pub struct SchedulerStats {
    ticks: AtomicU64,
    skipped: AtomicU64,
    last_interval_ms: AtomicU64,
}

impl SchedulerStats {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn last_interval(&self) -> Duration {
        Duration::from_millis(self.last_interval_ms.load(Ordering::Relaxed))
    }
}

/// Clears the in-flight flag when a tick finishes, including by panic.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
    stats: Arc<SchedulerStats>,
}

impl SchedulerHandle {
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Signal the loop to stop without waiting for it.
    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Stop the loop. A tick already running is left to finish on its own.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            warn!(error = %e, "scheduler task ended abnormally");
        }
    }
}

pub struct ScanScheduler;

impl ScanScheduler {
    /// Spawn the loop. The first tick runs immediately; each later tick is due one
    /// cadence interval after the previous one started.
    pub fn spawn(ticker: Arc<dyn ScanTick>, stats: Arc<SchedulerStats>) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let loop_stats = Arc::clone(&stats);
        let join = tokio::spawn(async move {
            let in_flight = Arc::new(AtomicBool::new(false));
            let mut tier: Option<CadenceTier> = None;
            info!("scan scheduler started");
            loop {
                if in_flight.swap(true, Ordering::AcqRel) {
                    loop_stats.skipped.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %EngineError::ScheduleOverrun, "scan tick skipped");
                } else {
                    loop_stats.ticks.fetch_add(1, Ordering::Relaxed);
                    let guard = InFlight(Arc::clone(&in_flight));
                    let t = Arc::clone(&ticker);
                    tokio::spawn(async move {
                        let _guard = guard;
                        t.tick().await;
                    });
                }

                let cadence = ticker.next_cadence();
                if tier != Some(cadence.tier) {
                    info!(tier = ?cadence.tier, interval_secs = cadence.interval.as_secs(), "scan cadence changed");
                    tier = Some(cadence.tier);
                }
                loop_stats
                    .last_interval_ms
                    .store(cadence.interval.as_millis() as u64, Ordering::Relaxed);

                tokio::select! {
                    _ = tokio::time::sleep(cadence.interval) => {}
                    _ = shutdown_rx.changed() => break,
                }
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            debug!("scan scheduler stopped");
        });
        SchedulerHandle {
            shutdown: shutdown_tx,
            join,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{AgeGroup, PolicyTable};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[test]
    fn cadence_tiers() {
        let table = PolicyTable::standard();
        let adult = table.get(AgeGroup::Adult);
        assert_eq!(Cadence::select(11, adult).interval, Duration::from_secs(30));
        assert_eq!(Cadence::select(10, adult).interval, Duration::from_secs(120));
        assert_eq!(Cadence::select(5, adult).tier, CadenceTier::Elevated);
        assert_eq!(Cadence::select(4, adult).interval, Duration::from_secs(300));
        assert_eq!(Cadence::select(0, adult).interval, Duration::from_secs(300));
        let child = table.get(AgeGroup::Child);
        assert_eq!(Cadence::select(0, child).interval, Duration::from_secs(60));
    }

    struct Counting {
        runs: AtomicUsize,
        work: Duration,
        cadence: Mutex<Cadence>,
    }

    #[async_trait]
    impl ScanTick for Counting {
        fn next_cadence(&self) -> Cadence {
            *self.cadence.lock().unwrap()
        }

        async fn tick(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.work).await;
        }
    }

    fn counting(work: Duration, every: Duration) -> Arc<Counting> {
        Arc::new(Counting {
            runs: AtomicUsize::new(0),
            work,
            cadence: Mutex::new(Cadence {
                tier: CadenceTier::Default,
                interval: every,
            }),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_on_interval_until_stopped() {
        let t = counting(Duration::from_millis(1), Duration::from_secs(60));
        let stats = Arc::new(SchedulerStats::default());
        let handle = ScanScheduler::spawn(t.clone(), stats.clone());

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(t.runs.load(Ordering::SeqCst), 3);
        handle.stop().await;

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(t.runs.load(Ordering::SeqCst), 3);
        assert_eq!(stats.skipped(), 0);
        assert_eq!(stats.last_interval(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_tick_skips_next() {
        let t = counting(Duration::from_secs(45), Duration::from_secs(30));
        let stats = Arc::new(SchedulerStats::default());
        let handle = ScanScheduler::spawn(t.clone(), stats.clone());

        // Ticks due at 0, 30, 60, 90: 0 runs to 45 so 30 is skipped; 60 runs to 105
        // so 90 is skipped.
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(t.runs.load(Ordering::SeqCst), 2);
        assert_eq!(stats.skipped(), 2);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cadence_is_reevaluated_every_tick() {
        let t = counting(Duration::from_millis(1), Duration::from_secs(300));
        let stats = Arc::new(SchedulerStats::default());
        let handle = ScanScheduler::spawn(t.clone(), stats.clone());
        tokio::task::yield_now().await;
        *t.cadence.lock().unwrap() = Cadence {
            tier: CadenceTier::HighAlert,
            interval: HIGH_ALERT_INTERVAL,
        };
        // First wait was chosen before the change; subsequent ones use 30s.
        tokio::time::sleep(Duration::from_secs(300 + 65)).await;
        assert_eq!(t.runs.load(Ordering::SeqCst), 4);
        handle.stop().await;
    }
}
