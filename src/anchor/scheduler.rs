/// Periodic single-flight driver for reconciler ticks.
///
/// The scheduler is either Idle or Running. A timer firing while a tick is
/// still Running is dropped rather than queued. Shutdown is observed between
/// ticks; an in-flight tick always runs to completion.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::pass::Reconciler;

/// Default tick period.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);

/// One unit of periodic work.
#[async_trait]
pub trait TickJob: Send + Sync + 'static {
    async fn tick(&self);
}

#[async_trait]
impl TickJob for Reconciler {
    async fn tick(&self) {
        match self.run_tick().await {
            Ok(outcomes) => debug!(passes = outcomes.len(), "Tick complete"),
            Err(e) => error!(error = %e, "Tick failed, retrying next period"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub period: Duration,
    /// Run the first tick immediately instead of after one period.
    pub run_immediately: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            run_immediately: false,
        }
    }
}

/// Returns the scheduler to Idle when a tick task ends, including by panic.
struct IdleOnDrop(Arc<AtomicBool>);

impl Drop for IdleOnDrop {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Scheduler<J: TickJob> {
    job: Arc<J>,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl<J: TickJob> Scheduler<J> {
    pub fn new(job: Arc<J>, config: SchedulerConfig) -> Self {
        Self {
            job,
            config,
            running: Arc::new(AtomicBool::new(false)),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Ticks dropped because the previous one was still running.
    pub fn dropped_ticks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Loop until `shutdown` flips to `true` (or its sender is dropped).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(period = ?self.config.period, "Anchoring scheduler started");

        let mut interval = tokio::time::interval(self.config.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !self.config.run_immediately {
            // The first tick of a tokio interval completes at once.
            interval.tick().await;
        }

        let mut in_flight: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Some(handle) = in_flight.take_if(|h| h.is_finished()) {
                        if let Err(e) = handle.await {
                            error!(error = %e, "Previous tick panicked");
                        }
                    }

                    if self.running.swap(true, Ordering::SeqCst) {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        debug!("Previous tick still running, dropping this one");
                        continue;
                    }

                    let job = Arc::clone(&self.job);
                    let running = Arc::clone(&self.running);
                    in_flight = Some(tokio::spawn(async move {
                        let _idle = IdleOnDrop(running);
                        job.tick().await;
                    }));
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Some(handle) = in_flight {
            if !handle.is_finished() {
                info!("Waiting for in-flight tick to finish");
            }
            if let Err(e) = handle.await {
                error!(error = %e, "Tick task panicked");
            }
        }

        info!("Anchoring scheduler stopped");
    }
}
