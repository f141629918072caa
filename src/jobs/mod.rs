use crate::context::ClientContext;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::info;

pub mod tasks;

/// Job scheduler for background cache maintenance
pub struct TrimScheduler {
    context: ClientContext,
    every: Duration,
    max_age_secs: u64,
}

impl TrimScheduler {
    /// Scheduler using the configured trim interval and maximum age
    pub fn new(context: ClientContext) -> Self {
        let jobs = context.config().jobs.clone();
        Self::with_schedule(context, Duration::from_secs(jobs.trim_interval_secs), jobs.trim_max_age_secs)
    }

    pub fn with_schedule(context: ClientContext, every: Duration, max_age_secs: u64) -> Self {
        Self {
            context,
            every: every.max(Duration::from_millis(1)),
            max_age_secs,
        }
    }

    /// Start the trim job; abort the returned handle to stop it
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        info!(
            "Starting cache trim job (every {:?}, max age {}s)",
            self.every, self.max_age_secs
        );
        tokio::spawn(Self::trim_job(self))
    }

    async fn trim_job(scheduler: Arc<Self>) {
        let mut interval = interval(scheduler.every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;

            let dropped = tasks::trim_cache(&scheduler.context, scheduler.max_age_secs).await;
            if dropped > 0 {
                info!("Trimmed {} stale cache entries", dropped);
            } else {
                info!("Cache trim: no stale entries found");
            }
        }
    }
}
