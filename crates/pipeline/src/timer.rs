//! Interval Timer Trigger

use crate::registry::TimerHandler;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

/// Context handed to a timer handler on each fire
#[derive(Debug, Clone)]
pub struct TimerInfo {
    pub invocation_id: Uuid,
    pub fired_at: DateTime<Utc>,
    /// How long after its scheduled instant this fire ran
    pub lateness: Duration,
    pub past_due: bool,
}

/// Whether a fire ran late enough to count as past due
///
/// A fire is past due once it runs more than half an interval after the
/// instant it was scheduled for.
pub fn is_past_due(lateness: Duration, interval: Duration) -> bool {
    lateness > interval / 2
}

/// Fires its handler on a fixed interval
#[derive(Debug, Clone)]
pub struct TimerTrigger {
    interval: Duration,
    run_on_startup: bool,
}

impl TimerTrigger {
    /// Create a trigger with the given period
    pub fn new(interval: Duration, run_on_startup: bool) -> Self {
        Self {
            interval,
            run_on_startup,
        }
    }

    /// Period between fires
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Fire until shutdown is signalled
    ///
    /// The handler is awaited before the next tick is taken, so fires never
    /// overlap. Ticks missed while a handler runs are skipped.
    pub(crate) async fn run(&self, handler: Arc<dyn TimerHandler>, mut shutdown: watch::Receiver<bool>) {
        let start = if self.run_on_startup {
            Instant::now()
        } else {
            Instant::now() + self.interval
        };

        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Timer started with {:?} interval", self.interval);

        loop {
            tokio::select! {
                scheduled = ticker.tick() => {
                    let lateness = Instant::now().saturating_duration_since(scheduled);
                    let info = TimerInfo {
                        invocation_id: Uuid::new_v4(),
                        fired_at: Utc::now(),
                        lateness,
                        past_due: is_past_due(lateness, self.interval),
                    };
                    debug!("Timer fired ({:?} late)", lateness);
                    handler.on_tick(info).await;
                }
                _ = shutdown.changed() => break,
            }
        }

        info!("Timer stopped");
    }
}
