//! Trigger Registry
//!
//! Binds each trigger to the handler it invokes. The registry is built once at
//! startup and turned into a running [`Host`]; handlers keep no state between
//! invocations beyond what lives in storage.

use crate::timer::{TimerInfo, TimerTrigger};
use async_trait::async_trait;
use std::sync::Arc;
use storage::{ChangeFeed, ChangeNotification};
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Invoked on every timer fire
#[async_trait]
pub trait TimerHandler: Send + Sync {
    async fn on_tick(&self, info: TimerInfo);
}

/// Invoked for every committed change notification
pub trait ChangeHandler: Send + Sync {
    fn on_change(&self, event: &ChangeNotification);
}

impl ChangeHandler for change_reactor::ChangeReactor {
    fn on_change(&self, event: &ChangeNotification) {
        change_reactor::ChangeReactor::on_change(self, event)
    }
}

struct TimerBinding {
    name: String,
    trigger: TimerTrigger,
    handler: Arc<dyn TimerHandler>,
}

struct ChangeBinding {
    name: String,
    handler: Arc<dyn ChangeHandler>,
}

/// Trigger-to-handler bindings, not yet running
#[derive(Default)]
pub struct TriggerRegistry {
    timers: Vec<TimerBinding>,
    changes: Vec<ChangeBinding>,
}

impl TriggerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a timer trigger to a handler
    pub fn timer(mut self, name: &str, trigger: TimerTrigger, handler: Arc<dyn TimerHandler>) -> Self {
        self.timers.push(TimerBinding {
            name: name.to_string(),
            trigger,
            handler,
        });
        self
    }

    /// Bind the change feed to a handler
    pub fn change(mut self, name: &str, handler: Arc<dyn ChangeHandler>) -> Self {
        self.changes.push(ChangeBinding {
            name: name.to_string(),
            handler,
        });
        self
    }

    /// Number of registered functions
    pub fn len(&self) -> usize {
        self.timers.len() + self.changes.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn one task per binding
    ///
    /// Change handlers subscribe before this returns, so no notification
    /// committed after `start` is missed.
    pub fn start(self, feed: &ChangeFeed) -> Host {
        let (stop_timers, timers_rx) = watch::channel(false);
        let (stop_changes, changes_rx) = watch::channel(false);
        let mut timers = Vec::with_capacity(self.timers.len());
        let mut changes = Vec::with_capacity(self.changes.len());

        for TimerBinding { name, trigger, handler } in self.timers {
            info!("Registered timer function '{}' every {:?}", name, trigger.interval());
            let stop = timers_rx.clone();
            let task = tokio::spawn(async move { trigger.run(handler, stop).await });
            timers.push((name, task));
        }

        for ChangeBinding { name, handler } in self.changes {
            info!("Registered change function '{}'", name);
            let rx = feed.subscribe();
            let stop = changes_rx.clone();
            let task = tokio::spawn(deliver_changes(name.clone(), handler, rx, stop));
            changes.push((name, task));
        }

        Host {
            stop_timers,
            stop_changes,
            timers,
            changes,
        }
    }
}

async fn deliver_changes(
    name: String,
    handler: Arc<dyn ChangeHandler>,
    mut rx: broadcast::Receiver<ChangeNotification>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(event) => handler.on_change(&event),
                Err(RecvError::Lagged(missed)) => {
                    warn!("'{}' lagged, {} change notifications missed", name, missed);
                }
                Err(RecvError::Closed) => break,
            },
            _ = shutdown.changed() => {
                drain(&name, handler.as_ref(), &mut rx);
                break;
            }
        }
    }

    info!("Change function '{}' stopped", name);
}

/// Deliver notifications already queued when shutdown was signalled
fn drain(name: &str, handler: &dyn ChangeHandler, rx: &mut broadcast::Receiver<ChangeNotification>) {
    loop {
        match rx.try_recv() {
            Ok(event) => handler.on_change(&event),
            Err(TryRecvError::Lagged(missed)) => {
                warn!("'{}' lagged, {} change notifications missed", name, missed);
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

type Functions = Vec<(String, JoinHandle<()>)>;

/// Running functions
pub struct Host {
    stop_timers: watch::Sender<bool>,
    stop_changes: watch::Sender<bool>,
    timers: Functions,
    changes: Functions,
}

impl Host {
    /// Number of running functions
    pub fn function_count(&self) -> usize {
        self.timers.len() + self.changes.len()
    }

    /// Stop every function, waiting for in-flight invocations
    ///
    /// Timers stop first so any cycle still applying can commit; change
    /// functions then deliver what that cycle published before stopping.
    pub async fn shutdown(self) {
        info!("Stopping {} functions", self.function_count());

        let _ = self.stop_timers.send(true);
        join_all(self.timers).await;

        let _ = self.stop_changes.send(true);
        join_all(self.changes).await;
    }
}

async fn join_all(functions: Functions) {
    for (name, task) in functions {
        if let Err(e) = task.await {
            error!("Function '{}' terminated abnormally: {}", name, e);
        }
    }
}
