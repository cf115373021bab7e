//! Diagnostic event bus
//!
//! Gates and the lifecycle publish timeouts, task progress and best-effort
//! failures here instead of on a shared emitter. Every event is also logged.

use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::error::LifecycleError;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// A task is still pending after its timeout elapsed
    ReadyTimeout {
        gate: String,
        task: String,
        timeout: Duration,
    },

    /// A task completed; `remaining` lists what the gate still waits for
    ReadyStat {
        gate: String,
        task_id: u64,
        task: String,
        remaining: Vec<String>,
    },

    /// A failure that does not abort the lifecycle
    Error(LifecycleError),
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Log and publish an event; having no subscribers is not an error
    pub fn emit(&self, event: LifecycleEvent) {
        match &event {
            LifecycleEvent::ReadyTimeout {
                gate,
                task,
                timeout,
            } => warn!(
                "[{}] {} still not ready after {}ms",
                gate,
                task,
                timeout.as_millis()
            ),
            LifecycleEvent::ReadyStat {
                gate,
                task_id,
                task,
                remaining,
            } => debug!(
                "[{}] {} (#{}) ready, remaining [{}]",
                gate,
                task,
                task_id,
                remaining.join(", ")
            ),
            LifecycleEvent::Error(err) => error!("{}", err),
        }
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
