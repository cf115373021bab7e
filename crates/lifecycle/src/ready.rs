//! Readiness gate
//!
//! A gate collects named pending tasks and fires exactly once: either when
//! it has been started and every task has completed, or as soon as one task
//! fails. Tasks registered after the gate fired are tracked for
//! diagnostics but never fire it again.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::LifecycleError;
use crate::events::{EventBus, LifecycleEvent};

/// Gate-wide timeout applied to tasks that do not set their own
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Final outcome delivered to every gate or lifecycle subscriber
pub type ReadyOutcome = Result<(), LifecycleError>;

type ReadyCallback = Box<dyn FnOnce(ReadyOutcome) + Send>;

/// Per-task registration options
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    /// Overrides the gate-wide timeout for this task
    pub timeout: Option<Duration>,

    /// An error from this task is published as an event instead of
    /// failing the gate
    pub is_weak_dep: bool,
}

struct PendingTask {
    name: String,
    weak: bool,
    timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct GateState {
    started: bool,
    outcome: Option<ReadyOutcome>,
    next_id: u64,
    pending: BTreeMap<u64, PendingTask>,
    callbacks: Vec<ReadyCallback>,
}

impl GateState {
    fn remaining(&self) -> Vec<String> {
        self.pending.values().map(|t| t.name.clone()).collect()
    }

    /// Mark the gate fired and hand back what must run outside the lock
    fn fire(&mut self, outcome: ReadyOutcome) -> (ReadyOutcome, Vec<ReadyCallback>) {
        self.outcome = Some(outcome.clone());
        (outcome, std::mem::take(&mut self.callbacks))
    }
}

struct GateInner {
    name: String,
    timeout: Duration,
    events: EventBus,
    state: Mutex<GateState>,
    outcome: watch::Sender<Option<ReadyOutcome>>,
}

/// Cloneable handle to one readiness gate
#[derive(Clone)]
pub struct ReadinessGate {
    inner: Arc<GateInner>,
}

impl ReadinessGate {
    pub fn new(name: impl Into<String>, timeout: Duration, events: EventBus) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            inner: Arc::new(GateInner {
                name: name.into(),
                timeout,
                events,
                state: Mutex::new(GateState::default()),
                outcome,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn register_task(&self, name: impl Into<String>) -> ReadyTask {
        self.register_task_with(name, TaskOptions::default())
    }

    /// Register one pending task; the returned token must be completed once
    pub fn register_task_with(&self, name: impl Into<String>, options: TaskOptions) -> ReadyTask {
        let name = name.into();
        let timeout = options.timeout.unwrap_or(self.inner.timeout);

        let mut state = self.inner.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        if state.outcome.is_some() {
            debug!(
                "[{}] {} registered after the gate fired, it will not fire again",
                self.inner.name, name
            );
        }

        let timer = Handle::try_current().ok().map(|handle| {
            let gate = Arc::downgrade(&self.inner);
            let task = name.clone();
            handle.spawn(watch_timeout(gate, id, task, timeout))
        });
        state.pending.insert(
            id,
            PendingTask {
                name: name.clone(),
                weak: options.is_weak_dep,
                timer,
            },
        );
        drop(state);

        debug!("[{}] registered task {} (#{})", self.inner.name, name, id);
        ReadyTask {
            gate: self.clone(),
            id,
            name,
            done: false,
        }
    }

    /// Stop collecting; fire once nothing is pending
    ///
    /// When nothing is pending yet, the check runs on the next scheduler
    /// tick so same-tick registrations are still counted.
    pub fn start(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.started {
                return;
            }
            state.started = true;
        }
        debug!("[{}] gate started", self.inner.name);

        match Handle::try_current() {
            Ok(handle) => {
                let gate = self.clone();
                handle.spawn(async move {
                    tokio::task::yield_now().await;
                    gate.check_ready();
                });
            }
            Err(_) => self.check_ready(),
        }
    }

    /// Run `callback` with the outcome, immediately if already fired
    pub fn on_ready<F>(&self, callback: F)
    where
        F: FnOnce(ReadyOutcome) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if let Some(outcome) = state.outcome.clone() {
            drop(state);
            callback(outcome);
            return;
        }
        state.callbacks.push(Box::new(callback));
    }

    /// Wait for the gate to fire
    pub async fn wait(&self) -> ReadyOutcome {
        let mut rx = self.inner.outcome.subscribe();
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| LifecycleError::GateClosed(self.inner.name.clone()))?
            .clone();
        outcome.unwrap_or(Ok(()))
    }

    pub fn outcome(&self) -> Option<ReadyOutcome> {
        self.inner.state.lock().outcome.clone()
    }

    pub fn is_fired(&self) -> bool {
        self.inner.state.lock().outcome.is_some()
    }

    pub fn is_started(&self) -> bool {
        self.inner.state.lock().started
    }

    /// Names of tasks still outstanding, in registration order
    pub fn pending(&self) -> Vec<String> {
        self.inner.state.lock().remaining()
    }

    fn check_ready(&self) {
        let fired = {
            let mut state = self.inner.state.lock();
            if state.started && state.outcome.is_none() && state.pending.is_empty() {
                Some(state.fire(Ok(())))
            } else {
                None
            }
        };
        if let Some((outcome, callbacks)) = fired {
            self.deliver(outcome, callbacks);
        }
    }

    fn complete_task(&self, id: u64, result: anyhow::Result<()>) {
        let mut state = self.inner.state.lock();
        let Some(task) = state.pending.remove(&id) else {
            debug!("[{}] task #{} already completed", self.inner.name, id);
            return;
        };
        if let Some(timer) = task.timer {
            timer.abort();
        }

        let mut fired = None;
        match result {
            Ok(()) => {}
            Err(err) => {
                let error = LifecycleError::Task {
                    gate: self.inner.name.clone(),
                    task: task.name.clone(),
                    cause: Arc::new(err),
                };
                if task.weak {
                    self.inner.events.emit(LifecycleEvent::Error(error));
                } else if state.outcome.is_some() {
                    warn!("[{}] ignoring error after gate fired: {}", self.inner.name, error);
                } else {
                    fired = Some(state.fire(Err(error)));
                }
            }
        }

        self.inner.events.emit(LifecycleEvent::ReadyStat {
            gate: self.inner.name.clone(),
            task_id: id,
            task: task.name,
            remaining: state.remaining(),
        });

        if fired.is_none() && state.started && state.outcome.is_none() && state.pending.is_empty() {
            fired = Some(state.fire(Ok(())));
        }
        drop(state);

        if let Some((outcome, callbacks)) = fired {
            self.deliver(outcome, callbacks);
        }
    }

    fn deliver(&self, outcome: ReadyOutcome, callbacks: Vec<ReadyCallback>) {
        match &outcome {
            Ok(()) => debug!("[{}] gate ready", self.inner.name),
            Err(err) => warn!("[{}] gate failed: {}", self.inner.name, err),
        }
        self.inner.outcome.send_replace(Some(outcome.clone()));
        for callback in callbacks {
            callback(outcome.clone());
        }
    }
}

async fn watch_timeout(gate: Weak<GateInner>, id: u64, task: String, timeout: Duration) {
    tokio::time::sleep(timeout).await;
    let Some(inner) = gate.upgrade() else {
        return;
    };
    let still_pending = {
        let state = inner.state.lock();
        state.outcome.is_none() && state.pending.contains_key(&id)
    };
    if still_pending {
        inner.events.emit(LifecycleEvent::ReadyTimeout {
            gate: inner.name.clone(),
            task,
            timeout,
        });
    }
}

/// Completion token for one pending task
///
/// Dropping it without completing leaves the task pending.
#[must_use = "an uncompleted ready task keeps its gate pending"]
pub struct ReadyTask {
    gate: ReadinessGate,
    id: u64,
    name: String,
    done: bool,
}

impl ReadyTask {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn complete(self) {
        self.finish(Ok(()))
    }

    pub fn fail(self, err: anyhow::Error) {
        self.finish(Err(err))
    }

    pub fn finish(mut self, result: anyhow::Result<()>) {
        self.done = true;
        self.gate.complete_task(self.id, result);
    }
}

impl Drop for ReadyTask {
    fn drop(&mut self) {
        if !self.done {
            warn!(
                "[{}] task {} (#{}) dropped without completing, the gate stays pending",
                self.gate.name(),
                self.name,
                self.id
            );
        }
    }
}
