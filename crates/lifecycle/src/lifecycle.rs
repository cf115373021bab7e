//! Phased boot lifecycle
//!
//! Drives the registered boot hooks through
//! `config_will_load -> config_did_load -> did_load -> will_ready -> ready
//! -> did_ready -> server_did_ready`, then tears down in reverse on close.
//! `did_load` and `will_ready` each wait on their own readiness gate; the
//! load gate firing starts the boot phase.

use anyhow::{anyhow, Result};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{watch, OnceCell};
use tracing::{debug, error, info, warn};

use crate::error::LifecycleError;
use crate::events::{EventBus, LifecycleEvent};
use crate::hook::{BootHook, FunctionHook, Phase};
use crate::ready::{ReadinessGate, ReadyOutcome, ReadyTask, TaskOptions, DEFAULT_READY_TIMEOUT};
use crate::timing::{BootTiming, TimingRecord};

/// Position in the boot state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Created,
    ConfigWillLoad,
    ConfigDidLoad,
    DidLoad,
    WillReady,
    Ready,
    DidReady,
    ServerDidReady,
    Closing,
    Closed,
    /// Startup failed; the error was delivered through `ready()`
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecycleState::Created => "created",
            LifecycleState::ConfigWillLoad => "config_will_load",
            LifecycleState::ConfigDidLoad => "config_did_load",
            LifecycleState::DidLoad => "did_load",
            LifecycleState::WillReady => "will_ready",
            LifecycleState::Ready => "ready",
            LifecycleState::DidReady => "did_ready",
            LifecycleState::ServerDidReady => "server_did_ready",
            LifecycleState::Closing => "closing",
            LifecycleState::Closed => "closed",
            LifecycleState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Construction options for [`Lifecycle`]
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Gate-wide task timeout
    pub ready_timeout: Duration,

    /// Diagnostic event sink
    pub events: EventBus,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            ready_timeout: DEFAULT_READY_TIMEOUT,
            events: EventBus::new(),
        }
    }
}

type CloseFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;
type ReadyCallback = Box<dyn FnOnce(ReadyOutcome) + Send>;

struct CloseAction {
    name: String,
    run: CloseFn,
}

#[derive(Clone)]
struct NamedHook {
    name: String,
    hook: Arc<dyn BootHook>,
}

struct Inner {
    events: EventBus,
    hooks: Mutex<Vec<NamedHook>>,
    initialized: AtomicBool,
    booted: AtomicBool,
    state: Mutex<LifecycleState>,
    load_gate: ReadinessGate,
    boot_gate: ReadinessGate,
    ready_tx: watch::Sender<Option<ReadyOutcome>>,
    ready_callbacks: Mutex<Vec<ReadyCallback>>,
    closing: AtomicBool,
    close_actions: Mutex<Vec<CloseAction>>,
    close_outcome: OnceCell<Result<(), LifecycleError>>,
    timing: BootTiming,
}

/// Cloneable handle to one application's lifecycle
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<Inner>,
}

impl Lifecycle {
    pub fn new(options: LifecycleOptions) -> Self {
        let (ready_tx, _) = watch::channel(None);
        let inner = Arc::new(Inner {
            load_gate: ReadinessGate::new("load", options.ready_timeout, options.events.clone()),
            boot_gate: ReadinessGate::new("boot", options.ready_timeout, options.events.clone()),
            events: options.events,
            hooks: Mutex::new(Vec::new()),
            initialized: AtomicBool::new(false),
            booted: AtomicBool::new(false),
            state: Mutex::new(LifecycleState::Created),
            ready_tx,
            ready_callbacks: Mutex::new(Vec::new()),
            closing: AtomicBool::new(false),
            close_actions: Mutex::new(Vec::new()),
            close_outcome: OnceCell::new(),
            timing: BootTiming::new(),
        });

        let weak = Arc::downgrade(&inner);
        inner.load_gate.on_ready(move |outcome| {
            if let Some(lifecycle) = upgrade(&weak) {
                lifecycle.inner.timing.end_named(Phase::DidLoad.as_str());
                match outcome {
                    Ok(()) => lifecycle.trigger_will_ready(),
                    Err(err) => lifecycle.settle(Err(err)),
                }
            }
        });

        let weak = Arc::downgrade(&inner);
        inner.boot_gate.on_ready(move |outcome| {
            if let Some(lifecycle) = upgrade(&weak) {
                lifecycle.inner.timing.end_named(Phase::WillReady.as_str());
                match outcome {
                    Ok(()) => {
                        lifecycle.advance(LifecycleState::Ready);
                        lifecycle.settle(Ok(()));
                        lifecycle.trigger_did_ready();
                    }
                    Err(err) => lifecycle.settle(Err(err)),
                }
            }
        });

        Self { inner }
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn state(&self) -> LifecycleState {
        *self.inner.state.lock()
    }

    pub fn timing(&self) -> Vec<TimingRecord> {
        self.inner.timing.records()
    }

    pub fn load_gate(&self) -> &ReadinessGate {
        &self.inner.load_gate
    }

    pub fn boot_gate(&self) -> &ReadinessGate {
        &self.inner.boot_gate
    }

    /// Names of registered hooks in registration order
    pub fn hook_names(&self) -> Vec<String> {
        self.inner.hooks.lock().iter().map(|h| h.name.clone()).collect()
    }

    /// Append a boot hook; rejected once the lifecycle was initialized
    pub fn add_boot_hook(
        &self,
        name: impl Into<String>,
        hook: Arc<dyn BootHook>,
    ) -> Result<(), LifecycleError> {
        if self.inner.initialized.load(Ordering::SeqCst) {
            return Err(LifecycleError::AlreadyInitialized);
        }
        let name = name.into();
        debug!("Adding boot hook {}", name);
        self.inner.hooks.lock().push(NamedHook { name, hook });
        Ok(())
    }

    /// Add a plain function run at `config_did_load`
    pub fn add_function_hook<F>(&self, name: impl Into<String>, func: F) -> Result<(), LifecycleError>
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.add_boot_hook(name, Arc::new(FunctionHook::new(func)))
    }

    /// Freeze the hook list
    pub fn init(&self) -> Result<(), LifecycleError> {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            return Err(LifecycleError::AlreadyInitialized);
        }
        info!("Lifecycle initialized with {} boot hooks", self.inner.hooks.lock().len());
        Ok(())
    }

    /// Register a task on the load gate
    pub fn ready_callback(&self, name: impl Into<String>, options: TaskOptions) -> ReadyTask {
        self.inner.load_gate.register_task_with(name, options)
    }

    /// Run `func` now as one load gate task
    pub fn register_before_start<F, Fut>(&self, name: impl Into<String>, func: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let task = self.inner.load_gate.register_task(name.clone());
        self.spawn_task(task, name, async move { func().await });
    }

    /// Register a teardown action; actions run in reverse order on close
    pub fn register_before_close<F, Fut>(
        &self,
        name: impl Into<String>,
        func: F,
    ) -> Result<(), LifecycleError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let mut actions = self.inner.close_actions.lock();
        if self.inner.closing.load(Ordering::SeqCst) {
            return Err(LifecycleError::Closed);
        }
        let name = name.into();
        debug!("Registering before_close action {}", name);
        actions.push(CloseAction {
            name,
            run: Box::new(move || -> BoxFuture<'static, Result<()>> { Box::pin(func()) }),
        });
        Ok(())
    }

    /// Run every hook's `config_will_load` in order
    fn trigger_config_will_load(&self) -> Result<(), LifecycleError> {
        self.advance(LifecycleState::ConfigWillLoad);
        let phase = self.inner.timing.start(Phase::ConfigWillLoad.as_str());
        for NamedHook { name, hook } in self.hooks() {
            let step = self.inner.timing.start(format!("{}.{}", name, Phase::ConfigWillLoad));
            let result = hook.config_will_load();
            self.inner.timing.end(step);
            if let Err(err) = result {
                self.inner.timing.end(phase);
                return Err(self.fail_hook(Phase::ConfigWillLoad, name, err));
            }
        }
        self.inner.timing.end(phase);
        Ok(())
    }

    /// Run every hook's `config_did_load` in order
    ///
    /// A hook's `before_close` is registered once its `config_did_load`
    /// succeeded, so hooks after a failing one never register teardown.
    fn trigger_config_did_load(&self) -> Result<(), LifecycleError> {
        self.advance(LifecycleState::ConfigDidLoad);
        let phase = self.inner.timing.start(Phase::ConfigDidLoad.as_str());
        for NamedHook { name, hook } in self.hooks() {
            let step = self.inner.timing.start(format!("{}.{}", name, Phase::ConfigDidLoad));
            let result = hook.config_did_load();
            self.inner.timing.end(step);
            if let Err(err) = result {
                self.inner.timing.end(phase);
                return Err(self.fail_hook(Phase::ConfigDidLoad, name, err));
            }
            if let Err(err) = self.register_before_close(name.clone(), move || async move {
                hook.before_close().await
            }) {
                self.inner.timing.end(phase);
                return Err(err);
            }
        }
        self.inner.timing.end(phase);
        Ok(())
    }

    /// Start every hook's `did_load` as a load gate task, then start the gate
    fn trigger_did_load(&self) {
        self.advance(LifecycleState::DidLoad);
        self.inner.timing.start(Phase::DidLoad.as_str());
        for NamedHook { name, hook } in self.hooks() {
            let task_name = format!("{}.{}", name, Phase::DidLoad);
            let task = self.inner.load_gate.register_task(task_name.clone());
            self.spawn_task(task, task_name, async move { hook.did_load().await });
        }
        self.inner.load_gate.start();
    }

    fn trigger_will_ready(&self) {
        self.advance(LifecycleState::WillReady);
        self.inner.timing.start(Phase::WillReady.as_str());
        for NamedHook { name, hook } in self.hooks() {
            let task_name = format!("{}.{}", name, Phase::WillReady);
            let task = self.inner.boot_gate.register_task(task_name.clone());
            self.spawn_task(task, task_name, async move { hook.will_ready().await });
        }
        self.inner.boot_gate.start();
    }

    fn trigger_did_ready(&self) {
        let lifecycle = self.clone();
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    lifecycle.advance(LifecycleState::DidReady);
                    lifecycle
                        .fan_out(Phase::DidReady, |hook| async move { hook.did_ready().await })
                        .await;
                });
            }
            Err(_) => warn!("No async runtime available, skipping did_ready hooks"),
        }
    }

    /// Run every hook's `server_did_ready`; failures become events
    pub async fn trigger_server_did_ready(&self) {
        self.advance(LifecycleState::ServerDidReady);
        self.fan_out(Phase::ServerDidReady, |hook| async move {
            hook.server_did_ready().await
        })
        .await;
    }

    async fn fan_out<F, Fut>(&self, phase: Phase, call: F)
    where
        F: Fn(Arc<dyn BootHook>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let timing = &self.inner.timing;
        let phase_step = timing.start(phase.as_str());
        let calls = self.hooks().into_iter().map(|NamedHook { name, hook }| {
            let fut = call(hook);
            async move {
                let label = format!("{}.{}", name, phase);
                let step = timing.start(label.clone());
                let result = unwind_to_error(&label, fut).await;
                timing.end(step);
                (name, result)
            }
        });

        for (name, result) in join_all(calls).await {
            if let Err(err) = result {
                self.inner.events.emit(LifecycleEvent::Error(LifecycleError::Hook {
                    phase,
                    hook: name,
                    cause: Arc::new(err),
                }));
            }
        }
        timing.end(phase_step);
    }

    /// Run the startup phases up to the load gate
    ///
    /// The remaining phases advance as the gates fire; await [`ready`]
    /// for the outcome. A `config_*` failure is returned here and also
    /// delivered through `ready()`. Only the first call boots.
    ///
    /// [`ready`]: Lifecycle::ready
    pub fn boot(&self) -> Result<(), LifecycleError> {
        if self.inner.booted.swap(true, Ordering::SeqCst) {
            return Err(LifecycleError::AlreadyBooted);
        }
        if !self.inner.initialized.load(Ordering::SeqCst) {
            self.init()?;
        }
        info!("Booting lifecycle");
        self.trigger_config_will_load()?;
        self.trigger_config_did_load()?;
        self.trigger_did_load();
        Ok(())
    }

    /// Push a failure raised outside the phases into the readiness signal
    pub fn abort(&self, err: anyhow::Error) -> LifecycleError {
        let error = LifecycleError::Startup {
            cause: Arc::new(err),
        };
        self.settle(Err(error.clone()));
        error
    }

    /// Wait for the startup outcome; late callers get the same outcome
    pub async fn ready(&self) -> ReadyOutcome {
        let mut rx = self.inner.ready_tx.subscribe();
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| LifecycleError::GateClosed("lifecycle".to_string()))?
            .clone();
        outcome.unwrap_or(Ok(()))
    }

    /// Run `callback` with the startup outcome, immediately if known
    pub fn on_ready<F>(&self, callback: F)
    where
        F: FnOnce(ReadyOutcome) + Send + 'static,
    {
        let mut callbacks = self.inner.ready_callbacks.lock();
        let current = self.inner.ready_tx.borrow().clone();
        match current {
            Some(outcome) => {
                drop(callbacks);
                callback(outcome);
            }
            None => callbacks.push(Box::new(callback)),
        }
    }

    /// Whether the startup outcome is known
    pub fn is_settled(&self) -> bool {
        self.inner.ready_tx.borrow().is_some()
    }

    /// Run teardown once; later calls return the memoized outcome
    pub async fn close(&self) -> Result<(), LifecycleError> {
        self.inner
            .close_outcome
            .get_or_init(|| self.run_close())
            .await
            .clone()
    }

    async fn run_close(&self) -> Result<(), LifecycleError> {
        let actions = {
            let mut actions = self.inner.close_actions.lock();
            self.inner.closing.store(true, Ordering::SeqCst);
            std::mem::take(&mut *actions)
        };
        self.set_state(LifecycleState::Closing);
        info!("Closing lifecycle, {} teardown actions", actions.len());

        let phase = self.inner.timing.start(Phase::BeforeClose.as_str());
        for CloseAction { name, run } in actions.into_iter().rev() {
            debug!("Running before_close action {}", name);
            let step = self.inner.timing.start(format!("{}.{}", name, Phase::BeforeClose));
            let result = run().await;
            self.inner.timing.end(step);
            if let Err(err) = result {
                let error = LifecycleError::Close {
                    action: name,
                    cause: Arc::new(err),
                };
                error!("{}", error);
                self.set_state(LifecycleState::Closed);
                return Err(error);
            }
        }
        self.inner.timing.end(phase);
        self.set_state(LifecycleState::Closed);
        info!("Lifecycle closed");
        Ok(())
    }

    fn hooks(&self) -> Vec<NamedHook> {
        self.inner.hooks.lock().clone()
    }

    fn spawn_task<Fut>(&self, task: ReadyTask, name: String, fut: Fut)
    where
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        match Handle::try_current() {
            Ok(handle) => {
                let lifecycle = Arc::downgrade(&self.inner);
                handle.spawn(async move {
                    let step = upgrade(&lifecycle).map(|l| l.inner.timing.start(name.clone()));
                    let result = unwind_to_error(&name, fut).await;
                    if let (Some(step), Some(lifecycle)) = (step, upgrade(&lifecycle)) {
                        lifecycle.inner.timing.end(step);
                    }
                    task.finish(result);
                });
            }
            Err(_) => task.fail(anyhow!("no async runtime available to run {}", name)),
        }
    }

    fn fail_hook(&self, phase: Phase, hook: String, err: anyhow::Error) -> LifecycleError {
        let error = LifecycleError::Hook {
            phase,
            hook,
            cause: Arc::new(err),
        };
        self.settle(Err(error.clone()));
        error
    }

    /// Deliver the startup outcome; only the first one counts
    fn settle(&self, outcome: ReadyOutcome) {
        let callbacks = {
            let mut callbacks = self.inner.ready_callbacks.lock();
            let first = self.inner.ready_tx.send_if_modified(|current| {
                if current.is_none() {
                    *current = Some(outcome.clone());
                    true
                } else {
                    false
                }
            });
            if !first {
                if let Err(err) = &outcome {
                    warn!("Ignoring startup error after the outcome was settled: {}", err);
                }
                return;
            }
            std::mem::take(&mut *callbacks)
        };

        match &outcome {
            Ok(()) => info!("Application is ready"),
            Err(err) => {
                error!("Application failed to start: {}", err);
                self.set_state(LifecycleState::Failed);
            }
        }
        for callback in callbacks {
            callback(outcome.clone());
        }
    }

    /// Move forward only; a failed or closing lifecycle stays put
    fn advance(&self, next: LifecycleState) {
        let mut state = self.inner.state.lock();
        if *state < next && *state < LifecycleState::Closing {
            debug!("Lifecycle {} -> {}", *state, next);
            *state = next;
        }
    }

    fn set_state(&self, next: LifecycleState) {
        let mut state = self.inner.state.lock();
        if *state != next {
            debug!("Lifecycle {} -> {}", *state, next);
            *state = next;
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new(LifecycleOptions::default())
    }
}

fn upgrade(weak: &Weak<Inner>) -> Option<Lifecycle> {
    weak.upgrade().map(|inner| Lifecycle { inner })
}

/// Await a hook future, turning a panic into an error naming `name`
async fn unwind_to_error<Fut>(name: &str, fut: Fut) -> Result<()>
where
    Fut: Future<Output = Result<()>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(anyhow!("{} panicked: {}", name, panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
