//! Lifecycle error types

use std::sync::Arc;

use crate::hook::Phase;

/// Error cause shared by every subscriber of one outcome
pub type SharedError = Arc<anyhow::Error>;

/// Failures surfaced by gates and the lifecycle
///
/// Cloning keeps the same underlying cause, so every `ready()` or `close()`
/// caller observes the identical error object.
#[derive(thiserror::Error, Debug, Clone)]
pub enum LifecycleError {
    #[error("Boot hook {hook} failed in {phase}: {cause}")]
    Hook {
        phase: Phase,
        hook: String,
        cause: SharedError,
    },

    #[error("Task {task} on {gate} gate failed: {cause}")]
    Task {
        gate: String,
        task: String,
        cause: SharedError,
    },

    #[error("Close action {action} failed: {cause}")]
    Close { action: String, cause: SharedError },

    #[error("Startup aborted: {cause}")]
    Startup { cause: SharedError },

    #[error("Boot hooks cannot be added after the lifecycle was initialized")]
    AlreadyInitialized,

    #[error("Lifecycle was already booted")]
    AlreadyBooted,

    #[error("Lifecycle is closing, teardown actions can no longer be registered")]
    Closed,

    #[error("Gate {0} was dropped before firing")]
    GateClosed(String),
}

impl LifecycleError {
    /// Underlying cause, if this error wraps one
    pub fn cause(&self) -> Option<&SharedError> {
        match self {
            LifecycleError::Hook { cause, .. }
            | LifecycleError::Task { cause, .. }
            | LifecycleError::Close { cause, .. }
            | LifecycleError::Startup { cause } => Some(cause),
            _ => None,
        }
    }

    /// Whether both errors carry the very same cause object
    pub fn same_cause(&self, other: &LifecycleError) -> bool {
        match (self.cause(), other.cause()) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
