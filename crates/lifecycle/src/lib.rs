//! Readiness gates and the phased boot lifecycle

pub mod error;
pub mod events;
pub mod hook;
pub mod lifecycle;
pub mod ready;
pub mod timing;

pub use error::{LifecycleError, SharedError};
pub use events::{EventBus, LifecycleEvent};
pub use hook::{BootHook, FunctionHook, Phase};
pub use lifecycle::{Lifecycle, LifecycleOptions, LifecycleState};
pub use ready::{ReadinessGate, ReadyOutcome, ReadyTask, TaskOptions, DEFAULT_READY_TIMEOUT};
pub use timing::{BootTiming, TimingRecord};
