//! Boot hooks
//!
//! A boot hook is the per-plugin (or per-application) object the lifecycle
//! drives through each phase. Every method is optional.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;

/// Hook phases, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    ConfigWillLoad,
    ConfigDidLoad,
    DidLoad,
    WillReady,
    DidReady,
    ServerDidReady,
    BeforeClose,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::ConfigWillLoad => "config_will_load",
            Phase::ConfigDidLoad => "config_did_load",
            Phase::DidLoad => "did_load",
            Phase::WillReady => "will_ready",
            Phase::DidReady => "did_ready",
            Phase::ServerDidReady => "server_did_ready",
            Phase::BeforeClose => "before_close",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase callbacks contributed by a plugin or the application
///
/// `config_will_load` and `config_did_load` run synchronously in
/// registration order. `did_load` and `will_ready` each become one task on
/// their phase gate and run concurrently. `did_ready` and
/// `server_did_ready` are best-effort: failures are published as events.
/// `before_close` runs during teardown in reverse registration order.
#[async_trait]
pub trait BootHook: Send + Sync {
    fn config_will_load(&self) -> Result<()> {
        Ok(())
    }

    fn config_did_load(&self) -> Result<()> {
        Ok(())
    }

    async fn did_load(&self) -> Result<()> {
        Ok(())
    }

    async fn will_ready(&self) -> Result<()> {
        Ok(())
    }

    /// Runs only after a successful start
    async fn did_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn server_did_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn before_close(&self) -> Result<()> {
        Ok(())
    }
}

/// Plain function run at `config_did_load`
pub struct FunctionHook {
    func: Box<dyn Fn() -> Result<()> + Send + Sync>,
}

impl FunctionHook {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        Self {
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl BootHook for FunctionHook {
    fn config_did_load(&self) -> Result<()> {
        (self.func)()
    }
}
