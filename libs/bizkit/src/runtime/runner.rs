//! bizkit runtime runner.
//!
//! Design notes:
//! - Modules are passed in explicitly, in registration order.
//! - Phase order: **register → init → start → serve → wait → stop → drain**.
//! - Every module receives the same ModuleCtx, built once by HostRuntime.
//! - Shutdown can be driven by OS signals, an external `CancellationToken`,
//!   or an arbitrary future.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::auth::{AuthProvider, TokenIssuer};
use crate::context::{ConfigProvider, EmptyConfigProvider};
use crate::contracts::Module;
use crate::events::DEFAULT_QUEUE_CAPACITY;
use crate::persistence::Persistence;
use crate::runtime::shutdown;
use crate::runtime::{HostRuntime, ServerOptions};

/// How the runtime should decide when to stop.
pub enum ShutdownOptions {
    /// Listen for OS signals (Ctrl+C / SIGTERM).
    Signals,
    /// An external `CancellationToken` controls the lifecycle.
    Token(CancellationToken),
    /// An arbitrary future; when it completes, we initiate shutdown.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

/// Options for running the bizkit runner.
pub struct RunOptions {
    /// Provider of module config sections (raw JSON by module name).
    pub modules_cfg: Arc<dyn ConfigProvider>,
    pub server: ServerOptions,
    /// Require dependencies to be registered before their dependents.
    pub strict_registration_order: bool,
    /// Upper bound for the whole stop phase.
    pub stop_timeout: Duration,
    /// Capacity of the asynchronous event queue.
    pub queue_capacity: usize,
    /// How long queued events may take to drain at shutdown.
    pub drain_timeout: Duration,
    pub persistence: Option<Arc<dyn Persistence>>,
    pub auth: Option<Arc<dyn AuthProvider>>,
    pub tokens: Option<Arc<dyn TokenIssuer>>,
    /// Shutdown strategy.
    pub shutdown: ShutdownOptions,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            modules_cfg: Arc::new(EmptyConfigProvider),
            server: ServerOptions::default(),
            strict_registration_order: true,
            stop_timeout: Duration::from_secs(30),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            drain_timeout: Duration::from_secs(5),
            persistence: None,
            auth: None,
            tokens: None,
            shutdown: ShutdownOptions::Signals,
        }
    }
}

/// Resolves once `primary` reports a signal, or once `fallback` does when the
/// primary waiter could not be installed. A failing fallback is logged and
/// resolves too.
async fn wait_for_signal<P, F>(primary: P, fallback: F)
where
    P: Future<Output = anyhow::Result<()>>,
    F: Future<Output = std::io::Result<()>>,
{
    match primary.await {
        Ok(()) => tracing::info!("shutdown: signal received"),
        Err(e) => {
            tracing::warn!(
                error = %e,
                "shutdown: primary waiter failed; falling back to ctrl_c()"
            );
            match fallback.await {
                Ok(()) => tracing::info!("shutdown: ctrl_c received"),
                Err(e) => tracing::error!(
                    error = %e,
                    "shutdown: ctrl_c fallback failed; no signal handler is installed"
                ),
            }
        }
    }
}

/// Full cycle: register → init → start → serve → wait → stop → drain.
///
/// This function is a thin wrapper around HostRuntime that handles shutdown signal setup
/// and then delegates all lifecycle orchestration to the HostRuntime.
pub async fn run(mut opts: RunOptions, modules: Vec<Arc<dyn Module>>) -> anyhow::Result<()> {
    // 1. Prepare cancellation token based on shutdown options
    let cancel = match &opts.shutdown {
        ShutdownOptions::Token(t) => t.clone(),
        _ => CancellationToken::new(),
    };

    // 2. Spawn shutdown waiter (Signals / Future)
    match std::mem::replace(&mut opts.shutdown, ShutdownOptions::Token(cancel.clone())) {
        ShutdownOptions::Signals => {
            let c = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = wait_for_signal(shutdown::wait_for_shutdown(), tokio::signal::ctrl_c()) => {}
                    _ = c.cancelled() => return,
                }
                c.cancel();
            });
        }
        ShutdownOptions::Future(waiter) => {
            let c = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = waiter => {
                        tracing::info!("shutdown: external future completed");
                        c.cancel();
                    }
                    _ = c.cancelled() => {}
                }
            });
        }
        ShutdownOptions::Token(_) => {
            tracing::info!("shutdown: external token will control lifecycle");
        }
    }

    // 3. Instantiate HostRuntime and run the full lifecycle
    let host = HostRuntime::new(opts, cancel);
    host.run_full_cycle(modules).await
}
