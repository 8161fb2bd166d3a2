//! Host Runtime - orchestrates the full bizkit lifecycle
//!
//! This module contains the HostRuntime type that owns the shared
//! infrastructure and drives every phase: register → init → start →
//! serve → wait → stop → drain.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{http::StatusCode, routing::get, Router};
use tokio_util::sync::CancellationToken;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::context::{ModuleContextBuilder, ModuleCtx};
use crate::contracts::Module;
use crate::events::EventBus;
use crate::http::{HttpMount, DEFAULT_API_ROOT};
use crate::registry::{ModuleRegistry, RegistryError};
use crate::runtime::RunOptions;

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// When false the runtime only waits for shutdown and never binds a socket.
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub api_root: String,
    pub request_timeout: Duration,
    pub body_limit_bytes: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8087,
            api_root: DEFAULT_API_ROOT.to_string(),
            request_timeout: Duration::from_secs(30),
            body_limit_bytes: 2 * 1024 * 1024,
        }
    }
}

/// HostRuntime owns the lifecycle orchestration for bizkit.
pub struct HostRuntime {
    registry: Arc<ModuleRegistry>,
    ctx: ModuleCtx,
    server: ServerOptions,
    stop_timeout: Duration,
    drain_timeout: Duration,
    cancel: CancellationToken,
}

impl HostRuntime {
    /// Build the event bus, service registry, HTTP mount, module registry
    /// and the shared context. Must be called inside a tokio runtime.
    pub fn new(opts: RunOptions, cancel: CancellationToken) -> Self {
        let registry = Arc::new(ModuleRegistry::with_strict_order(
            opts.strict_registration_order,
        ));
        let events = Arc::new(EventBus::new(opts.queue_capacity));
        let http = Arc::new(HttpMount::new(&opts.server.api_root));

        let mut builder = ModuleContextBuilder::new(Arc::clone(&registry), events)
            .http(http)
            .config(opts.modules_cfg)
            .span(tracing::info_span!("bizhub"))
            .cancellation_token(cancel.clone());
        if let Some(persistence) = opts.persistence {
            builder = builder.persistence(persistence);
        }
        if let Some(auth) = opts.auth {
            builder = builder.auth(auth);
        }
        if let Some(tokens) = opts.tokens {
            builder = builder.tokens(tokens);
        }

        Self {
            registry,
            ctx: builder.build(),
            server: opts.server,
            stop_timeout: opts.stop_timeout,
            drain_timeout: opts.drain_timeout,
            cancel,
        }
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn context(&self) -> &ModuleCtx {
        &self.ctx
    }

    /// REGISTER phase: hand every module to the registry in the given order.
    pub async fn register_modules(
        &self,
        modules: Vec<Arc<dyn Module>>,
    ) -> Result<(), RegistryError> {
        tracing::info!("Phase: register");
        for module in modules {
            self.registry.register(module).await?;
        }
        tracing::info!(modules = ?self.registry.module_names(), "Modules registered");
        Ok(())
    }

    /// Compose the final router: API tree, `/healthz` and the request stack.
    ///
    /// Layers run outermost to innermost:
    /// RequestId(Propagate -> Set) -> Trace -> Timeout -> BodyLimit -> Router
    pub fn build_router(&self) -> Router {
        let api = self.ctx.http().take_router();
        Router::new()
            .route("/healthz", get(|| async { "ok" }))
            .merge(api)
            .layer(RequestBodyLimitLayer::new(self.server.body_limit_bytes))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                self.server.request_timeout,
            ))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|req: &axum::http::Request<_>| {
                        let rid = req
                            .headers()
                            .get("x-request-id")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("n/a");
                        tracing::info_span!(
                            "http_request",
                            method = %req.method(),
                            uri = %req.uri().path(),
                            request_id = %rid,
                            status = tracing::field::Empty,
                            latency_ms = tracing::field::Empty,
                        )
                    })
                    .on_response(
                        |res: &axum::http::Response<_>,
                         latency: Duration,
                         span: &tracing::Span| {
                            span.record("status", res.status().as_u16());
                            span.record("latency_ms", latency.as_millis() as u64);
                        },
                    ),
            )
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(PropagateRequestIdLayer::x_request_id())
    }

    /// SERVE phase: bind and serve until the cancellation token fires.
    async fn serve(&self, router: Router) -> anyhow::Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid bind address '{}:{}'",
                    self.server.host, self.server.port
                )
            })?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        let local = listener.local_addr()?;
        tracing::info!(addr = %local, api_root = %self.ctx.http().api_root(), "HTTP server bound");

        let cancel = self.cancel.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                tracing::info!("HTTP server shutting down gracefully (cancellation)");
            })
            .await
            .context("HTTP server failed")
    }

    /// STOP phase: stop modules in reverse order, bounded by `stop_timeout`.
    ///
    /// Errors are logged but do not fail the shutdown process.
    async fn run_stop_phase(&self) {
        match tokio::time::timeout(self.stop_timeout, self.registry.stop_all(&self.ctx)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(error = %err, "Some modules failed to stop"),
            Err(_) => tracing::warn!(timeout = ?self.stop_timeout, "Stop phase timed out"),
        }
    }

    /// DRAIN phase: let queued events finish, bounded by `drain_timeout`.
    async fn drain_events(&self) {
        let bus = self.ctx.events();
        if let Err(err) = bus.shutdown(self.drain_timeout).await {
            tracing::warn!(error = %err, pending = bus.pending_events(), "Event queue not fully drained");
        }
        let dropped = bus.dropped_events();
        if dropped > 0 {
            tracing::warn!(dropped, "Events were dropped because the queue was full");
        }
    }

    async fn bootstrap(&self, modules: Vec<Arc<dyn Module>>) -> anyhow::Result<()> {
        self.register_modules(modules).await?;
        self.registry.initialize_all(&self.ctx).await?;
        self.registry.start_all(&self.ctx).await?;
        Ok(())
    }

    /// Run the full lifecycle: register → init → start → serve → wait → stop → drain.
    ///
    /// A bootstrap failure still stops whatever was started and drains the bus
    /// before it is returned.
    pub async fn run_full_cycle(self, modules: Vec<Arc<dyn Module>>) -> anyhow::Result<()> {
        let mut result = self.bootstrap(modules).await;

        if result.is_ok() {
            if self.server.enabled {
                let router = self.build_router();
                result = self.serve(router).await;
            } else {
                self.cancel.cancelled().await;
            }
        }

        if let Err(err) = &result {
            tracing::error!(error = %format!("{err:#}"), "Runtime failed, shutting down");
        }
        self.cancel.cancel();

        self.run_stop_phase().await;
        self.drain_events().await;
        tracing::info!("Runtime stopped");
        result
    }
}
