//! # BizKit - Module Orchestration Core
//!
//! A small kernel for assembling a business backend out of feature modules
//! that live in one process.
//!
//! ## Features
//!
//! - **Explicit registration**: modules are handed to a [`ModuleRegistry`] in order
//! - **Dependency ordering**: Kahn's algorithm with deterministic tie-breaking and cycle paths
//! - **Phase-based lifecycle**: entities → services → init → routes → handlers, then start → stop
//! - **Event bus**: priority fan-out with continue-on-error, plus a bounded background queue
//! - **Service registry**: name-keyed singletons with typed (and trait-object) lookup
//!
//! ## Basic Module Example
//!
//! ```rust,ignore
//! use bizkit::{Module, ModuleCtx, RouteProvider, ServiceProvider};
//!
//! pub struct InvoicesModule;
//!
//! #[bizkit::async_trait]
//! impl Module for InvoicesModule {
//!     fn name(&self) -> &str { "invoices" }
//!     fn version(&self) -> &str { "0.1.0" }
//!     fn dependencies(&self) -> &[&'static str] { &["clients"] }
//!
//!     async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
//!         let clients = ctx.services().get_typed::<ClientDirectory>("clients.directory")?;
//!         // ...
//!         Ok(())
//!     }
//!
//!     fn routes(&self) -> Vec<RouteProvider> {
//!         vec![RouteProvider::new("invoices", |router, _ctx| Ok(router.route("/", get(list))))]
//!     }
//! }
//! ```

pub use anyhow::Result;
pub use async_trait::async_trait;

// Core module contracts and traits
pub mod contracts;
pub use contracts::{MiddlewareProvider, Module, RouteProvider, ServiceProvider};

pub mod context;
pub use context::{
    module_config_typed, ConfigError, ConfigProvider, EmptyConfigProvider, ModuleContextBuilder,
    ModuleCtx,
};

pub mod registry;
pub use registry::{ModuleInfo, ModuleRegistry, ModuleState, RegistryError, StopFailure};

pub mod service_registry;
pub use service_registry::{ServiceError, ServiceInstance, ServiceRegistry};

pub mod events;
pub use events::{
    handler_fn, Event, EventBus, EventBusError, EventHandler, EventSubscription, SubscriptionId,
};

// Collaborator contracts consumed through the context
pub mod auth;
pub mod persistence;
pub use auth::{AuthProvider, Claims, TokenIssuer};
pub use persistence::{EntityDescriptor, InMemoryPersistence, Persistence};

// HTTP mount point
pub mod http;
pub use http::{HttpMount, MountError};
pub mod problem;
pub use problem::Problem;

pub mod runtime;
pub use runtime::{run, HostRuntime, RunOptions, ServerOptions, ShutdownOptions};
