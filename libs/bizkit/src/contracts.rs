use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;

use crate::context::ModuleCtx;
use crate::events::EventSubscription;
use crate::persistence::EntityDescriptor;
use crate::service_registry::ServiceInstance;

/// A feature plugin.
///
/// Identity and dependencies are read once at registration. The registry then
/// drives the module through `init` → `start` → `stop`, and before `init`
/// collects its providers:
///
/// 1. `entities` are handed to the persistence handle,
/// 2. `services` factories run and their instances land in the service registry,
/// 3. `init` runs,
/// 4. `middleware` and `routes` are mounted under the API root,
/// 5. `event_handlers` are subscribed to the event bus.
///
/// A stopped module is never started again.
#[async_trait]
pub trait Module: Send + Sync + 'static {
    /// Unique key within a registry.
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Names of modules that must be initialized before this one.
    fn dependencies(&self) -> &[&'static str] {
        &[]
    }

    /// Wiring; services of dependencies are available in `ctx.services()`.
    async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()>;

    async fn start(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
        Ok(())
    }

    fn entities(&self) -> Vec<EntityDescriptor> {
        Vec::new()
    }

    fn routes(&self) -> Vec<RouteProvider> {
        Vec::new()
    }

    fn event_handlers(&self) -> Vec<EventSubscription> {
        Vec::new()
    }

    /// Middleware applied to the whole API tree, not just this module's routes.
    fn middleware(&self) -> Vec<MiddlewareProvider> {
        Vec::new()
    }

    fn services(&self) -> Vec<ServiceProvider> {
        Vec::new()
    }
}

type ServiceFactory = Arc<dyn Fn(&ModuleCtx) -> anyhow::Result<ServiceInstance> + Send + Sync>;

/// Named factory for a singleton service.
#[derive(Clone)]
pub struct ServiceProvider {
    pub name: String,
    factory: ServiceFactory,
}

impl ServiceProvider {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ModuleCtx) -> anyhow::Result<ServiceInstance> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    /// Provider for a service of type `T` built by `factory`.
    pub fn typed<T, F>(name: impl Into<String>, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ModuleCtx) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
    {
        Self::new(name, move |ctx| factory(ctx).map(ServiceInstance::new))
    }

    pub fn create(&self, ctx: &ModuleCtx) -> anyhow::Result<ServiceInstance> {
        (self.factory)(ctx)
    }
}

impl std::fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("name", &self.name)
            .finish()
    }
}

type RegisterRoutesFn = Arc<dyn Fn(Router, &ModuleCtx) -> anyhow::Result<Router> + Send + Sync>;

/// A module's routes, their mount prefix and the middleware wrapping them.
///
/// The registration function receives an empty router and returns it with the
/// module's routes added; paths are relative to `<api root>/<prefix>`.
#[derive(Clone)]
pub struct RouteProvider {
    pub prefix: String,
    pub middleware: Vec<MiddlewareProvider>,
    register: RegisterRoutesFn,
}

impl RouteProvider {
    pub fn new<F>(prefix: impl Into<String>, register: F) -> Self
    where
        F: Fn(Router, &ModuleCtx) -> anyhow::Result<Router> + Send + Sync + 'static,
    {
        Self {
            prefix: prefix.into(),
            middleware: Vec::new(),
            register: Arc::new(register),
        }
    }

    pub fn with_middleware(mut self, middleware: MiddlewareProvider) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn build(&self, ctx: &ModuleCtx) -> anyhow::Result<Router> {
        (self.register)(Router::new(), ctx)
    }
}

impl std::fmt::Debug for RouteProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let middleware: Vec<&str> = self.middleware.iter().map(|m| m.name.as_str()).collect();
        f.debug_struct("RouteProvider")
            .field("prefix", &self.prefix)
            .field("middleware", &middleware)
            .finish()
    }
}

type ApplyMiddlewareFn = Arc<dyn Fn(Router) -> Router + Send + Sync>;

/// A named router transform, typically `router.layer(...)`.
///
/// ```rust,ignore
/// MiddlewareProvider::new("tenant", |r| r.layer(axum::middleware::from_fn(require_tenant)))
/// ```
#[derive(Clone)]
pub struct MiddlewareProvider {
    pub name: String,
    apply: ApplyMiddlewareFn,
}

impl MiddlewareProvider {
    pub fn new<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(Router) -> Router + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            apply: Arc::new(apply),
        }
    }

    pub fn apply(&self, router: Router) -> Router {
        (self.apply)(router)
    }
}

impl std::fmt::Debug for MiddlewareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareProvider")
            .field("name", &self.name)
            .finish()
    }
}
