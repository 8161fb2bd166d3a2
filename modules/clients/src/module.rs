use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use async_trait::async_trait;
use bizkit::{
    EntityDescriptor, MiddlewareProvider, Module, ModuleCtx, RouteProvider, ServiceProvider,
};
use tracing::{debug, info};

use crate::config::ClientsConfig;
use crate::domain::service::ClientDirectory;

pub const MODULE_NAME: &str = "clients";

/// Service registry key of the [`ClientDirectory`].
pub const DIRECTORY_SERVICE: &str = "clients.directory";

/// Tenant-scoped client directory with a REST surface under `/clients`.
pub struct ClientsModule {
    // Read-mostly state installed during init.
    directory: ArcSwapOption<ClientDirectory>,
    route_middleware: ArcSwap<Vec<MiddlewareProvider>>,
}

impl Default for ClientsModule {
    fn default() -> Self {
        Self {
            directory: ArcSwapOption::from(None),
            route_middleware: ArcSwap::from_pointee(Vec::new()),
        }
    }
}

impl ClientsModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// The directory, once the module is initialized.
    pub fn directory(&self) -> Option<Arc<ClientDirectory>> {
        self.directory.load_full()
    }
}

#[async_trait]
impl Module for ClientsModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        info!("Initializing clients module");

        let cfg: ClientsConfig = ctx.module_config_or_default(MODULE_NAME)?;
        debug!(
            tenant_header = %cfg.tenant_header,
            max_clients_per_tenant = cfg.max_clients_per_tenant,
            "Loaded clients config"
        );

        let mut middleware = vec![crate::tenancy::tenant_middleware(&cfg.tenant_header)?];
        if let Some(auth) = ctx.auth() {
            middleware.push(auth.require_auth());
        }
        self.route_middleware.store(Arc::new(middleware));

        let directory = ctx
            .services()
            .get_typed::<ClientDirectory>(DIRECTORY_SERVICE)?;
        self.directory.store(Some(directory));

        info!("Clients module initialized");
        Ok(())
    }

    fn entities(&self) -> Vec<EntityDescriptor> {
        vec![EntityDescriptor::new("client", "clients")]
    }

    fn services(&self) -> Vec<ServiceProvider> {
        vec![ServiceProvider::typed(DIRECTORY_SERVICE, |ctx: &ModuleCtx| {
            let cfg: ClientsConfig = ctx.module_config_or_default(MODULE_NAME)?;
            Ok(Arc::new(ClientDirectory::new(
                Arc::clone(ctx.events()),
                cfg.max_clients_per_tenant,
            )))
        })]
    }

    fn routes(&self) -> Vec<RouteProvider> {
        let provider = RouteProvider::new("clients", |router, ctx| {
            let directory = ctx
                .services()
                .get_typed::<ClientDirectory>(DIRECTORY_SERVICE)?;
            Ok(crate::api::rest::register_routes(router, directory))
        });

        let provider = self
            .route_middleware
            .load()
            .iter()
            .cloned()
            .fold(provider, RouteProvider::with_middleware);
        vec![provider]
    }
}
