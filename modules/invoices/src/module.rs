use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use async_trait::async_trait;
use bizkit::{
    handler_fn, EntityDescriptor, EventSubscription, MiddlewareProvider, Module, ModuleCtx,
    RouteProvider, ServiceProvider,
};
use clients::{ClientCreated, ClientDirectory, CLIENT_CREATED};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::InvoicesConfig;
use crate::domain::service::{InvoiceLedger, LedgerDefaults};
use crate::domain::sweeper::OverdueSweeper;

pub const MODULE_NAME: &str = "invoices";

/// Service registry key of the [`InvoiceLedger`].
pub const LEDGER_SERVICE: &str = "invoices.ledger";

/// Invoicing on top of the client directory.
///
/// Opens an account for every new client, serves `/invoices` and runs the
/// overdue sweeper between `start` and `stop`.
pub struct InvoicesModule {
    ledger: ArcSwapOption<InvoiceLedger>,
    config: ArcSwap<InvoicesConfig>,
    route_middleware: ArcSwap<Vec<MiddlewareProvider>>,
    sweeper: Mutex<Option<OverdueSweeper>>,
}

impl Default for InvoicesModule {
    fn default() -> Self {
        Self {
            ledger: ArcSwapOption::from(None),
            config: ArcSwap::from_pointee(InvoicesConfig::default()),
            route_middleware: ArcSwap::from_pointee(Vec::new()),
            sweeper: Mutex::new(None),
        }
    }
}

impl InvoicesModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> Option<Arc<InvoiceLedger>> {
        self.ledger.load_full()
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper.lock().as_ref().is_some_and(|s| s.is_running())
    }
}

#[async_trait]
impl Module for InvoicesModule {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn dependencies(&self) -> &[&'static str] {
        &[clients::MODULE_NAME]
    }

    async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        info!("Initializing invoices module");

        let cfg: InvoicesConfig = ctx.module_config_or_default(MODULE_NAME)?;
        if cfg.sweep_interval.is_zero() {
            anyhow::bail!("invoices.sweep_interval must be greater than zero");
        }
        debug!(
            sweep_interval = ?cfg.sweep_interval,
            overdue_after_days = cfg.overdue_after_days,
            currency = %cfg.currency,
            "Loaded invoices config"
        );

        let mut middleware = vec![clients::tenancy::tenant_middleware(&cfg.tenant_header)?];
        if let Some(auth) = ctx.auth() {
            middleware.push(auth.require_auth());
        }
        self.route_middleware.store(Arc::new(middleware));

        let ledger = ctx.services().get_typed::<InvoiceLedger>(LEDGER_SERVICE)?;
        self.ledger.store(Some(ledger));
        self.config.store(Arc::new(cfg));

        info!("Invoices module initialized");
        Ok(())
    }

    async fn start(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        let ledger = self
            .ledger
            .load_full()
            .ok_or_else(|| anyhow::anyhow!("Ledger not initialized"))?;
        let interval = self.config.load().sweep_interval;

        let mut slot = self.sweeper.lock();
        if slot.is_none() {
            *slot = Some(OverdueSweeper::spawn(
                ledger,
                interval,
                ctx.cancellation_token(),
            ));
            info!(interval = ?interval, "Overdue sweeper started");
        }
        Ok(())
    }

    async fn stop(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.shutdown().await?;
            info!("Overdue sweeper stopped");
        }
        Ok(())
    }

    fn entities(&self) -> Vec<EntityDescriptor> {
        vec![EntityDescriptor::new("invoice", "invoices")]
    }

    fn services(&self) -> Vec<ServiceProvider> {
        vec![ServiceProvider::typed(LEDGER_SERVICE, |ctx: &ModuleCtx| {
            let cfg: InvoicesConfig = ctx.module_config_or_default(MODULE_NAME)?;
            let directory = ctx
                .services()
                .get_typed::<ClientDirectory>(clients::DIRECTORY_SERVICE)?;
            Ok(Arc::new(InvoiceLedger::new(
                directory,
                Arc::clone(ctx.events()),
                LedgerDefaults {
                    currency: cfg.currency,
                    overdue_after_days: cfg.overdue_after_days,
                },
            )))
        })]
    }

    fn routes(&self) -> Vec<RouteProvider> {
        let provider = RouteProvider::new("invoices", |router, ctx| {
            let ledger = ctx.services().get_typed::<InvoiceLedger>(LEDGER_SERVICE)?;
            Ok(crate::api::rest::register_routes(router, ledger))
        });

        let provider = self
            .route_middleware
            .load()
            .iter()
            .cloned()
            .fold(provider, RouteProvider::with_middleware);
        vec![provider]
    }

    fn event_handlers(&self) -> Vec<EventSubscription> {
        let Some(ledger) = self.ledger.load_full() else {
            return Vec::new();
        };

        let handler = handler_fn(move |event| {
            let ledger = Arc::clone(&ledger);
            async move {
                let created: ClientCreated = event.payload_as()?;
                if ledger.open_account(&created.tenant_id, created.client_id) {
                    debug!(client_id = %created.client_id, "Account opened for new client");
                }
                anyhow::Ok(())
            }
        });
        vec![EventSubscription::new(
            CLIENT_CREATED,
            "invoices.open_account",
            handler,
        )]
    }
}
