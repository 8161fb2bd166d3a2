use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::Instrument;

use crate::context::ModuleCtx;
use crate::contracts::Module;
use crate::events::{EventBusError, SubscriptionId};
use crate::http::MountError;
use crate::service_registry::ServiceError;

/// Lifecycle position of a registered module.
///
/// Transitions only move forward: `Registered → Initialized → Started →
/// Stopped`, with `Failed` reached when initialization fails. A `Stopped`
/// module is never started again; restarting requires a new registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Registered,
    Initialized,
    Started,
    Stopped,
    Failed,
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModuleState::Registered => "registered",
            ModuleState::Initialized => "initialized",
            ModuleState::Started => "started",
            ModuleState::Stopped => "stopped",
            ModuleState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Snapshot of one module, as returned by [`ModuleRegistry::modules`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub version: String,
    pub dependencies: Vec<String>,
    pub state: ModuleState,
}

struct ModuleRecord {
    name: String,
    version: String,
    deps: Vec<String>,
    module: Arc<dyn Module>,
    state: Mutex<ModuleState>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
    mounts: Mutex<Vec<String>>,
    middleware: Mutex<Vec<String>>,
}

impl ModuleRecord {
    fn state(&self) -> ModuleState {
        *self.state.lock()
    }

    fn set_state(&self, state: ModuleState) {
        *self.state.lock() = state;
    }
}

impl std::fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("deps", &self.deps)
            .field("state", &self.state())
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish()
    }
}

/// A module whose `stop` hook returned an error.
#[derive(Debug)]
pub struct StopFailure {
    pub module: String,
    pub error: anyhow::Error,
}

impl std::fmt::Display for StopFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {:#}", self.module, self.error)
    }
}

fn describe_stop_failures(failures: &[StopFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Structured errors for the module registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    // Registration errors
    #[error("module name must not be empty")]
    EmptyName,
    #[error("module '{0}' is already registered")]
    AlreadyRegistered(String),
    #[error("module '{module}' depends on unknown '{depends_on}'")]
    UnknownDependency { module: String, depends_on: String },

    // Graph errors
    #[error("cyclic dependency detected: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    // Phase errors with module context
    #[error("entity migration failed for module '{module}'")]
    Migrate {
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("service '{service}' factory failed for module '{module}'")]
    ServiceFactory {
        module: String,
        service: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("service registration failed for module '{module}'")]
    Service {
        module: String,
        #[source]
        source: ServiceError,
    },
    #[error("initialization failed for module '{module}'")]
    Init {
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("route registration failed for module '{module}' at '{prefix}'")]
    RouteRegister {
        module: String,
        prefix: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("mounting routes failed for module '{module}'")]
    Mount {
        module: String,
        #[source]
        source: MountError,
    },
    #[error("event subscription '{handler}' failed for module '{module}'")]
    Subscribe {
        module: String,
        handler: String,
        #[source]
        source: EventBusError,
    },
    #[error("module '{0}' failed to initialize earlier and cannot be initialized again")]
    ModuleFailed(String),
    #[error("start failed for '{module}'")]
    Start {
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("{} module(s) failed to stop: {}", failures.len(), describe_stop_failures(failures))]
    Stop { failures: Vec<StopFailure> },
}

impl RegistryError {
    /// Module the error is attributed to, when there is exactly one.
    pub fn module(&self) -> Option<&str> {
        match self {
            RegistryError::AlreadyRegistered(m) | RegistryError::ModuleFailed(m) => Some(m.as_str()),
            RegistryError::UnknownDependency { module, .. }
            | RegistryError::Migrate { module, .. }
            | RegistryError::ServiceFactory { module, .. }
            | RegistryError::Service { module, .. }
            | RegistryError::Init { module, .. }
            | RegistryError::RouteRegister { module, .. }
            | RegistryError::Mount { module, .. }
            | RegistryError::Subscribe { module, .. }
            | RegistryError::Start { module, .. } => Some(module.as_str()),
            RegistryError::EmptyName
            | RegistryError::CycleDetected { .. }
            | RegistryError::Stop { .. } => None,
        }
    }
}

/// Owns the registered modules and drives them through their lifecycle.
///
/// Lifecycle calls (`register`, `initialize_all`, `start_all`, `stop_all`)
/// are serialized by one async lock held for the whole call. Introspection
/// only touches the record list, so a module may inspect the registry from
/// inside its own `init`.
pub struct ModuleRegistry {
    strict: bool,
    records: RwLock<Vec<Arc<ModuleRecord>>>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("strict", &self.strict)
            .field("modules", &self.module_names())
            .finish()
    }
}

impl ModuleRegistry {
    /// Registry requiring dependencies to be registered before dependents.
    pub fn new() -> Self {
        Self::with_strict_order(true)
    }

    /// With `strict == false`, unknown dependencies and cycles are reported
    /// by [`Self::initialization_order`] instead of [`Self::register`].
    pub fn with_strict_order(strict: bool) -> Self {
        Self {
            strict,
            records: RwLock::new(Vec::new()),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Add a module in `Registered` state. Nothing changes on failure.
    pub async fn register(&self, module: Arc<dyn Module>) -> Result<(), RegistryError> {
        let _guard = self.lifecycle.lock().await;

        let name = module.name().to_string();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let mut deps: Vec<String> = Vec::new();
        for dep in module.dependencies() {
            if !deps.iter().any(|d| d == dep) {
                deps.push((*dep).to_string());
            }
        }

        let mut records = self.records.write();
        if records.iter().any(|r| r.name == name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        if self.strict {
            if let Some(missing) = deps
                .iter()
                .find(|d| !records.iter().any(|r| &r.name == *d))
            {
                return Err(RegistryError::UnknownDependency {
                    module: name,
                    depends_on: missing.clone(),
                });
            }
        }

        tracing::debug!(module = %name, version = module.version(), deps = ?deps, "Module registered");
        records.push(Arc::new(ModuleRecord {
            version: module.version().to_string(),
            name,
            deps,
            module,
            state: Mutex::new(ModuleState::Registered),
            subscriptions: Mutex::new(Vec::new()),
            mounts: Mutex::new(Vec::new()),
            middleware: Mutex::new(Vec::new()),
        }));
        Ok(())
    }

    /// Module names in dependency order, ties in registration order.
    pub fn initialization_order(&self) -> Result<Vec<String>, RegistryError> {
        let records = self.records.read().clone();
        let order = Self::resolve_order(&records)?;
        Ok(order.into_iter().map(|i| records[i].name.clone()).collect())
    }

    /// Kahn's algorithm over record indices; the ready set is ordered so the
    /// earliest registered module is always dequeued first.
    fn resolve_order(records: &[Arc<ModuleRecord>]) -> Result<Vec<usize>, RegistryError> {
        let idx: HashMap<&str, usize> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.as_str(), i))
            .collect();

        // dependents[d] lists modules waiting on d; deps[m] lists what m needs.
        let mut dependents = vec![Vec::<usize>::new(); records.len()];
        let mut deps = vec![Vec::<usize>::new(); records.len()];
        for (m, record) in records.iter().enumerate() {
            for dep in &record.deps {
                let d = *idx
                    .get(dep.as_str())
                    .ok_or_else(|| RegistryError::UnknownDependency {
                        module: record.name.clone(),
                        depends_on: dep.clone(),
                    })?;
                dependents[d].push(m);
                deps[m].push(d);
            }
        }

        let mut indeg: Vec<usize> = deps.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = indeg
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(records.len());
        while let Some(u) = ready.pop_first() {
            order.push(u);
            for &w in &dependents[u] {
                indeg[w] -= 1;
                if indeg[w] == 0 {
                    ready.insert(w);
                }
            }
        }

        if order.len() != records.len() {
            let path = Self::detect_cycle_with_path(records, &deps).unwrap_or_else(|| {
                // Kahn left nodes behind, so a cycle exists; report the leftovers.
                (0..records.len())
                    .filter(|i| !order.contains(i))
                    .map(|i| records[i].name.clone())
                    .collect()
            });
            return Err(RegistryError::CycleDetected { path });
        }

        tracing::debug!(
            modules = ?order.iter().map(|&i| records[i].name.as_str()).collect::<Vec<_>>(),
            "Module dependency order resolved (topo)"
        );
        Ok(order)
    }

    /// DFS with path tracking over `module -> dependency` edges.
    /// Returns the cycle as `a -> b -> a`, if any.
    fn detect_cycle_with_path(
        records: &[Arc<ModuleRecord>],
        adj: &[Vec<usize>],
    ) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White, // unvisited
            Gray,  // on current path
            Black, // finished
        }

        fn dfs(
            node: usize,
            records: &[Arc<ModuleRecord>],
            adj: &[Vec<usize>],
            colors: &mut [Color],
            path: &mut Vec<usize>,
        ) -> Option<Vec<String>> {
            colors[node] = Color::Gray;
            path.push(node);

            for &next in &adj[node] {
                match colors[next] {
                    Color::Gray => {
                        if let Some(start) = path.iter().position(|&n| n == next) {
                            let mut cycle: Vec<String> = path[start..]
                                .iter()
                                .map(|&i| records[i].name.clone())
                                .collect();
                            cycle.push(records[next].name.clone());
                            return Some(cycle);
                        }
                    }
                    Color::White => {
                        if let Some(cycle) = dfs(next, records, adj, colors, path) {
                            return Some(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }

            path.pop();
            colors[node] = Color::Black;
            None
        }

        let mut colors = vec![Color::White; records.len()];
        let mut path = Vec::new();
        for i in 0..records.len() {
            if colors[i] == Color::White {
                if let Some(cycle) = dfs(i, records, adj, &mut colors, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn ordered_records(&self) -> Result<Vec<Arc<ModuleRecord>>, RegistryError> {
        let records = self.records.read().clone();
        let order = Self::resolve_order(&records)?;
        Ok(order.into_iter().map(|i| Arc::clone(&records[i])).collect())
    }

    /// Initialize every `Registered` module in dependency order.
    ///
    /// Per module: entities are migrated, services created and registered,
    /// `init` called, middleware and routes mounted, event handlers
    /// subscribed. The first failure marks that module `Failed` and aborts;
    /// modules initialized before it stay `Initialized`.
    pub async fn initialize_all(&self, ctx: &ModuleCtx) -> Result<(), RegistryError> {
        let _guard = self.lifecycle.lock().await;
        tracing::info!("Phase: init");

        let ordered = self.ordered_records()?;
        tracing::info!(
            modules = ?ordered.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            "Initialization order resolved"
        );

        for record in ordered {
            match record.state() {
                ModuleState::Registered => {}
                ModuleState::Failed => return Err(RegistryError::ModuleFailed(record.name.clone())),
                state => {
                    tracing::debug!(module = %record.name, %state, "Module already initialized, skipping");
                    continue;
                }
            }

            let span = tracing::info_span!(parent: ctx.span(), "module", module = %record.name);
            let result = self
                .initialize_module(&record, ctx)
                .instrument(span)
                .await;

            match result {
                Ok(()) => {
                    record.set_state(ModuleState::Initialized);
                    tracing::info!(module = %record.name, version = %record.version, "Module initialized");
                }
                Err(err) => {
                    record.set_state(ModuleState::Failed);
                    Self::release_subscriptions(&record, ctx);
                    Self::release_http(&record, ctx);
                    tracing::error!(module = %record.name, error = %err, "Module initialization failed");
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    async fn initialize_module(
        &self,
        record: &ModuleRecord,
        ctx: &ModuleCtx,
    ) -> Result<(), RegistryError> {
        let module = &record.module;
        let name = record.name.clone();

        let entities = module.entities();
        if !entities.is_empty() {
            match ctx.persistence() {
                Some(db) => {
                    tracing::debug!(backend = db.backend(), entities = entities.len(), "Running entity migration");
                    db.migrate(&name, &entities)
                        .await
                        .map_err(|source| RegistryError::Migrate {
                            module: name.clone(),
                            source,
                        })?;
                }
                None => {
                    tracing::warn!(
                        entities = entities.len(),
                        "Module declares entities but no persistence handle is configured"
                    );
                }
            }
        }

        for provider in module.services() {
            let instance = provider
                .create(ctx)
                .map_err(|source| RegistryError::ServiceFactory {
                    module: name.clone(),
                    service: provider.name.clone(),
                    source,
                })?;
            ctx.services()
                .register(&provider.name, instance)
                .map_err(|source| RegistryError::Service {
                    module: name.clone(),
                    source,
                })?;
        }

        module
            .init(ctx)
            .await
            .map_err(|source| RegistryError::Init {
                module: name.clone(),
                source,
            })?;

        for middleware in module.middleware() {
            let middleware_name = middleware.name.clone();
            ctx.http()
                .add_middleware(middleware)
                .map_err(|source| RegistryError::Mount {
                    module: name.clone(),
                    source,
                })?;
            record.middleware.lock().push(middleware_name);
        }

        for provider in module.routes() {
            let router = provider
                .build(ctx)
                .map_err(|source| RegistryError::RouteRegister {
                    module: name.clone(),
                    prefix: provider.prefix.clone(),
                    source,
                })?;
            let path = ctx
                .http()
                .mount(&provider.prefix, router, &provider.middleware)
                .map_err(|source| RegistryError::Mount {
                    module: name.clone(),
                    source,
                })?;
            tracing::info!(path = %path, "Routes mounted");
            record.mounts.lock().push(path);
        }

        for sub in module.event_handlers() {
            let id = ctx
                .events()
                .subscribe(&sub.event_type, &sub.name, Arc::clone(&sub.handler), sub.priority)
                .map_err(|source| RegistryError::Subscribe {
                    module: name.clone(),
                    handler: sub.name.clone(),
                    source,
                })?;
            record.subscriptions.lock().push(id);
        }

        Ok(())
    }

    /// Withdraw the routes and API middleware of a module whose init failed.
    fn release_http(record: &ModuleRecord, ctx: &ModuleCtx) {
        for path in std::mem::take(&mut *record.mounts.lock()) {
            if !ctx.http().unmount(&path) {
                tracing::warn!(module = %record.name, path = %path, "Could not unmount routes");
            }
        }
        for name in std::mem::take(&mut *record.middleware.lock()) {
            if !ctx.http().remove_middleware(&name) {
                tracing::warn!(module = %record.name, middleware = %name, "Could not remove API middleware");
            }
        }
    }

    fn release_subscriptions(record: &ModuleRecord, ctx: &ModuleCtx) {
        let ids = std::mem::take(&mut *record.subscriptions.lock());
        for id in ids {
            if let Err(err) = ctx.events().unsubscribe(id) {
                tracing::debug!(module = %record.name, %id, error = %err, "Subscription already gone");
            }
        }
    }

    /// Start every `Initialized` module in dependency order; stops at the
    /// first failure.
    pub async fn start_all(&self, ctx: &ModuleCtx) -> Result<(), RegistryError> {
        let _guard = self.lifecycle.lock().await;
        tracing::info!("Phase: start");

        for record in self.ordered_records()? {
            if record.state() != ModuleState::Initialized {
                tracing::debug!(module = %record.name, state = %record.state(), "Skipping start");
                continue;
            }
            let span = tracing::info_span!(parent: ctx.span(), "module", module = %record.name);
            record
                .module
                .start(ctx)
                .instrument(span)
                .await
                .map_err(|source| RegistryError::Start {
                    module: record.name.clone(),
                    source,
                })?;
            record.set_state(ModuleState::Started);
            tracing::info!(module = %record.name, "Module started");
        }
        Ok(())
    }

    /// Stop every `Started` module in reverse dependency order.
    ///
    /// Every module is attempted; each ends up `Stopped` with its event
    /// subscriptions removed, and all hook errors are returned together.
    pub async fn stop_all(&self, ctx: &ModuleCtx) -> Result<(), RegistryError> {
        let _guard = self.lifecycle.lock().await;
        tracing::info!("Phase: stop");

        let ordered = match self.ordered_records() {
            Ok(ordered) => ordered,
            Err(err) => {
                tracing::warn!(error = %err, "Dependency order unavailable, stopping in registration order");
                self.records.read().clone()
            }
        };

        let mut failures = Vec::new();
        for record in ordered.iter().rev() {
            if record.state() != ModuleState::Started {
                continue;
            }
            let span = tracing::info_span!(parent: ctx.span(), "module", module = %record.name);
            if let Err(error) = record.module.stop(ctx).instrument(span).await {
                tracing::warn!(module = %record.name, error = %error, "Failed to stop module");
                failures.push(StopFailure {
                    module: record.name.clone(),
                    error,
                });
            } else {
                tracing::info!(module = %record.name, "Module stopped");
            }
            record.set_state(ModuleState::Stopped);
            Self::release_subscriptions(record, ctx);
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::Stop { failures })
        }
    }

    /* ----------------------------- Introspection ----------------------------- */

    /// Names in registration order.
    pub fn module_names(&self) -> Vec<String> {
        self.records.read().iter().map(|r| r.name.clone()).collect()
    }

    pub fn modules(&self) -> Vec<ModuleInfo> {
        self.records
            .read()
            .iter()
            .map(|r| ModuleInfo {
                name: r.name.clone(),
                version: r.version.clone(),
                dependencies: r.deps.clone(),
                state: r.state(),
            })
            .collect()
    }

    pub fn module_state(&self, name: &str) -> Option<ModuleState> {
        self.records
            .read()
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.state())
    }

    pub fn get_module(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.records
            .read()
            .iter()
            .find(|r| r.name == name)
            .map(|r| Arc::clone(&r.module))
    }

    /// Subscription tokens the registry holds for `name`.
    pub fn subscriptions_of(&self, name: &str) -> Vec<SubscriptionId> {
        self.records
            .read()
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.subscriptions.lock().clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /* --------------------------- Test helpers ------------------------- */
    struct DummyCore {
        name: &'static str,
        deps: &'static [&'static str],
    }

    #[async_trait::async_trait]
    impl Module for DummyCore {
        fn name(&self) -> &str {
            self.name
        }
        fn version(&self) -> &str {
            "0.1.0"
        }
        fn dependencies(&self) -> &[&'static str] {
            self.deps
        }
        async fn init(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn dummy(name: &'static str, deps: &'static [&'static str]) -> Arc<dyn Module> {
        Arc::new(DummyCore { name, deps })
    }

    async fn lenient(mods: &[(&'static str, &'static [&'static str])]) -> ModuleRegistry {
        let reg = ModuleRegistry::with_strict_order(false);
        for (name, deps) in mods {
            reg.register(dummy(*name, *deps)).await.unwrap();
        }
        reg
    }

    /* ------------------------------- Tests ---------------------------- */

    #[tokio::test]
    async fn topo_sort_happy_path() {
        let reg = ModuleRegistry::new();
        reg.register(dummy("core_a", &[])).await.unwrap();
        reg.register(dummy("core_b", &["core_a"])).await.unwrap();

        assert_eq!(reg.initialization_order().unwrap(), vec!["core_a", "core_b"]);
        assert_eq!(reg.module_state("core_b"), Some(ModuleState::Registered));
    }

    #[tokio::test]
    async fn dependents_follow_all_transitive_dependencies() {
        let reg = lenient(&[
            ("reports", &["invoices", "bookings"]),
            ("invoices", &["clients"]),
            ("bookings", &["calendars", "clients"]),
            ("calendars", &[]),
            ("clients", &[]),
        ])
        .await;

        let order = reg.initialization_order().unwrap();
        let pos = |n: &str| order.iter().position(|m| m == n).unwrap();
        for info in reg.modules() {
            for dep in &info.dependencies {
                assert!(pos(dep) < pos(&info.name), "{dep} must precede {}", info.name);
            }
        }
        // Ready modules leave in registration order.
        assert_eq!(
            order,
            vec!["calendars", "clients", "invoices", "bookings", "reports"]
        );
    }

    #[tokio::test]
    async fn independent_modules_keep_registration_order() {
        let reg = lenient(&[("zeta", &[]), ("alpha", &[]), ("mid", &[])]).await;
        assert_eq!(reg.initialization_order().unwrap(), vec!["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn strict_registration_rejects_unknown_dependency() {
        let reg = ModuleRegistry::new();
        let err = reg.register(dummy("invoices", &["clients"])).await.unwrap_err();
        match err {
            RegistryError::UnknownDependency { module, depends_on } => {
                assert_eq!(module, "invoices");
                assert_eq!(depends_on, "clients");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn lenient_registration_reports_unknown_dependency_later() {
        let reg = lenient(&[("core_a", &["missing_dep"])]).await;
        let err = reg.initialization_order().unwrap_err();
        assert!(matches!(
            err,
            RegistryError::UnknownDependency { ref module, ref depends_on }
                if module == "core_a" && depends_on == "missing_dep"
        ));
    }

    #[tokio::test]
    async fn duplicate_and_empty_names_are_rejected() {
        let reg = ModuleRegistry::new();
        reg.register(dummy("clients", &[])).await.unwrap();

        let err = reg.register(dummy("clients", &[])).await.unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(ref n) if n == "clients"));
        assert!(matches!(
            reg.register(dummy("", &[])).await.unwrap_err(),
            RegistryError::EmptyName
        ));
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_dependencies_collapse() {
        let reg = ModuleRegistry::new();
        reg.register(dummy("a", &[])).await.unwrap();
        reg.register(dummy("b", &["a", "a"])).await.unwrap();

        let info = reg.modules().into_iter().find(|m| m.name == "b").unwrap();
        assert_eq!(info.dependencies, vec!["a"]);
        assert_eq!(reg.initialization_order().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn cyclic_dependency_detected() {
        let reg = lenient(&[("a", &["b"]), ("b", &["a"])]).await;

        match reg.initialization_order().unwrap_err() {
            RegistryError::CycleDetected { path } => {
                assert_eq!(path, vec!["a", "b", "a"]);
            }
            other => panic!("expected CycleDetected, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn complex_cycle_detection_with_path() {
        let reg = lenient(&[("d", &[]), ("a", &["b"]), ("b", &["c"]), ("c", &["a"])]).await;

        match reg.initialization_order().unwrap_err() {
            RegistryError::CycleDetected { path } => {
                assert!(path.contains(&"a".to_string()));
                assert!(path.contains(&"b".to_string()));
                assert!(path.contains(&"c".to_string()));
                assert!(!path.contains(&"d".to_string()));
                assert_eq!(path.first(), path.last());

                let msg = RegistryError::CycleDetected { path }.to_string();
                assert!(msg.contains("cyclic dependency detected"));
                assert!(msg.contains("->"));
            }
            other => panic!("expected CycleDetected, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn self_dependency() {
        let strict = ModuleRegistry::new();
        assert!(matches!(
            strict.register(dummy("loop", &["loop"])).await.unwrap_err(),
            RegistryError::UnknownDependency { .. }
        ));

        let reg = lenient(&[("loop", &["loop"])]).await;
        match reg.initialization_order().unwrap_err() {
            RegistryError::CycleDetected { path } => assert_eq!(path, vec!["loop", "loop"]),
            other => panic!("expected CycleDetected, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn introspection_reports_registered_modules() {
        let reg = ModuleRegistry::new();
        reg.register(dummy("a", &[])).await.unwrap();
        reg.register(dummy("b", &["a"])).await.unwrap();

        assert_eq!(reg.module_names(), vec!["a", "b"]);
        assert_eq!(reg.get_module("b").unwrap().dependencies(), &["a"]);
        assert!(reg.get_module("zzz").is_none());
        assert_eq!(reg.module_state("zzz"), None);
        assert!(reg.subscriptions_of("a").is_empty());
    }
}
