//! Shared handles passed into every lifecycle call.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthProvider, TokenIssuer};
use crate::events::EventBus;
use crate::http::HttpMount;
use crate::persistence::Persistence;
use crate::registry::ModuleRegistry;
use crate::service_registry::ServiceRegistry;

/// Source of per-module configuration sections.
pub trait ConfigProvider: Send + Sync {
    /// Raw config section for `module_name`, if configured.
    fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value>;
}

/// Provider with no module sections at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyConfigProvider;

impl ConfigProvider for EmptyConfigProvider {
    fn get_module_config(&self, _module_name: &str) -> Option<&serde_json::Value> {
        None
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("module '{module}' not found in configuration")]
    ModuleNotFound { module: String },
    #[error("invalid configuration for module '{module}'")]
    InvalidConfig {
        module: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Deserialize the config section of `module_name` into `T`.
pub fn module_config_typed<T: DeserializeOwned>(
    provider: &dyn ConfigProvider,
    module_name: &str,
) -> Result<T, ConfigError> {
    let raw = provider
        .get_module_config(module_name)
        .ok_or_else(|| ConfigError::ModuleNotFound {
            module: module_name.to_string(),
        })?;
    serde_json::from_value(raw.clone()).map_err(|source| ConfigError::InvalidConfig {
        module: module_name.to_string(),
        source,
    })
}

/// Immutable bag of shared infrastructure; clones share every handle.
#[derive(Clone)]
pub struct ModuleCtx {
    persistence: Option<Arc<dyn Persistence>>,
    http: Arc<HttpMount>,
    events: Arc<EventBus>,
    span: tracing::Span,
    services: Arc<ServiceRegistry>,
    auth: Option<Arc<dyn AuthProvider>>,
    tokens: Option<Arc<dyn TokenIssuer>>,
    registry: Arc<ModuleRegistry>,
    config: Arc<dyn ConfigProvider>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ModuleCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCtx")
            .field(
                "persistence",
                &self.persistence.as_ref().map(|p| p.backend().to_string()),
            )
            .field("api_root", &self.http.api_root())
            .field("services", &self.services.list())
            .field("has_auth", &self.auth.is_some())
            .field("has_tokens", &self.tokens.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl ModuleCtx {
    pub fn persistence(&self) -> Option<&Arc<dyn Persistence>> {
        self.persistence.as_ref()
    }

    pub fn http(&self) -> &Arc<HttpMount> {
        &self.http
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn auth(&self) -> Option<&Arc<dyn AuthProvider>> {
        self.auth.as_ref()
    }

    pub fn tokens(&self) -> Option<&Arc<dyn TokenIssuer>> {
        self.tokens.as_ref()
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn config_provider(&self) -> &Arc<dyn ConfigProvider> {
        &self.config
    }

    /// Typed config section of `module_name`.
    pub fn module_config<T: DeserializeOwned>(&self, module_name: &str) -> Result<T, ConfigError> {
        module_config_typed(self.config.as_ref(), module_name)
    }

    /// Like [`Self::module_config`] but falls back to `T::default()` when the
    /// section is absent. A present but malformed section is still an error.
    pub fn module_config_or_default<T>(&self, module_name: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        match self.module_config(module_name) {
            Err(ConfigError::ModuleNotFound { .. }) => Ok(T::default()),
            other => other,
        }
    }

    /// Cancelled when the host begins shutting down.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Builds a [`ModuleCtx`]; only the event bus and registry are mandatory.
pub struct ModuleContextBuilder {
    registry: Arc<ModuleRegistry>,
    events: Arc<EventBus>,
    persistence: Option<Arc<dyn Persistence>>,
    http: Option<Arc<HttpMount>>,
    services: Option<Arc<ServiceRegistry>>,
    auth: Option<Arc<dyn AuthProvider>>,
    tokens: Option<Arc<dyn TokenIssuer>>,
    config: Option<Arc<dyn ConfigProvider>>,
    span: Option<tracing::Span>,
    cancel: Option<CancellationToken>,
}

impl ModuleContextBuilder {
    pub fn new(registry: Arc<ModuleRegistry>, events: Arc<EventBus>) -> Self {
        Self {
            registry,
            events,
            persistence: None,
            http: None,
            services: None,
            auth: None,
            tokens: None,
            config: None,
            span: None,
            cancel: None,
        }
    }

    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn http(mut self, http: Arc<HttpMount>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn services(mut self, services: Arc<ServiceRegistry>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn tokens(mut self, tokens: Arc<dyn TokenIssuer>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn config(mut self, config: Arc<dyn ConfigProvider>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn span(mut self, span: tracing::Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(self) -> ModuleCtx {
        ModuleCtx {
            persistence: self.persistence,
            http: self.http.unwrap_or_default(),
            events: self.events,
            span: self
                .span
                .unwrap_or_else(|| tracing::info_span!("bizkit")),
            services: self.services.unwrap_or_default(),
            auth: self.auth,
            tokens: self.tokens,
            registry: self.registry,
            config: self
                .config
                .unwrap_or_else(|| Arc::new(EmptyConfigProvider)),
            cancel: self.cancel.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    struct StaticConfig(serde_json::Value);

    impl ConfigProvider for StaticConfig {
        fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value> {
            self.0.get(module_name)
        }
    }

    #[derive(Debug, Deserialize, Default, PartialEq)]
    struct SweepConfig {
        #[serde(default)]
        interval_secs: u64,
    }

    fn ctx_with(config: serde_json::Value) -> ModuleCtx {
        ModuleContextBuilder::new(
            Arc::new(ModuleRegistry::new()),
            Arc::new(EventBus::with_default_capacity()),
        )
        .config(Arc::new(StaticConfig(config)))
        .build()
    }

    #[tokio::test]
    async fn module_config_is_typed() {
        let ctx = ctx_with(json!({ "invoices": { "interval_secs": 30 } }));
        let cfg: SweepConfig = ctx.module_config("invoices").unwrap();
        assert_eq!(cfg.interval_secs, 30);

        assert!(matches!(
            ctx.module_config::<SweepConfig>("clients"),
            Err(ConfigError::ModuleNotFound { .. })
        ));
        assert_eq!(
            ctx.module_config_or_default::<SweepConfig>("clients").unwrap(),
            SweepConfig::default()
        );
    }

    #[tokio::test]
    async fn malformed_section_is_reported() {
        let ctx = ctx_with(json!({ "invoices": { "interval_secs": "soon" } }));
        let err = ctx
            .module_config_or_default::<SweepConfig>("invoices")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig { ref module, .. } if module == "invoices"));
    }

    #[tokio::test]
    async fn clones_share_handles() {
        let ctx = ctx_with(json!({}));
        let copy = ctx.clone();
        assert!(Arc::ptr_eq(ctx.events(), copy.events()));
        assert!(Arc::ptr_eq(ctx.services(), copy.services()));
        assert!(ctx.persistence().is_none());
        assert_eq!(ctx.http().api_root(), "/api/v1");

        ctx.cancellation_token().cancel();
        assert!(copy.cancellation_token().is_cancelled());
    }
}
