//! Name-keyed store of singleton services created during module setup.
//!
//! Services are stored type-erased and recovered with [`ServiceRegistry::get_typed`],
//! which works for concrete types and trait objects alike:
//!
//! ```rust,ignore
//! services.register_service::<dyn InvoiceApi>("invoices.api", Arc::new(Ledger::new()))?;
//! let api = services.get_typed::<dyn InvoiceApi>("invoices.api")?;
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("service '{0}' is already registered")]
    AlreadyRegistered(String),
    #[error("service '{0}' is not registered")]
    NotFound(String),
    #[error("service '{name}' has type '{actual}', not '{expected}'")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
}

/// A type-erased `Arc<T>` plus the name of `T` for diagnostics.
#[derive(Clone)]
pub struct ServiceInstance {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl ServiceInstance {
    pub fn new<T>(service: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Self {
            type_name: std::any::type_name::<T>(),
            value: Arc::new(service),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Recover the service if it was stored as `Arc<T>`.
    pub fn downcast<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.value.downcast_ref::<Arc<T>>().cloned()
    }
}

impl std::fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceInstance")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Registration is bootstrap-only and exclusive; lookups run in parallel.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, ServiceInstance>>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.list())
            .finish()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `instance`. An existing binding is never replaced.
    pub fn register(&self, name: &str, instance: ServiceInstance) -> Result<(), ServiceError> {
        let mut services = self.services.write();
        if services.contains_key(name) {
            return Err(ServiceError::AlreadyRegistered(name.to_string()));
        }
        tracing::debug!(service = name, type_name = instance.type_name(), "Service registered");
        services.insert(name.to_string(), instance);
        Ok(())
    }

    pub fn register_service<T>(&self, name: &str, service: Arc<T>) -> Result<(), ServiceError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register(name, ServiceInstance::new(service))
    }

    pub fn get(&self, name: &str) -> Option<ServiceInstance> {
        self.services.read().get(name).cloned()
    }

    pub fn get_typed<T>(&self, name: &str) -> Result<Arc<T>, ServiceError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let instance = self
            .get(name)
            .ok_or_else(|| ServiceError::NotFound(name.to_string()))?;
        instance
            .downcast::<T>()
            .ok_or_else(|| ServiceError::TypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
                actual: instance.type_name(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.read().contains_key(name)
    }

    /// Sorted snapshot of registered names.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}
