//! Persistence handle contract.
//!
//! The core never stores domain entities itself; it only hands each module's
//! entity declarations to whatever backend the host plugged in, before the
//! module initializes.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// A persisted entity declared by a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    pub table: String,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
        }
    }
}

#[async_trait]
pub trait Persistence: Send + Sync {
    /// Backend identifier used in logs, e.g. `"memory"` or `"postgres"`.
    fn backend(&self) -> &str;

    /// Prepare storage for the entities owned by `module`.
    async fn migrate(&self, module: &str, entities: &[EntityDescriptor]) -> anyhow::Result<()>;
}

/// Schema catalog that only records table ownership.
///
/// Used when no database is configured and in tests; rejects two modules
/// claiming the same table.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    tables: DashMap<String, (String, EntityDescriptor)>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Module owning `table`, if any.
    pub fn owner_of(&self, table: &str) -> Option<String> {
        self.tables.get(table).map(|e| e.value().0.clone())
    }

    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        tables.sort();
        tables
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn migrate(&self, module: &str, entities: &[EntityDescriptor]) -> anyhow::Result<()> {
        for entity in entities {
            if let Some(existing) = self.tables.get(&entity.table) {
                let (owner, _) = existing.value();
                if owner != module {
                    anyhow::bail!(
                        "table '{}' for entity '{}' is already owned by module '{}'",
                        entity.table,
                        entity.name,
                        owner
                    );
                }
            }
        }
        for entity in entities {
            self.tables
                .insert(entity.table.clone(), (module.to_string(), entity.clone()));
        }
        Ok(())
    }
}
