use std::collections::HashMap;
use std::sync::Arc;

use bizkit::EventBus;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::error::DomainError;
use super::events::{ClientCreated, CLIENT_CREATED};
use super::model::{Client, NewClient};

/// Tenant-scoped client store.
///
/// Each tenant owns a separate map; lookups never cross tenants.
pub struct ClientDirectory {
    tenants: DashMap<String, HashMap<Uuid, Client>>,
    events: Arc<EventBus>,
    max_per_tenant: usize,
}

impl std::fmt::Debug for ClientDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientDirectory")
            .field("tenants", &self.tenants.len())
            .field("max_per_tenant", &self.max_per_tenant)
            .finish()
    }
}

impl ClientDirectory {
    pub fn new(events: Arc<EventBus>, max_per_tenant: usize) -> Self {
        Self {
            tenants: DashMap::new(),
            events,
            max_per_tenant,
        }
    }

    /// Store a new client and publish [`CLIENT_CREATED`].
    ///
    /// Subscriber failures are logged; the client stays created.
    #[instrument(name = "clients.directory.create", skip(self, new))]
    pub async fn create(&self, tenant: &str, new: NewClient) -> Result<Client, DomainError> {
        let name = new.name.trim().to_string();
        let email = new.email.trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err(DomainError::Validation("name must not be empty".into()));
        }
        if !is_plausible_email(&email) {
            return Err(DomainError::Validation(format!(
                "'{}' is not a valid email address",
                new.email
            )));
        }

        let client = {
            let mut clients = self.tenants.entry(tenant.to_string()).or_default();
            if clients.values().any(|c| c.email == email) {
                return Err(DomainError::DuplicateEmail { email });
            }
            if clients.len() >= self.max_per_tenant {
                return Err(DomainError::TenantFull {
                    tenant: tenant.to_string(),
                    limit: self.max_per_tenant,
                });
            }
            let client = Client {
                id: Uuid::new_v4(),
                tenant_id: tenant.to_string(),
                name,
                email,
                created_at: Utc::now(),
            };
            clients.insert(client.id, client.clone());
            client
        };
        info!(client_id = %client.id, "Client created");

        let payload = serde_json::json!(ClientCreated::from(&client));
        if let Err(err) = self.events.publish(CLIENT_CREATED, payload).await {
            warn!(
                client_id = %client.id,
                failed = ?err.failed_handlers(),
                error = %err,
                "client.created subscribers reported errors"
            );
        }
        Ok(client)
    }

    pub fn get(&self, tenant: &str, id: Uuid) -> Result<Client, DomainError> {
        self.tenants
            .get(tenant)
            .and_then(|clients| clients.get(&id).cloned())
            .ok_or(DomainError::NotFound { id })
    }

    pub fn exists(&self, tenant: &str, id: Uuid) -> bool {
        self.tenants
            .get(tenant)
            .is_some_and(|clients| clients.contains_key(&id))
    }

    /// Clients of `tenant`, oldest first.
    pub fn list(&self, tenant: &str) -> Vec<Client> {
        let mut clients: Vec<Client> = self
            .tenants
            .get(tenant)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default();
        clients.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        debug!(tenant, count = clients.len(), "Listed clients");
        clients
    }

    pub fn count(&self, tenant: &str) -> usize {
        self.tenants.get(tenant).map_or(0, |c| c.len())
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizkit::handler_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn new_client(name: &str, email: &str) -> NewClient {
        NewClient {
            name: name.into(),
            email: email.into(),
        }
    }

    #[tokio::test]
    async fn clients_are_tenant_scoped() {
        let dir = ClientDirectory::new(Arc::new(EventBus::new(8)), 10);
        let a = dir.create("acme", new_client("Ann", "ann@acme.io")).await.unwrap();
        dir.create("globex", new_client("Ann", "ann@acme.io")).await.unwrap();

        assert_eq!(dir.count("acme"), 1);
        assert_eq!(dir.get("acme", a.id).unwrap().name, "Ann");
        assert_eq!(
            dir.get("globex", a.id).unwrap_err(),
            DomainError::NotFound { id: a.id }
        );
        assert!(dir.exists("acme", a.id));
        assert!(!dir.exists("initech", a.id));
        assert!(dir.list("initech").is_empty());
    }

    #[tokio::test]
    async fn email_is_unique_per_tenant_ignoring_case() {
        let dir = ClientDirectory::new(Arc::new(EventBus::new(8)), 10);
        dir.create("acme", new_client("Ann", "ann@acme.io")).await.unwrap();
        let err = dir
            .create("acme", new_client("Other Ann", " ANN@acme.io "))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::DuplicateEmail {
                email: "ann@acme.io".into()
            }
        );
    }

    #[tokio::test]
    async fn validation_and_limits() {
        let dir = ClientDirectory::new(Arc::new(EventBus::new(8)), 1);
        assert!(matches!(
            dir.create("acme", new_client("  ", "a@b.io")).await,
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            dir.create("acme", new_client("Bob", "bob@localhost")).await,
            Err(DomainError::Validation(_))
        ));

        dir.create("acme", new_client("Bob", "bob@acme.io")).await.unwrap();
        assert_eq!(
            dir.create("acme", new_client("Eve", "eve@acme.io")).await.unwrap_err(),
            DomainError::TenantFull {
                tenant: "acme".into(),
                limit: 1
            }
        );
    }

    #[tokio::test]
    async fn creation_is_published_and_survives_failing_subscribers() {
        let bus = Arc::new(EventBus::new(8));
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        bus.subscribe(
            CLIENT_CREATED,
            "counter",
            handler_fn(move |event| {
                let counter = Arc::clone(&counter);
                async move {
                    let created: ClientCreated = event.payload_as()?;
                    assert_eq!(created.tenant_id, "acme");
                    counter.fetch_add(1, Ordering::SeqCst);
                    anyhow::Ok(())
                }
            }),
            0,
        )
        .unwrap();
        bus.subscribe(
            CLIENT_CREATED,
            "broken",
            handler_fn(|_| async { Err::<(), _>(anyhow::anyhow!("boom")) }),
            10,
        )
        .unwrap();

        let dir = ClientDirectory::new(Arc::clone(&bus), 10);
        let client = dir.create("acme", new_client("Ann", "ann@acme.io")).await.unwrap();

        // Synchronous publish: the handler already ran.
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(dir.exists("acme", client.id));
    }

    #[test]
    fn email_shape() {
        assert!(is_plausible_email("a@b.io"));
        assert!(!is_plausible_email("a@b"));
        assert!(!is_plausible_email("@b.io"));
        assert!(!is_plausible_email("a@.io"));
    }
}
