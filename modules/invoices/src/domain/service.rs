use std::sync::Arc;

use bizkit::EventBus;
use chrono::{DateTime, Utc};
use clients::ClientDirectory;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::error::DomainError;
use super::events::{InvoiceEvent, INVOICE_CREATED, INVOICE_OVERDUE, INVOICE_PAID};
use super::model::{Account, Invoice, InvoiceStatus, NewInvoice};

/// Defaults applied to invoices that do not override them.
#[derive(Debug, Clone)]
pub struct LedgerDefaults {
    pub currency: String,
    pub overdue_after_days: u32,
}

impl Default for LedgerDefaults {
    fn default() -> Self {
        Self {
            currency: "EUR".to_string(),
            overdue_after_days: 30,
        }
    }
}

/// Invoices and per-client accounts of every tenant.
///
/// State changes publish on the queued side of the bus, so callers never wait
/// for subscribers.
pub struct InvoiceLedger {
    invoices: DashMap<Uuid, Invoice>,
    accounts: DashMap<(String, Uuid), Account>,
    clients: Arc<ClientDirectory>,
    events: Arc<EventBus>,
    defaults: LedgerDefaults,
}

impl std::fmt::Debug for InvoiceLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvoiceLedger")
            .field("invoices", &self.invoices.len())
            .field("accounts", &self.accounts.len())
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl InvoiceLedger {
    pub fn new(clients: Arc<ClientDirectory>, events: Arc<EventBus>, defaults: LedgerDefaults) -> Self {
        Self {
            invoices: DashMap::new(),
            accounts: DashMap::new(),
            clients,
            events,
            defaults,
        }
    }

    /// Open a zero-balance account. Returns false if it already existed.
    pub fn open_account(&self, tenant: &str, client_id: Uuid) -> bool {
        match self.accounts.entry((tenant.to_string(), client_id)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Account {
                    tenant_id: tenant.to_string(),
                    client_id,
                    balance_cents: 0,
                    opened_at: Utc::now(),
                });
                debug!(tenant, %client_id, "Account opened");
                true
            }
        }
    }

    pub fn account(&self, tenant: &str, client_id: Uuid) -> Option<Account> {
        self.accounts
            .get(&(tenant.to_string(), client_id))
            .map(|a| a.clone())
    }

    #[instrument(name = "invoices.ledger.create", skip(self, new), fields(client_id = %new.client_id))]
    pub fn create(&self, tenant: &str, new: NewInvoice) -> Result<Invoice, DomainError> {
        if new.amount_cents <= 0 {
            return Err(DomainError::Validation("amount_cents must be positive".into()));
        }
        let currency = new
            .currency
            .as_deref()
            .unwrap_or(&self.defaults.currency)
            .trim()
            .to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::Validation(format!(
                "'{currency}' is not an ISO 4217 currency code"
            )));
        }
        if !self.clients.exists(tenant, new.client_id) {
            return Err(DomainError::UnknownClient {
                client_id: new.client_id,
            });
        }

        let issued_at = Utc::now();
        let days = new.due_in_days.unwrap_or(self.defaults.overdue_after_days);
        let invoice = Invoice {
            id: Uuid::new_v4(),
            tenant_id: tenant.to_string(),
            client_id: new.client_id,
            amount_cents: new.amount_cents,
            currency,
            status: InvoiceStatus::Open,
            issued_at,
            due_at: issued_at + chrono::Duration::days(i64::from(days)),
            paid_at: None,
        };

        if self.open_account(tenant, invoice.client_id) {
            warn!(client_id = %invoice.client_id, "Account was missing; opened on first invoice");
        }
        self.adjust_balance(tenant, invoice.client_id, invoice.amount_cents);
        self.invoices.insert(invoice.id, invoice.clone());

        info!(invoice_id = %invoice.id, amount_cents = invoice.amount_cents, "Invoice created");
        self.emit(INVOICE_CREATED, &invoice);
        Ok(invoice)
    }

    /// Settle an open or overdue invoice.
    pub fn pay(&self, tenant: &str, id: Uuid) -> Result<Invoice, DomainError> {
        let invoice = {
            let mut entry = self
                .invoices
                .get_mut(&id)
                .filter(|inv| inv.tenant_id == tenant)
                .ok_or(DomainError::NotFound { id })?;
            if entry.status == InvoiceStatus::Paid {
                return Err(DomainError::AlreadyPaid { id });
            }
            entry.status = InvoiceStatus::Paid;
            entry.paid_at = Some(Utc::now());
            entry.clone()
        };

        self.adjust_balance(tenant, invoice.client_id, -invoice.amount_cents);
        info!(invoice_id = %id, "Invoice paid");
        self.emit(INVOICE_PAID, &invoice);
        Ok(invoice)
    }

    pub fn get(&self, tenant: &str, id: Uuid) -> Result<Invoice, DomainError> {
        self.invoices
            .get(&id)
            .filter(|inv| inv.tenant_id == tenant)
            .map(|inv| inv.clone())
            .ok_or(DomainError::NotFound { id })
    }

    /// Invoices of `tenant`, oldest first, optionally narrowed to one status.
    pub fn list(&self, tenant: &str, status: Option<InvoiceStatus>) -> Vec<Invoice> {
        let mut invoices: Vec<Invoice> = self
            .invoices
            .iter()
            .filter(|inv| inv.tenant_id == tenant)
            .filter(|inv| status.map_or(true, |s| inv.status == s))
            .map(|inv| inv.clone())
            .collect();
        invoices.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then(a.id.cmp(&b.id)));
        invoices
    }

    /// Flip every open invoice past its due date at `now` to overdue and
    /// publish one event per flipped invoice.
    pub fn mark_overdue(&self, now: DateTime<Utc>) -> Vec<Invoice> {
        let flipped: Vec<Invoice> = self
            .invoices
            .iter_mut()
            .filter_map(|mut inv| {
                if inv.is_past_due(now) {
                    inv.status = InvoiceStatus::Overdue;
                    Some(inv.clone())
                } else {
                    None
                }
            })
            .collect();

        for invoice in &flipped {
            self.emit(INVOICE_OVERDUE, invoice);
        }
        flipped
    }

    fn adjust_balance(&self, tenant: &str, client_id: Uuid, delta: i64) {
        if let Some(mut account) = self.accounts.get_mut(&(tenant.to_string(), client_id)) {
            account.balance_cents += delta;
        }
    }

    fn emit(&self, event_type: &str, invoice: &Invoice) {
        let payload = serde_json::json!(InvoiceEvent::from(invoice));
        if let Err(err) = self.events.publish_async(event_type, payload) {
            warn!(event_type, invoice_id = %invoice.id, error = %err, "Invoice event not queued");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clients::NewClient;

    async fn setup() -> (InvoiceLedger, Arc<EventBus>, Uuid) {
        let bus = Arc::new(EventBus::new(64));
        let directory = Arc::new(ClientDirectory::new(Arc::clone(&bus), 100));
        let client = directory
            .create(
                "acme",
                NewClient {
                    name: "Ann".into(),
                    email: "ann@acme.io".into(),
                },
            )
            .await
            .unwrap();
        let ledger = InvoiceLedger::new(directory, Arc::clone(&bus), LedgerDefaults::default());
        (ledger, bus, client.id)
    }

    fn new_invoice(client_id: Uuid, amount_cents: i64) -> NewInvoice {
        NewInvoice {
            client_id,
            amount_cents,
            currency: None,
            due_in_days: None,
        }
    }

    #[tokio::test]
    async fn balance_follows_invoices_and_payments() {
        let (ledger, _bus, client_id) = setup().await;
        assert!(ledger.open_account("acme", client_id));
        assert!(!ledger.open_account("acme", client_id));

        let a = ledger.create("acme", new_invoice(client_id, 1_500)).unwrap();
        ledger.create("acme", new_invoice(client_id, 500)).unwrap();
        assert_eq!(ledger.account("acme", client_id).unwrap().balance_cents, 2_000);
        assert_eq!(a.currency, "EUR");
        assert_eq!(a.status, InvoiceStatus::Open);

        let paid = ledger.pay("acme", a.id).unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert!(paid.paid_at.is_some());
        assert_eq!(ledger.account("acme", client_id).unwrap().balance_cents, 500);

        assert_eq!(
            ledger.pay("acme", a.id).unwrap_err(),
            DomainError::AlreadyPaid { id: a.id }
        );
        assert_eq!(ledger.list("acme", Some(InvoiceStatus::Open)).len(), 1);
        assert_eq!(ledger.list("acme", None).len(), 2);
    }

    #[tokio::test]
    async fn invoices_require_a_known_client_in_the_tenant() {
        let (ledger, _bus, client_id) = setup().await;
        assert_eq!(
            ledger.create("globex", new_invoice(client_id, 100)).unwrap_err(),
            DomainError::UnknownClient { client_id }
        );
        assert!(matches!(
            ledger.create("acme", new_invoice(client_id, 0)),
            Err(DomainError::Validation(_))
        ));
        let bad_currency = NewInvoice {
            currency: Some("euro".into()),
            ..new_invoice(client_id, 100)
        };
        assert!(matches!(
            ledger.create("acme", bad_currency),
            Err(DomainError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn invoices_are_invisible_across_tenants() {
        let (ledger, _bus, client_id) = setup().await;
        let inv = ledger.create("acme", new_invoice(client_id, 100)).unwrap();
        assert_eq!(
            ledger.get("globex", inv.id).unwrap_err(),
            DomainError::NotFound { id: inv.id }
        );
        assert_eq!(
            ledger.pay("globex", inv.id).unwrap_err(),
            DomainError::NotFound { id: inv.id }
        );
        assert!(ledger.list("globex", None).is_empty());
    }

    #[tokio::test]
    async fn overdue_sweep_flips_only_past_due_open_invoices() {
        let (ledger, _bus, client_id) = setup().await;
        let due_now = ledger
            .create(
                "acme",
                NewInvoice {
                    due_in_days: Some(0),
                    ..new_invoice(client_id, 100)
                },
            )
            .unwrap();
        let later = ledger.create("acme", new_invoice(client_id, 100)).unwrap();
        let paid = ledger
            .create(
                "acme",
                NewInvoice {
                    due_in_days: Some(0),
                    ..new_invoice(client_id, 100)
                },
            )
            .unwrap();
        ledger.pay("acme", paid.id).unwrap();

        let flipped = ledger.mark_overdue(Utc::now() + chrono::Duration::seconds(1));
        assert_eq!(flipped.len(), 1);
        assert_eq!(flipped[0].id, due_now.id);
        assert_eq!(ledger.get("acme", later.id).unwrap().status, InvoiceStatus::Open);

        // Already overdue invoices are not flipped twice.
        assert!(ledger
            .mark_overdue(Utc::now() + chrono::Duration::seconds(1))
            .is_empty());

        // Overdue invoices can still be paid.
        ledger.pay("acme", due_now.id).unwrap();
    }

    #[tokio::test]
    async fn events_are_queued_not_awaited() {
        let (ledger, bus, client_id) = setup().await;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        bus.subscribe(
            INVOICE_CREATED,
            "test.listener",
            bizkit::handler_fn(move |event| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(event.payload_as::<InvoiceEvent>()?);
                    anyhow::Ok(())
                }
            }),
            0,
        )
        .unwrap();

        let inv = ledger.create("acme", new_invoice(client_id, 700)).unwrap();
        let got = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.invoice_id, inv.id);
        assert_eq!(got.amount_cents, 700);
    }
}
