use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::{Invoice, InvoiceStatus};

pub const INVOICE_CREATED: &str = "invoice.created";
pub const INVOICE_PAID: &str = "invoice.paid";
pub const INVOICE_OVERDUE: &str = "invoice.overdue";

/// Payload shared by all invoice events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceEvent {
    pub tenant_id: String,
    pub invoice_id: Uuid,
    pub client_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: InvoiceStatus,
    pub due_at: DateTime<Utc>,
}

impl From<&Invoice> for InvoiceEvent {
    fn from(inv: &Invoice) -> Self {
        Self {
            tenant_id: inv.tenant_id.clone(),
            invoice_id: inv.id,
            client_id: inv.client_id,
            amount_cents: inv.amount_cents,
            currency: inv.currency.clone(),
            status: inv.status,
            due_at: inv.due_at,
        }
    }
}
