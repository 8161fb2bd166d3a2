use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::model::{Invoice, InvoiceStatus, NewInvoice};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceDto {
    pub id: Uuid,
    pub client_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: InvoiceStatus,
    pub issued_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<Invoice> for InvoiceDto {
    fn from(i: Invoice) -> Self {
        Self {
            id: i.id,
            client_id: i.client_id,
            amount_cents: i.amount_cents,
            currency: i.currency,
            status: i.status,
            issued_at: i.issued_at,
            due_at: i.due_at,
            paid_at: i.paid_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateInvoiceReq {
    pub client_id: Uuid,
    pub amount_cents: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub due_in_days: Option<u32>,
}

impl From<CreateInvoiceReq> for NewInvoice {
    fn from(req: CreateInvoiceReq) -> Self {
        Self {
            client_id: req.client_id,
            amount_cents: req.amount_cents,
            currency: req.currency,
            due_in_days: req.due_in_days,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListInvoicesQuery {
    #[serde(default)]
    pub status: Option<InvoiceStatus>,
}
