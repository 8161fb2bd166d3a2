// === MODULE DEFINITION ===
pub mod module;
pub use module::{InvoicesModule, LEDGER_SERVICE, MODULE_NAME};

pub use domain::events::{InvoiceEvent, INVOICE_CREATED, INVOICE_OVERDUE, INVOICE_PAID};
pub use domain::model::{Account, Invoice, InvoiceStatus, NewInvoice};
pub use domain::service::InvoiceLedger;

// === INTERNAL MODULES ===
// Exposed for tests; not a stable API.
#[doc(hidden)]
pub mod api;
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod domain;
