use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Extension, Router};

use crate::api::rest::handlers;
use crate::domain::service::InvoiceLedger;

pub fn register_routes(router: Router, ledger: Arc<InvoiceLedger>) -> Router {
    router
        // GET /?status=open|overdue|paid, POST /
        .route("/", get(handlers::list_invoices).post(handlers::create_invoice))
        .route("/{id}/pay", post(handlers::pay_invoice))
        .layer(Extension(ledger))
}
