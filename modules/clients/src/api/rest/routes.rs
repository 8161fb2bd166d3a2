use std::sync::Arc;

use axum::routing::get;
use axum::{Extension, Router};

use crate::api::rest::handlers;
use crate::domain::service::ClientDirectory;

/// Routes relative to the module prefix:
///
/// - `GET /` list the tenant's clients
/// - `POST /` create a client
/// - `GET /{id}` fetch one client
pub fn register_routes(router: Router, service: Arc<ClientDirectory>) -> Router {
    router
        .route("/", get(handlers::list_clients).post(handlers::create_client))
        .route("/{id}", get(handlers::get_client))
        .layer(Extension(service))
}
