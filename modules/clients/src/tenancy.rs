//! Tenant resolution for REST routes.
//!
//! Every tenant-scoped route sits behind [`tenant_middleware`], which reads the
//! tenant id from a request header and stores it as a [`TenantId`] extension.
//! Handlers take it with `Extension<TenantId>`.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use bizkit::{MiddlewareProvider, Problem};
use http::HeaderName;

pub const DEFAULT_TENANT_HEADER: &str = "x-tenant-id";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
struct TenantHeader(HeaderName);

/// Middleware rejecting requests without a non-empty `header`.
pub fn tenant_middleware(header: &str) -> anyhow::Result<MiddlewareProvider> {
    let header = HeaderName::from_bytes(header.trim().as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid tenant header '{header}': {e}"))?;
    Ok(MiddlewareProvider::new("tenant", move |router| {
        router.layer(axum::middleware::from_fn_with_state(
            TenantHeader(header.clone()),
            require_tenant,
        ))
    }))
}

async fn require_tenant(
    State(TenantHeader(header)): State<TenantHeader>,
    mut req: Request,
    next: Next,
) -> Response {
    let tenant = req
        .headers()
        .get(&header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned);

    match tenant {
        Some(tenant) => {
            req.extensions_mut().insert(TenantId(tenant));
            next.run(req).await
        }
        None => Problem::bad_request(format!("missing '{header}' header"))
            .with_instance(req.uri().path().to_string())
            .into_response(),
    }
}
