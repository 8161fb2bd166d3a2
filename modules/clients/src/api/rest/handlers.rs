use std::sync::Arc;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::{Extension, Json};
use bizkit::Problem;
use tracing::info;
use uuid::Uuid;

use crate::api::rest::dto::{ClientDto, CreateClientReq};
use crate::domain::service::ClientDirectory;
use crate::tenancy::TenantId;

type ApiResult<T> = Result<T, Problem>;

pub async fn list_clients(
    Extension(tenant): Extension<TenantId>,
    Extension(svc): Extension<Arc<ClientDirectory>>,
) -> Json<Vec<ClientDto>> {
    let clients = svc.list(tenant.as_str());
    Json(clients.into_iter().map(ClientDto::from).collect())
}

#[tracing::instrument(name = "clients.create_client", skip_all, fields(tenant = %tenant))]
pub async fn create_client(
    Extension(tenant): Extension<TenantId>,
    Extension(svc): Extension<Arc<ClientDirectory>>,
    Json(req): Json<CreateClientReq>,
) -> ApiResult<(StatusCode, Json<ClientDto>)> {
    let client = svc.create(tenant.as_str(), req.into()).await?;
    info!(client_id = %client.id, "Client created via REST");
    Ok((StatusCode::CREATED, Json(client.into())))
}

pub async fn get_client(
    Extension(tenant): Extension<TenantId>,
    Extension(svc): Extension<Arc<ClientDirectory>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ClientDto>> {
    let client = svc.get(tenant.as_str(), id)?;
    Ok(Json(client.into()))
}
