use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use bizkit::Problem;
use clients::TenantId;
use uuid::Uuid;

use crate::api::rest::dto::{CreateInvoiceReq, InvoiceDto, ListInvoicesQuery};
use crate::domain::service::InvoiceLedger;

type ApiResult<T> = Result<T, Problem>;

pub async fn list_invoices(
    Extension(tenant): Extension<TenantId>,
    Extension(svc): Extension<Arc<InvoiceLedger>>,
    Query(query): Query<ListInvoicesQuery>,
) -> Json<Vec<InvoiceDto>> {
    let invoices = svc.list(tenant.as_str(), query.status);
    Json(invoices.into_iter().map(InvoiceDto::from).collect())
}

#[tracing::instrument(name = "invoices.create_invoice", skip_all, fields(tenant = %tenant))]
pub async fn create_invoice(
    Extension(tenant): Extension<TenantId>,
    Extension(svc): Extension<Arc<InvoiceLedger>>,
    Json(req): Json<CreateInvoiceReq>,
) -> ApiResult<(StatusCode, Json<InvoiceDto>)> {
    let invoice = svc.create(tenant.as_str(), req.into())?;
    Ok((StatusCode::CREATED, Json(invoice.into())))
}

#[tracing::instrument(name = "invoices.pay_invoice", skip_all, fields(tenant = %tenant, invoice_id = %id))]
pub async fn pay_invoice(
    Extension(tenant): Extension<TenantId>,
    Extension(svc): Extension<Arc<InvoiceLedger>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<InvoiceDto>> {
    let invoice = svc.pay(tenant.as_str(), id)?;
    Ok(Json(invoice.into()))
}
