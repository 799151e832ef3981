use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use super::common::success_response;
use crate::{errors::ApiError, handlers::AppState};

/// Fetch a purchase order snapshot with per-line receipt progress
#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders/{id}",
    params(("id" = Uuid, Path, description = "Purchase order id")),
    responses(
        (status = 200, description = "Order snapshot", body = crate::services::purchase_orders::OrderDetails),
        (status = 404, description = "Unknown purchase order", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn get_purchase_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let details = state.services.purchase_orders.get_order(order_id).await?;
    Ok(success_response(details))
}

/// Aggregate receipt progress for a purchase order
#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders/{id}/receipt-status",
    params(("id" = Uuid, Path, description = "Purchase order id")),
    responses(
        (status = 200, description = "Receipt progress", body = crate::services::purchase_orders::ReceiptStatusSummary),
        (status = 404, description = "Unknown purchase order", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn get_receipt_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state
        .services
        .purchase_orders
        .receipt_status(order_id)
        .await?;
    Ok(success_response(summary))
}

/// Cancel a purchase order (terminal; rejects all further receipts)
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Purchase order id")),
    responses(
        (status = 200, description = "Order cancelled (idempotent)", body = crate::services::receiving::OrderSnapshot),
        (status = 400, description = "Fully received orders cannot be cancelled", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown purchase order", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn cancel_purchase_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.services.purchase_orders.cancel(order_id).await?;
    info!(%order_id, "purchase order cancelled via API");
    Ok(success_response(snapshot))
}
