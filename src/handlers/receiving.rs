use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::common::{success_response, validate_input};
use crate::{
    errors::ApiError,
    handlers::AppState,
    services::receiving::{
        PaymentInstruction, ReceiveItemsCommand, ReceiveLineItem, ReceiptResult,
    },
};

/// Body of a receive-items request; the order id comes from the path.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReceiveItemsRequest {
    /// Idempotency key; resubmitting the same token replays the original
    /// result.
    #[validate(length(min = 1, max = 128))]
    pub client_request_token: String,
    #[validate]
    pub items: Vec<ReceiveLineItem>,
    #[validate]
    pub payment: Option<PaymentInstruction>,
}

/// Record delivered goods (and optionally a payment) against a purchase order
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/receipts",
    params(("id" = Uuid, Path, description = "Purchase order id")),
    request_body = ReceiveItemsRequest,
    responses(
        (status = 200, description = "Receipt applied (or replayed for a known token)", body = ReceiptResult),
        (status = 400, description = "Validation failure with per-line reasons", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown purchase order", body = crate::errors::ErrorResponse),
        (status = 409, description = "Cancelled order or unresolved write conflict", body = crate::errors::ErrorResponse),
        (status = 422, description = "Payment exceeds grand total", body = crate::errors::ErrorResponse)
    ),
    tag = "receiving"
)]
pub async fn receive_items(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<ReceiveItemsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let command = ReceiveItemsCommand {
        order_id,
        client_request_token: payload.client_request_token,
        items: payload.items,
        payment: payload.payment,
    };

    let result = state.services.receiving.receive_items(command).await?;
    info!(%order_id, "receipt processed");
    Ok(success_response(result))
}
