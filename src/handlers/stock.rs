use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use super::common::success_response;
use crate::{errors::ApiError, handlers::AppState};

/// Stock levels contributed by receiving for every product at a store
#[utoipa::path(
    get,
    path = "/api/v1/stores/{store_id}/stock",
    params(("store_id" = Uuid, Path, description = "Store id")),
    responses(
        (status = 200, description = "Per-product on-hand and level badge", body = [crate::services::stock_ledger::StockLevelRow])
    ),
    tag = "stock"
)]
pub async fn store_stock_levels(
    State(state): State<AppState>,
    Path(store_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.services.stock.store_stock_levels(store_id).await?;
    Ok(success_response(rows))
}
