//! Storefront receiving API
//!
//! The receiving engine of a storefront/inventory administration backend:
//! matching supplier deliveries against purchase orders, appending stock
//! batches, materializing pending products, and keeping the payment ledger
//! and order status consistent — all behind a thin HTTP layer.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Json, Router,
};
use sea_orm::DatabaseConnection;
use utoipa::OpenApi;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// The versioned API surface.
fn api_router() -> Router<AppState> {
    Router::new()
        .route(
            "/purchase-orders/:id",
            get(handlers::purchase_orders::get_purchase_order),
        )
        .route(
            "/purchase-orders/:id/receipts",
            post(handlers::receiving::receive_items),
        )
        .route(
            "/purchase-orders/:id/receipt-status",
            get(handlers::purchase_orders::get_receipt_status),
        )
        .route(
            "/purchase-orders/:id/cancel",
            post(handlers::purchase_orders::cancel_purchase_order),
        )
        .route(
            "/stores/:store_id/stock",
            get(handlers::stock::store_stock_levels),
        )
}

/// Assembles the full application router.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api-docs/openapi.json", get(serve_openapi))
        .nest("/api/v1", api_router())
        .with_state(state)
}

async fn serve_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi::ApiDoc::openapi())
}
