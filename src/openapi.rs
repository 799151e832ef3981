use utoipa::OpenApi;

/// OpenAPI document for the receiving surface, served at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "storefront-api",
        description = "Purchase-order receiving and inventory reconciliation"
    ),
    paths(
        crate::handlers::receiving::receive_items,
        crate::handlers::purchase_orders::get_purchase_order,
        crate::handlers::purchase_orders::get_receipt_status,
        crate::handlers::purchase_orders::cancel_purchase_order,
        crate::handlers::stock::store_stock_levels,
        crate::handlers::health::health,
    ),
    components(schemas(
        crate::handlers::receiving::ReceiveItemsRequest,
        crate::services::receiving::ReceiveLineItem,
        crate::services::receiving::PaymentInstruction,
        crate::services::receiving::ReceiptResult,
        crate::services::receiving::OrderSnapshot,
        crate::services::receiving::CreatedProduct,
        crate::services::receiving::UpdatedLineItem,
        crate::services::purchase_orders::OrderDetails,
        crate::services::purchase_orders::ReceiptStatusSummary,
        crate::services::order_status::LineProgress,
        crate::services::order_status::OrderStatus,
        crate::services::order_status::PaymentStatus,
        crate::services::stock_ledger::StockLevelRow,
        crate::services::stock_ledger::StockLevel,
        crate::errors::ErrorResponse,
        crate::errors::LineItemError,
    )),
    tags(
        (name = "receiving", description = "Goods receipt against purchase orders"),
        (name = "purchase-orders", description = "Purchase order snapshots and cancellation"),
        (name = "stock", description = "Store stock projections"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;
