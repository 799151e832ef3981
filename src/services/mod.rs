pub mod order_status;
pub mod payment_ledger;
pub mod product_resolver;
pub mod purchase_orders;
pub mod receiving;
pub mod stock_ledger;
