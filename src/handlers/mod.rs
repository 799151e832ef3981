pub mod common;
pub mod health;
pub mod purchase_orders;
pub mod receiving;
pub mod stock;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{config::AppConfig, events::EventSender};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub receiving: Arc<crate::services::receiving::ReceivingService>,
    pub purchase_orders: Arc<crate::services::purchase_orders::PurchaseOrderService>,
    pub stock: Arc<crate::services::stock_ledger::StockLedgerService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        event_sender: Option<EventSender>,
    ) -> Self {
        let receiving = Arc::new(crate::services::receiving::ReceivingService::new(
            db.clone(),
            config.receiving.clone(),
            event_sender.clone(),
        ));
        let purchase_orders = Arc::new(crate::services::purchase_orders::PurchaseOrderService::new(
            db.clone(),
            event_sender,
        ));
        let stock = Arc::new(crate::services::stock_ledger::StockLedgerService::new(db));

        Self {
            receiving,
            purchase_orders,
            stock,
        }
    }
}
