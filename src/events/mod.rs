use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted after a receiving transaction commits. Best-effort:
/// a full channel is logged and dropped, never fails the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    PurchaseOrderReceived {
        order_id: Uuid,
        receipt_id: Uuid,
        lines_received: usize,
    },
    ProductCreated {
        product_id: Uuid,
        sku: String,
        source_line_id: Uuid,
    },
    StockBatchRecorded {
        product_id: Uuid,
        store_id: Uuid,
        quantity: i32,
        unit_cost: Decimal,
    },
    PaymentRecorded {
        order_id: Uuid,
        amount: Decimal,
        new_amount_paid: Decimal,
    },
    PurchaseOrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    PurchaseOrderCancelled {
        order_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Send without surfacing failure to the caller. Receipt processing has
    /// already committed by the time events fire.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping domain event: {}", e);
        }
    }
}

/// Drains the event channel, logging each event. The hook point for future
/// subscribers (notifications, reporting projections).
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match &event {
            Event::PurchaseOrderReceived {
                order_id,
                receipt_id,
                lines_received,
            } => info!(
                %order_id, %receipt_id, lines_received,
                "purchase order receipt recorded"
            ),
            Event::ProductCreated {
                product_id, sku, ..
            } => info!(%product_id, %sku, "product materialized from receipt line"),
            Event::StockBatchRecorded {
                product_id,
                store_id,
                quantity,
                ..
            } => info!(%product_id, %store_id, quantity, "stock batch appended"),
            Event::PaymentRecorded {
                order_id,
                amount,
                new_amount_paid,
            } => info!(%order_id, %amount, %new_amount_paid, "payment applied"),
            Event::PurchaseOrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => info!(%order_id, %old_status, %new_status, "order status changed"),
            Event::PurchaseOrderCancelled { order_id } => {
                info!(%order_id, "purchase order cancelled")
            }
        }
    }
}
