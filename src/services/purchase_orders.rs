//! Purchase-order read models and the cancellation transition.
//!
//! Order creation lives in the purchasing subsystem; this service only
//! serves the receiving screens (order snapshot, receipt progress) and flips
//! the one terminal state the receiving engine must honor.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        purchase_order::{self, Entity as PurchaseOrderEntity},
        purchase_order_line::{self, Entity as PurchaseOrderLineEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        order_status::{LineProgress, OrderStatus, PaymentStatus},
        receiving::OrderSnapshot,
    },
};

/// Order snapshot plus per-line receipt progress.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: OrderSnapshot,
    pub lines: Vec<LineProgress>,
}

/// Aggregate receipt progress for one order, the read model behind the
/// receiving screen's progress header.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReceiptStatusSummary {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub total_ordered: i64,
    pub total_received: i64,
    pub total_remaining: i64,
    pub lines: Vec<LineProgress>,
}

#[derive(Clone)]
pub struct PurchaseOrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl PurchaseOrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let db = &*self.db;
        let order = PurchaseOrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase order {} not found", order_id))
            })?;
        let lines = self.lines_for(order_id).await?;

        Ok(OrderDetails {
            order: snapshot(&order)?,
            lines: lines.iter().map(LineProgress::from).collect(),
        })
    }

    #[instrument(skip(self))]
    pub async fn receipt_status(
        &self,
        order_id: Uuid,
    ) -> Result<ReceiptStatusSummary, ServiceError> {
        let db = &*self.db;
        let order = PurchaseOrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase order {} not found", order_id))
            })?;
        let lines = self.lines_for(order_id).await?;

        let total_ordered: i64 = lines.iter().map(|l| i64::from(l.quantity_ordered)).sum();
        let total_received: i64 = lines.iter().map(|l| i64::from(l.quantity_received)).sum();

        Ok(ReceiptStatusSummary {
            order_id,
            status: parse_status(&order)?,
            total_ordered,
            total_received,
            total_remaining: total_ordered - total_received,
            lines: lines.iter().map(LineProgress::from).collect(),
        })
    }

    /// Cancels an order. Terminal: once set, the receiving processor rejects
    /// every further receipt. Cancelling an already-cancelled order is a
    /// no-op; cancelling a fully received order is rejected.
    #[instrument(skip(self))]
    pub async fn cancel(&self, order_id: Uuid) -> Result<OrderSnapshot, ServiceError> {
        let txn = self.db.begin().await?;

        let order = PurchaseOrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase order {} not found", order_id))
            })?;

        let status = parse_status(&order)?;
        match status {
            OrderStatus::Cancelled => {
                txn.commit().await?;
                return snapshot(&order);
            }
            OrderStatus::Received => {
                return Err(ServiceError::validation(
                    "a fully received order cannot be cancelled",
                ));
            }
            _ => {}
        }

        let updated = PurchaseOrderEntity::update_many()
            .col_expr(
                purchase_order::Column::Status,
                Expr::value(OrderStatus::Cancelled.to_string()),
            )
            .col_expr(purchase_order::Column::Version, Expr::value(order.version + 1))
            .col_expr(purchase_order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(purchase_order::Column::Id.eq(order.id))
            .filter(purchase_order::Column::Version.eq(order.version))
            .exec(&txn)
            .await?;
        if updated.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(order.id));
        }
        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PurchaseOrderCancelled { order_id: order.id })
                .await;
            sender
                .send_or_log(Event::PurchaseOrderStatusChanged {
                    order_id: order.id,
                    old_status: order.status.clone(),
                    new_status: OrderStatus::Cancelled.to_string(),
                })
                .await;
        }

        info!(%order_id, "purchase order cancelled");
        let mut cancelled = order;
        cancelled.status = OrderStatus::Cancelled.to_string();
        snapshot(&cancelled)
    }

    async fn lines_for(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<purchase_order_line::Model>, ServiceError> {
        Ok(PurchaseOrderLineEntity::find()
            .filter(purchase_order_line::Column::PurchaseOrderId.eq(order_id))
            .all(&*self.db)
            .await?)
    }
}

fn parse_status(order: &purchase_order::Model) -> Result<OrderStatus, ServiceError> {
    order
        .status
        .parse()
        .map_err(|_| ServiceError::Internal(format!("Order {} has invalid status", order.id)))
}

fn parse_payment_status(order: &purchase_order::Model) -> Result<PaymentStatus, ServiceError> {
    order.payment_status.parse().map_err(|_| {
        ServiceError::Internal(format!("Order {} has invalid payment status", order.id))
    })
}

/// Snapshot of an order row in the wire shape shared with receipt results.
pub fn snapshot(order: &purchase_order::Model) -> Result<OrderSnapshot, ServiceError> {
    Ok(OrderSnapshot {
        id: order.id,
        invoice_number: order.po_number.clone(),
        status: parse_status(order)?,
        payment_status: parse_payment_status(order)?,
        amount_paid: order.amount_paid,
        amount_due: order.amount_due(),
        grand_total: order.grand_total,
    })
}
