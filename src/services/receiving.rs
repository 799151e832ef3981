//! Purchase-order receiving: the one transaction that matches a supplier
//! delivery against an open order, increments stock, materializes pending
//! products, applies payment, and recomputes order status.
//!
//! Validation runs as a full dry-run pass over every line before any write,
//! so a rejected request leaves no partial state. The order row carries a
//! version counter; the closing update is filtered on the version that was
//! read, and a zero-row update means another receipt won the race. Losers are
//! retried a bounded number of times against fresh state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::ReceivingConfig,
    entities::{
        purchase_order::{self, Entity as PurchaseOrderEntity},
        purchase_order_line::{self, Entity as PurchaseOrderLineEntity},
        receipt_token::{self, Entity as ReceiptTokenEntity},
    },
    errors::{LineItemError, ServiceError},
    events::{Event, EventSender},
    services::{
        order_status::{self, OrderStatus, PaymentStatus},
        payment_ledger, product_resolver,
        product_resolver::{Resolution, ResolutionContext},
        stock_ledger,
    },
};

/// One line of a receipt request.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReceiveLineItem {
    pub line_item_id: Uuid,
    #[validate(range(min = 0))]
    pub quantity_received_delta: i32,
    pub purchase_price: Decimal,
    pub selling_price: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub low_stock_threshold: Option<i32>,
    pub variant_descriptor: Option<serde_json::Value>,
}

/// Payment recorded alongside a receipt. A zero amount records goods only.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PaymentInstruction {
    pub amount: Decimal,
    #[validate(length(min = 1, max = 64))]
    pub method: String,
    pub notes: Option<String>,
}

/// A full receipt request for one purchase order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReceiveItemsCommand {
    pub order_id: Uuid,
    /// Idempotency key: resubmitting the same token for the same order
    /// replays the original result instead of reprocessing.
    #[validate(length(min = 1, max = 128))]
    pub client_request_token: String,
    #[validate]
    pub items: Vec<ReceiveLineItem>,
    #[validate]
    pub payment: Option<PaymentInstruction>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderSnapshot {
    pub id: Uuid,
    pub invoice_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    pub grand_total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatedProduct {
    pub product_id: Uuid,
    pub name: String,
    pub sku: String,
    pub initial_stock: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdatedLineItem {
    pub line_item_id: Uuid,
    pub quantity_received: i32,
    pub quantity_ordered: i32,
}

/// Summary returned by a successful receipt.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReceiptResult {
    pub order: OrderSnapshot,
    pub new_products_created: Vec<CreatedProduct>,
    pub updated_line_items: Vec<UpdatedLineItem>,
}

/// The receiving processor. Orchestrates product resolution, the stock batch
/// ledger, the payment ledger, and status recomputation as one transaction
/// per request.
#[derive(Clone)]
pub struct ReceivingService {
    db: Arc<DatabaseConnection>,
    policy: ReceivingConfig,
    event_sender: Option<EventSender>,
    // Serializes same-order receipts within this process; cross-process
    // races still fall through to the version check.
    order_locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ReceivingService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        policy: ReceivingConfig,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            db,
            policy,
            event_sender,
            order_locks: Arc::new(DashMap::new()),
        }
    }

    /// Applies a receipt request. See the module docs for the transactional
    /// contract; on success every side effect has committed, on error none
    /// has.
    #[instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn receive_items(
        &self,
        cmd: ReceiveItemsCommand,
    ) -> Result<ReceiptResult, ServiceError> {
        cmd.validate()
            .map_err(|e| ServiceError::validation(e.to_string()))?;

        if let Some(result) = self
            .find_replay(cmd.order_id, &cmd.client_request_token)
            .await?
        {
            return Ok(result);
        }

        let lock = self
            .order_locks
            .entry(cmd.order_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let mut attempt = 0;
        loop {
            match self.try_apply(&cmd).await {
                // Lost optimistic races and transient connection failures are
                // retried against fresh state up to the configured bound.
                Err(err) if err.is_transient() && attempt < self.policy.max_conflict_retries => {
                    attempt += 1;
                    warn!(
                        order_id = %cmd.order_id,
                        attempt,
                        error = %err,
                        "transient receipt failure, retrying"
                    );
                }
                Err(ServiceError::Database(e))
                    if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
                {
                    // A concurrent request consumed the same token first;
                    // surface its stored result.
                    return match self
                        .find_replay(cmd.order_id, &cmd.client_request_token)
                        .await?
                    {
                        Some(result) => Ok(result),
                        None => Err(ServiceError::Database(e)),
                    };
                }
                Ok((result, events)) => {
                    if let Some(sender) = &self.event_sender {
                        for event in events {
                            sender.send_or_log(event).await;
                        }
                    }
                    return Ok(result);
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Looks up a previously consumed token for this order.
    async fn find_replay(
        &self,
        order_id: Uuid,
        token: &str,
    ) -> Result<Option<ReceiptResult>, ServiceError> {
        let stored = ReceiptTokenEntity::find()
            .filter(receipt_token::Column::PurchaseOrderId.eq(order_id))
            .filter(receipt_token::Column::Token.eq(token))
            .one(&*self.db)
            .await?;
        stored.map(|model| decode_result(&model)).transpose()
    }

    /// One attempt at the full receive transaction.
    async fn try_apply(
        &self,
        cmd: &ReceiveItemsCommand,
    ) -> Result<(ReceiptResult, Vec<Event>), ServiceError> {
        let txn = self.db.begin().await?;

        // A duplicate token that committed between the fast-path check and
        // here replays the stored result.
        if let Some(stored) = ReceiptTokenEntity::find()
            .filter(receipt_token::Column::PurchaseOrderId.eq(cmd.order_id))
            .filter(receipt_token::Column::Token.eq(cmd.client_request_token.clone()))
            .one(&txn)
            .await?
        {
            txn.commit().await?;
            return Ok((decode_result(&stored)?, Vec::new()));
        }

        let order = PurchaseOrderEntity::find_by_id(cmd.order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase order {} not found", cmd.order_id))
            })?;

        let current_status: OrderStatus = order.status.parse().map_err(|_| {
            ServiceError::Internal(format!("Order {} has invalid status", order.id))
        })?;
        if current_status.rejects_receipts() {
            return Err(ServiceError::TerminalState {
                order_id: order.id,
                status: order.status.clone(),
            });
        }

        let lines = PurchaseOrderLineEntity::find()
            .filter(purchase_order_line::Column::PurchaseOrderId.eq(order.id))
            .all(&txn)
            .await?;
        let line_map: HashMap<Uuid, &purchase_order_line::Model> =
            lines.iter().map(|l| (l.id, l)).collect();

        // Dry-run validation over the whole request; nothing is written until
        // every line and the payment have passed.
        let line_errors = validate_items(&cmd.items, &line_map);
        if !line_errors.is_empty() {
            return Err(ServiceError::Validation {
                message: format!("{} line item(s) rejected", line_errors.len()),
                line_errors,
            });
        }
        if let Some(payment) = &cmd.payment {
            if payment.amount < Decimal::ZERO {
                return Err(ServiceError::validation(format!(
                    "Payment amount must not be negative, got {}",
                    payment.amount
                )));
            }
            if order.amount_paid + payment.amount > order.grand_total {
                return Err(ServiceError::Overpayment {
                    attempted: order.amount_paid + payment.amount,
                    grand_total: order.grand_total,
                });
            }
        }

        // Apply phase.
        let receipt_id = Uuid::new_v4();
        let mut ctx = ResolutionContext::default();
        let mut events = Vec::new();
        let mut created_products = Vec::new();
        let mut touched: HashSet<Uuid> = HashSet::new();

        for item in &cmd.items {
            let line = line_map[&item.line_item_id];
            let effective = merge_line_snapshot(line, item);

            let resolution =
                product_resolver::resolve(&txn, &order, &effective, &mut ctx).await?;
            let product_id = resolution.product_id();
            if let Resolution::Created(product) = &resolution {
                created_products.push(CreatedProduct {
                    product_id: product.id,
                    name: product.name.clone(),
                    sku: product.sku.clone(),
                    initial_stock: item.quantity_received_delta,
                });
                events.push(Event::ProductCreated {
                    product_id: product.id,
                    sku: product.sku.clone(),
                    source_line_id: line.id,
                });
            }

            if item.quantity_received_delta > 0 {
                stock_ledger::append(
                    &txn,
                    product_id,
                    order.store_id,
                    item.quantity_received_delta,
                    item.purchase_price,
                    stock_ledger::BatchSource {
                        purchase_order_line_id: line.id,
                        receipt_id,
                    },
                )
                .await?;
                events.push(Event::StockBatchRecorded {
                    product_id,
                    store_id: order.store_id,
                    quantity: item.quantity_received_delta,
                    unit_cost: item.purchase_price,
                });
                touched.insert(line.id);
            }

            let selling_price = self.effective_selling_price(line, item);
            let mut active: purchase_order_line::ActiveModel = line.clone().into();
            active.quantity_received = Set(line.quantity_received + item.quantity_received_delta);
            active.purchase_price = Set(item.purchase_price);
            active.selling_price = Set(Some(selling_price));
            if let Some(rate) = item.tax_rate {
                active.tax_rate = Set(Some(rate));
            }
            if let Some(threshold) = item.low_stock_threshold {
                active.low_stock_threshold = Set(Some(threshold));
            }
            if let Some(descriptor) = item.variant_descriptor.clone() {
                active.variant_descriptor = Set(Some(descriptor));
            }
            active.updated_at = Set(Some(Utc::now()));
            active.update(&txn).await?;
        }

        let payment_outcome = match &cmd.payment {
            Some(payment) => {
                let outcome = payment_ledger::apply(
                    &txn,
                    &order,
                    payment.amount,
                    &payment.method,
                    payment.notes.clone(),
                )
                .await?;
                if payment.amount > Decimal::ZERO {
                    events.push(Event::PaymentRecorded {
                        order_id: order.id,
                        amount: payment.amount,
                        new_amount_paid: outcome.amount_paid,
                    });
                }
                outcome
            }
            None => payment_ledger::apply(&txn, &order, Decimal::ZERO, "none", None).await?,
        };

        let fresh_lines = PurchaseOrderLineEntity::find()
            .filter(purchase_order_line::Column::PurchaseOrderId.eq(order.id))
            .all(&txn)
            .await?;
        let (new_status, _progress) = order_status::recompute(current_status, &fresh_lines);

        let updated = PurchaseOrderEntity::update_many()
            .col_expr(
                purchase_order::Column::Status,
                Expr::value(new_status.to_string()),
            )
            .col_expr(
                purchase_order::Column::PaymentStatus,
                Expr::value(payment_outcome.payment_status.to_string()),
            )
            .col_expr(
                purchase_order::Column::AmountPaid,
                Expr::value(payment_outcome.amount_paid),
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

        if new_status != current_status {
            events.push(Event::PurchaseOrderStatusChanged {
                order_id: order.id,
                old_status: current_status.to_string(),
                new_status: new_status.to_string(),
            });
        }
        events.push(Event::PurchaseOrderReceived {
            order_id: order.id,
            receipt_id,
            lines_received: touched.len(),
        });

        let result = ReceiptResult {
            order: OrderSnapshot {
                id: order.id,
                invoice_number: order.po_number.clone(),
                status: new_status,
                payment_status: payment_outcome.payment_status,
                amount_paid: payment_outcome.amount_paid,
                amount_due: payment_outcome.amount_due,
                grand_total: order.grand_total,
            },
            new_products_created: created_products,
            updated_line_items: fresh_lines
                .iter()
                .filter(|l| touched.contains(&l.id))
                .map(|l| UpdatedLineItem {
                    line_item_id: l.id,
                    quantity_received: l.quantity_received,
                    quantity_ordered: l.quantity_ordered,
                })
                .collect(),
        };

        receipt_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            purchase_order_id: Set(order.id),
            token: Set(cmd.client_request_token.clone()),
            result: Set(encode_result(&result)?),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok((result, events))
    }

    /// Selling price carried onto the line after this receipt. Absent prices
    /// for existing-product lines fall back to the configured default markup
    /// over the purchase price; pending-product lines were already required
    /// to carry one.
    fn effective_selling_price(
        &self,
        line: &purchase_order_line::Model,
        item: &ReceiveLineItem,
    ) -> Decimal {
        item.selling_price
            .or(line.selling_price)
            .filter(|p| *p > Decimal::ZERO)
            .unwrap_or_else(|| (item.purchase_price * self.policy.markup_factor()).round_dp(2))
    }
}

/// The line model as this receipt sees it: the stored snapshot with the
/// request's prices and attributes folded in. This is what the resolver
/// materializes a product from.
fn merge_line_snapshot(
    line: &purchase_order_line::Model,
    item: &ReceiveLineItem,
) -> purchase_order_line::Model {
    let mut effective = line.clone();
    effective.purchase_price = item.purchase_price;
    effective.selling_price = item.selling_price.or(line.selling_price);
    if item.low_stock_threshold.is_some() {
        effective.low_stock_threshold = item.low_stock_threshold;
    }
    effective
}

/// Full dry-run validation of the request's line items. Returns every
/// failure, not just the first, so the caller can surface all offending
/// lines at once.
fn validate_items(
    items: &[ReceiveLineItem],
    lines: &HashMap<Uuid, &purchase_order_line::Model>,
) -> Vec<LineItemError> {
    let mut errors = Vec::new();
    let mut seen: HashSet<Uuid> = HashSet::new();

    for item in items {
        if !seen.insert(item.line_item_id) {
            errors.push(LineItemError::new(
                item.line_item_id,
                "line item appears more than once in the request",
            ));
            continue;
        }

        let Some(line) = lines.get(&item.line_item_id) else {
            errors.push(LineItemError::new(
                item.line_item_id,
                "line item does not belong to this purchase order",
            ));
            continue;
        };

        if item.quantity_received_delta < 0 {
            errors.push(LineItemError::new(
                item.line_item_id,
                "received quantity delta must not be negative",
            ));
            continue;
        }

        if item.purchase_price <= Decimal::ZERO {
            errors.push(LineItemError::new(
                item.line_item_id,
                "purchase price must be positive",
            ));
            continue;
        }

        if line.product_id.is_none() {
            let selling = item.selling_price.or(line.selling_price);
            if !selling.is_some_and(|p| p > Decimal::ZERO) {
                errors.push(LineItemError::new(
                    item.line_item_id,
                    "new product requires a positive selling price",
                ));
                continue;
            }
        }

        let new_total = line.quantity_received + item.quantity_received_delta;
        if new_total > line.quantity_ordered {
            errors.push(LineItemError::new(
                item.line_item_id,
                format!(
                    "receipt of {} would exceed ordered quantity: {} of {} already received",
                    item.quantity_received_delta, line.quantity_received, line.quantity_ordered
                ),
            ));
        }
    }

    errors
}

fn encode_result(result: &ReceiptResult) -> Result<serde_json::Value, ServiceError> {
    serde_json::to_value(result)
        .map_err(|e| ServiceError::Internal(format!("Failed to encode receipt result: {}", e)))
}

fn decode_result(stored: &receipt_token::Model) -> Result<ReceiptResult, ServiceError> {
    serde_json::from_value(stored.result.clone())
        .map_err(|e| ServiceError::Internal(format!("Failed to decode stored receipt: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn line(ordered: i32, received: i32, product: Option<Uuid>) -> purchase_order_line::Model {
        purchase_order_line::Model {
            id: Uuid::new_v4(),
            purchase_order_id: Uuid::new_v4(),
            product_id: product,
            description: "widget".into(),
            unit: "pcs".into(),
            quantity_ordered: ordered,
            quantity_received: received,
            purchase_price: dec!(10),
            selling_price: None,
            tax_rate: None,
            low_stock_threshold: None,
            variant_descriptor: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn item(line_id: Uuid, delta: i32) -> ReceiveLineItem {
        ReceiveLineItem {
            line_item_id: line_id,
            quantity_received_delta: delta,
            purchase_price: dec!(10),
            selling_price: Some(dec!(15)),
            tax_rate: None,
            low_stock_threshold: None,
            variant_descriptor: None,
        }
    }

    #[test]
    fn over_receipt_is_rejected_with_context() {
        let line = line(100, 100, Some(Uuid::new_v4()));
        let map = HashMap::from([(line.id, &line)]);
        let errors = validate_items(&[item(line.id, 50)], &map);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].reason.contains("100 of 100 already received"));
    }

    #[test]
    fn unknown_and_duplicate_lines_are_flagged() {
        let line = line(10, 0, Some(Uuid::new_v4()));
        let map = HashMap::from([(line.id, &line)]);
        let stranger = item(Uuid::new_v4(), 1);
        let errors = validate_items(&[stranger, item(line.id, 1), item(line.id, 1)], &map);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].reason.contains("does not belong"));
        assert!(errors[1].reason.contains("more than once"));
    }

    #[test]
    fn pending_product_requires_selling_price() {
        let line = line(10, 0, None);
        let map = HashMap::from([(line.id, &line)]);
        let mut bad = item(line.id, 5);
        bad.selling_price = None;
        let errors = validate_items(&[bad], &map);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].reason.contains("selling price"));
    }

    #[test]
    fn valid_partial_receipt_passes_dry_run() {
        let line = line(100, 40, Some(Uuid::new_v4()));
        let map = HashMap::from([(line.id, &line)]);
        assert!(validate_items(&[item(line.id, 60)], &map).is_empty());
    }

    #[test]
    fn zero_delta_line_passes_dry_run() {
        let line = line(100, 100, Some(Uuid::new_v4()));
        let map = HashMap::from([(line.id, &line)]);
        assert!(validate_items(&[item(line.id, 0)], &map).is_empty());
    }
}
