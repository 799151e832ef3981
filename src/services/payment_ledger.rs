//! Payment ledger for purchase orders.
//!
//! Payments accumulate against the order's immutable grand total; they are
//! deliberately independent of how much of the goods has arrived. The receipt
//! processor calls [`apply`] inside its transaction so a rejected receipt
//! never leaves a half-applied payment behind.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ConnectionTrait};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::{payment_record, purchase_order},
    errors::ServiceError,
    services::order_status::{derive_payment_status, PaymentStatus},
};

/// The outcome of applying a payment: the new running totals and the derived
/// payment status the order row should carry.
#[derive(Debug, Clone, Copy)]
pub struct PaymentOutcome {
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    pub payment_status: PaymentStatus,
}

/// Applies a payment against an order inside the caller's transaction.
///
/// A zero amount is a valid no-op (goods-only receipt): no payment record is
/// written and the current totals are re-derived. Overpayment past the grand
/// total fails before anything is written.
#[instrument(skip(conn, order), fields(order_id = %order.id))]
pub async fn apply<C: ConnectionTrait>(
    conn: &C,
    order: &purchase_order::Model,
    amount: Decimal,
    method: &str,
    notes: Option<String>,
) -> Result<PaymentOutcome, ServiceError> {
    if amount < Decimal::ZERO {
        return Err(ServiceError::validation(format!(
            "Payment amount must not be negative, got {}",
            amount
        )));
    }

    let new_amount_paid = order.amount_paid + amount;
    if new_amount_paid > order.grand_total {
        return Err(ServiceError::Overpayment {
            attempted: new_amount_paid,
            grand_total: order.grand_total,
        });
    }

    if amount > Decimal::ZERO {
        let record = payment_record::ActiveModel {
            id: Set(Uuid::new_v4()),
            purchase_order_id: Set(order.id),
            amount: Set(amount),
            method: Set(method.to_string()),
            notes: Set(notes),
            created_at: Set(Utc::now()),
        };
        record.insert(conn).await?;
    }

    Ok(PaymentOutcome {
        amount_paid: new_amount_paid,
        amount_due: (order.grand_total - new_amount_paid).max(Decimal::ZERO),
        payment_status: derive_payment_status(new_amount_paid, order.grand_total),
    })
}
