use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A purchase order aggregate root.
///
/// `grand_total` is fixed once the order exists; only receiving and
/// cancellation mutate the row after that. `version` guards the
/// read-validate-write cycle: every successful mutation bumps it and the
/// update is filtered on the version that was read.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub po_number: String,
    pub supplier_id: Uuid,
    pub store_id: Uuid,
    pub ordered_at: DateTime<Utc>,
    pub grand_total: Decimal,
    pub amount_paid: Decimal,
    pub status: String,
    pub payment_status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

impl Model {
    /// Outstanding balance. Clamped so a fully paid order never reports a
    /// negative due amount.
    pub fn amount_due(&self) -> Decimal {
        (self.grand_total - self.amount_paid).max(Decimal::ZERO)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::purchase_order_line::Entity")]
    PurchaseOrderLines,
    #[sea_orm(has_many = "super::payment_record::Entity")]
    PaymentRecords,
    #[sea_orm(has_many = "super::receipt_token::Entity")]
    ReceiptTokens,
}

impl Related<super::purchase_order_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseOrderLines.def()
    }
}

impl Related<super::payment_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentRecords.def()
    }
}

impl Related<super::receipt_token::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReceiptTokens.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
