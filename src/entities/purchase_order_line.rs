use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One ordered product/quantity/price entry within a purchase order.
///
/// `quantity_ordered` is fixed at order time. `quantity_received` only ever
/// grows, and never past `quantity_ordered`. `product_id` is null until the
/// first receipt materializes the product (see [`Model::target`]).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_order_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub purchase_order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub description: String,
    pub unit: String,
    pub quantity_ordered: i32,
    pub quantity_received: i32,
    pub purchase_price: Decimal,
    pub selling_price: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub low_stock_threshold: Option<i32>,
    pub variant_descriptor: Option<Json>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// What a line item points at: an already-catalogued product, or a product
/// that does not exist yet and must be materialized from the line's snapshot
/// on first receipt.
#[derive(Clone, Debug, PartialEq)]
pub enum LineItemTarget {
    ExistingProduct(Uuid),
    PendingProduct(ProductSnapshot),
}

/// The catalog fields a pending-product line carries until resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct ProductSnapshot {
    pub name: String,
    pub unit: String,
    pub purchase_price: Decimal,
    pub selling_price: Option<Decimal>,
    pub low_stock_threshold: Option<i32>,
}

impl Model {
    pub fn quantity_pending(&self) -> i32 {
        self.quantity_ordered - self.quantity_received
    }

    pub fn is_fully_received(&self) -> bool {
        self.quantity_received >= self.quantity_ordered
    }

    pub fn target(&self) -> LineItemTarget {
        match self.product_id {
            Some(id) => LineItemTarget::ExistingProduct(id),
            None => LineItemTarget::PendingProduct(ProductSnapshot {
                name: self.description.clone(),
                unit: self.unit.clone(),
                purchase_price: self.purchase_price,
                selling_price: self.selling_price,
                low_stock_threshold: self.low_stock_threshold,
            }),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::purchase_order::Entity",
        from = "Column::PurchaseOrderId",
        to = "super::purchase_order::Column::Id"
    )]
    PurchaseOrder,
    #[sea_orm(has_many = "super::stock_batch::Entity")]
    StockBatches,
}

impl Related<super::purchase_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseOrder.def()
    }
}

impl Related<super::stock_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockBatches.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
