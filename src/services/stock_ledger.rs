//! Append-only stock batch ledger.
//!
//! Each receipt of a line item lands as one immutable batch row carrying its
//! own unit cost, so cost-layer history survives for downstream costing. The
//! ledger only ever adds; adjustments and consumption live in a separate
//! subsystem, and on-hand figures here are contributions, not owned totals.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        product::{self, Entity as ProductEntity},
        stock_batch::{self, Entity as StockBatchEntity},
    },
    errors::ServiceError,
};

/// Identifies the receipt event and line item that produced a batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchSource {
    pub purchase_order_line_id: Uuid,
    pub receipt_id: Uuid,
}

/// Presentation-only classification of an on-hand figure against a product's
/// low-stock threshold. Never engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StockLevel {
    OutOfStock,
    LowStock,
    InStock,
}

impl StockLevel {
    pub fn classify(on_hand: i64, low_stock_threshold: Option<i32>) -> Self {
        if on_hand <= 0 {
            StockLevel::OutOfStock
        } else if low_stock_threshold.is_some_and(|t| on_hand <= i64::from(t)) {
            StockLevel::LowStock
        } else {
            StockLevel::InStock
        }
    }
}

/// One row of the store stock read model.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StockLevelRow {
    pub product_id: Uuid,
    pub name: String,
    pub sku: String,
    pub on_hand: i64,
    pub level: StockLevel,
}

/// Appends a stock batch inside the caller's transaction. Quantities must be
/// strictly positive; zero-delta receipt lines are skipped upstream and never
/// reach the ledger.
#[instrument(skip(conn))]
pub async fn append<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    store_id: Uuid,
    quantity: i32,
    unit_cost: Decimal,
    source: BatchSource,
) -> Result<stock_batch::Model, ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::validation(format!(
            "Stock batch quantity must be positive, got {}",
            quantity
        )));
    }
    if unit_cost <= Decimal::ZERO {
        return Err(ServiceError::validation(format!(
            "Stock batch unit cost must be positive, got {}",
            unit_cost
        )));
    }

    let batch = stock_batch::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        store_id: Set(store_id),
        quantity: Set(quantity),
        unit_cost: Set(unit_cost),
        purchase_order_line_id: Set(source.purchase_order_line_id),
        receipt_id: Set(source.receipt_id),
        created_at: Set(Utc::now()),
    };

    Ok(batch.insert(conn).await?)
}

/// Sum of batch quantities for a (product, store) pair on any connection.
pub async fn on_hand<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    store_id: Uuid,
) -> Result<i64, ServiceError> {
    let batches = StockBatchEntity::find()
        .filter(stock_batch::Column::ProductId.eq(product_id))
        .filter(stock_batch::Column::StoreId.eq(store_id))
        .all(conn)
        .await?;
    Ok(batches.iter().map(|b| i64::from(b.quantity)).sum())
}

/// Read side of the ledger, consumed by the stock screens.
#[derive(Clone)]
pub struct StockLedgerService {
    db: Arc<DatabaseConnection>,
}

impl StockLedgerService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// On-hand contribution of this ledger for one product at one store.
    pub async fn on_hand(&self, product_id: Uuid, store_id: Uuid) -> Result<i64, ServiceError> {
        on_hand(&*self.db, product_id, store_id).await
    }

    /// Stock levels for every product with batches at the given store,
    /// classified against each product's low-stock threshold.
    #[instrument(skip(self))]
    pub async fn store_stock_levels(
        &self,
        store_id: Uuid,
    ) -> Result<Vec<StockLevelRow>, ServiceError> {
        let db = &*self.db;

        let batches = StockBatchEntity::find()
            .filter(stock_batch::Column::StoreId.eq(store_id))
            .all(db)
            .await?;

        let mut totals: std::collections::HashMap<Uuid, i64> = std::collections::HashMap::new();
        for batch in &batches {
            *totals.entry(batch.product_id).or_insert(0) += i64::from(batch.quantity);
        }

        let product_ids: Vec<Uuid> = totals.keys().copied().collect();
        let products = ProductEntity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(db)
            .await?;

        let mut rows: Vec<StockLevelRow> = products
            .into_iter()
            .map(|p| {
                let on_hand = totals.get(&p.id).copied().unwrap_or(0);
                StockLevelRow {
                    product_id: p.id,
                    name: p.name,
                    sku: p.sku,
                    on_hand,
                    level: StockLevel::classify(on_hand, p.low_stock_threshold),
                }
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, None, StockLevel::OutOfStock)]
    #[case(0, Some(5), StockLevel::OutOfStock)]
    #[case(3, Some(5), StockLevel::LowStock)]
    #[case(5, Some(5), StockLevel::LowStock)]
    #[case(6, Some(5), StockLevel::InStock)]
    #[case(1, None, StockLevel::InStock)]
    fn level_classification(
        #[case] on_hand: i64,
        #[case] threshold: Option<i32>,
        #[case] expected: StockLevel,
    ) {
        assert_eq!(StockLevel::classify(on_hand, threshold), expected);
    }
}
