//! Deferred product creation.
//!
//! A purchase-order line may reference a product that does not exist yet
//! (`product_id` null). The first receipt of such a line materializes the
//! product from the line's snapshot and rewrites the line to point at it.
//! The transition is one-way and happens at most once per line.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        product::{self, Entity as ProductEntity},
        purchase_order,
        purchase_order_line::{self, LineItemTarget},
    },
    errors::ServiceError,
};

/// Tracks lines already resolved within one receiving transaction, so that
/// resolving the same line twice cannot create two products.
#[derive(Debug, Default)]
pub struct ResolutionContext {
    resolved: HashMap<Uuid, Uuid>,
}

/// Outcome of resolving one line.
#[derive(Debug, Clone)]
pub enum Resolution {
    Existing(Uuid),
    Created(product::Model),
}

impl Resolution {
    pub fn product_id(&self) -> Uuid {
        match self {
            Resolution::Existing(id) => *id,
            Resolution::Created(model) => model.id,
        }
    }
}

/// SKU for a materialized product, derived from the order number and the
/// line id so that two lines can never produce the same value.
pub fn derive_sku(po_number: &str, line_id: Uuid) -> String {
    let discriminator = line_id.simple().to_string();
    format!("{}-{}", po_number, &discriminator[..8]).to_uppercase()
}

/// Resolves a line to a product id inside the caller's transaction,
/// materializing the product when the line is still pending.
#[instrument(skip(conn, order, line, ctx), fields(line_id = %line.id))]
pub async fn resolve<C: ConnectionTrait>(
    conn: &C,
    order: &purchase_order::Model,
    line: &purchase_order_line::Model,
    ctx: &mut ResolutionContext,
) -> Result<Resolution, ServiceError> {
    if let Some(product_id) = ctx.resolved.get(&line.id) {
        return Ok(Resolution::Existing(*product_id));
    }

    let snapshot = match line.target() {
        LineItemTarget::ExistingProduct(id) => {
            ctx.resolved.insert(line.id, id);
            return Ok(Resolution::Existing(id));
        }
        LineItemTarget::PendingProduct(snapshot) => snapshot,
    };

    let selling_price = snapshot
        .selling_price
        .filter(|p| *p > Decimal::ZERO)
        .ok_or(ServiceError::MissingPrice {
            line_item_id: line.id,
        })?;
    if snapshot.purchase_price <= Decimal::ZERO {
        return Err(ServiceError::MissingPrice {
            line_item_id: line.id,
        });
    }

    let sku = derive_sku(&order.po_number, line.id);
    let collision = ProductEntity::find()
        .filter(product::Column::Sku.eq(sku.clone()))
        .one(conn)
        .await?;
    if collision.is_some() {
        return Err(ServiceError::DuplicateSku(sku));
    }

    let created = product::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(snapshot.name),
        sku: Set(sku),
        unit: Set(snapshot.unit),
        purchase_price: Set(snapshot.purchase_price),
        selling_price: Set(selling_price),
        low_stock_threshold: Set(snapshot.low_stock_threshold),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    }
    .insert(conn)
    .await?;

    let mut line_update: purchase_order_line::ActiveModel = line.clone().into();
    line_update.product_id = Set(Some(created.id));
    line_update.updated_at = Set(Some(Utc::now()));
    line_update.update(conn).await?;

    ctx.resolved.insert(line.id, created.id);
    info!(product_id = %created.id, sku = %created.sku, "materialized product from receipt line");
    Ok(Resolution::Created(created))
}
