#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ConnectOptions, Database, DatabaseConnection};
use uuid::Uuid;

use storefront_api::{
    config::ReceivingConfig,
    db,
    entities::{product, purchase_order, purchase_order_line},
    services::receiving::ReceivingService,
};

/// Connects an in-memory SQLite database and runs the embedded migrations.
/// A single pooled connection keeps the in-memory database alive for the
/// whole test.
pub async fn setup_db() -> Arc<DatabaseConnection> {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_owned());
    opt.max_connections(1)
        .min_connections(1)
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(false);
    let pool = Database::connect(opt).await.expect("database connect");
    db::run_migrations(&pool).await.expect("migrations");
    Arc::new(pool)
}

/// Connects a file-backed SQLite database for tests that need more than one
/// pooled connection. Returns the tempdir so it outlives the pool.
pub async fn setup_file_db() -> (Arc<DatabaseConnection>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("storefront_test.db");
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let mut opt = ConnectOptions::new(url);
    opt.max_connections(4).min_connections(1).sqlx_logging(false);
    let pool = Database::connect(opt).await.expect("database connect");
    db::run_migrations(&pool).await.expect("migrations");
    (Arc::new(pool), dir)
}

/// A receiving service with default policy and no event fan-out.
pub fn receiving_service(db: Arc<DatabaseConnection>) -> ReceivingService {
    ReceivingService::new(db, ReceivingConfig::default(), None)
}

/// Shape of one seeded purchase-order line.
pub struct LineSpec {
    pub ordered: i32,
    pub purchase_price: Decimal,
    pub product_id: Option<Uuid>,
    pub selling_price: Option<Decimal>,
}

impl LineSpec {
    pub fn pending(ordered: i32, purchase_price: Decimal) -> Self {
        Self {
            ordered,
            purchase_price,
            product_id: None,
            selling_price: None,
        }
    }

    pub fn existing(ordered: i32, purchase_price: Decimal, product_id: Uuid) -> Self {
        Self {
            ordered,
            purchase_price,
            product_id: Some(product_id),
            selling_price: None,
        }
    }
}

pub struct SeededOrder {
    pub order: purchase_order::Model,
    pub lines: Vec<purchase_order_line::Model>,
}

/// Inserts a purchase order in `ordered` state with the given lines.
pub async fn seed_order(
    db: &DatabaseConnection,
    grand_total: Decimal,
    specs: Vec<LineSpec>,
) -> SeededOrder {
    let order_id = Uuid::new_v4();
    let po_number = format!("PO-{}", &Uuid::new_v4().simple().to_string()[..8]).to_uppercase();

    let order = purchase_order::ActiveModel {
        id: Set(order_id),
        po_number: Set(po_number),
        supplier_id: Set(Uuid::new_v4()),
        store_id: Set(Uuid::new_v4()),
        ordered_at: Set(Utc::now()),
        grand_total: Set(grand_total),
        amount_paid: Set(Decimal::ZERO),
        status: Set("ordered".to_string()),
        payment_status: Set("pending".to_string()),
        notes: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
        version: Set(1),
    }
    .insert(db)
    .await
    .expect("seed order");

    let mut lines = Vec::new();
    for (i, spec) in specs.into_iter().enumerate() {
        let line = purchase_order_line::ActiveModel {
            id: Set(Uuid::new_v4()),
            purchase_order_id: Set(order_id),
            product_id: Set(spec.product_id),
            description: Set(format!("Seeded item {}", i + 1)),
            unit: Set("pcs".to_string()),
            quantity_ordered: Set(spec.ordered),
            quantity_received: Set(0),
            purchase_price: Set(spec.purchase_price),
            selling_price: Set(spec.selling_price),
            tax_rate: Set(None),
            low_stock_threshold: Set(None),
            variant_descriptor: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(db)
        .await
        .expect("seed line");
        lines.push(line);
    }

    SeededOrder { order, lines }
}

/// Inserts a catalog product for existing-product lines.
pub async fn seed_product(db: &DatabaseConnection, name: &str) -> product::Model {
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        sku: Set(format!("SKU-{}", &Uuid::new_v4().simple().to_string()[..8]).to_uppercase()),
        unit: Set("pcs".to_string()),
        purchase_price: Set(Decimal::from(10)),
        selling_price: Set(Decimal::from(15)),
        low_stock_threshold: Set(Some(5)),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    }
    .insert(db)
    .await
    .expect("seed product")
}
