mod common;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use common::{receiving_service, seed_order, seed_product, setup_db, LineSpec};
use storefront_api::{
    entities::{payment_record, product, purchase_order_line, stock_batch},
    errors::ServiceError,
    services::{
        order_status::{OrderStatus, PaymentStatus},
        receiving::{PaymentInstruction, ReceiveItemsCommand, ReceiveLineItem},
    },
};

fn item(line_id: Uuid, delta: i32, price: Decimal, selling: Option<Decimal>) -> ReceiveLineItem {
    ReceiveLineItem {
        line_item_id: line_id,
        quantity_received_delta: delta,
        purchase_price: price,
        selling_price: selling,
        tax_rate: None,
        low_stock_threshold: None,
        variant_descriptor: None,
    }
}

fn command(
    order_id: Uuid,
    token: &str,
    items: Vec<ReceiveLineItem>,
    payment: Option<PaymentInstruction>,
) -> ReceiveItemsCommand {
    ReceiveItemsCommand {
        order_id,
        client_request_token: token.to_string(),
        items,
        payment,
    }
}

fn payment(amount: Decimal) -> PaymentInstruction {
    PaymentInstruction {
        amount,
        method: "bank_transfer".to_string(),
        notes: None,
    }
}

#[tokio::test]
async fn full_receipt_materializes_product_and_stock() {
    let db = setup_db().await;
    let seeded = seed_order(&db, dec!(1000), vec![LineSpec::pending(100, dec!(10))]).await;
    let svc = receiving_service(db.clone());
    let line_id = seeded.lines[0].id;

    let result = svc
        .receive_items(command(
            seeded.order.id,
            "tok-full-receipt",
            vec![item(line_id, 100, dec!(10), Some(dec!(15)))],
            None,
        ))
        .await
        .expect("receipt should apply");

    assert_eq!(result.order.status, OrderStatus::Received);
    assert_eq!(result.order.payment_status, PaymentStatus::Pending);
    assert_eq!(result.order.amount_paid, dec!(0));
    assert_eq!(result.order.amount_due, dec!(1000));
    assert_eq!(result.new_products_created.len(), 1);
    assert_eq!(result.new_products_created[0].initial_stock, 100);
    assert_eq!(result.updated_line_items.len(), 1);
    assert_eq!(result.updated_line_items[0].quantity_received, 100);

    // The product exists, the line points at it, one batch carries the stock.
    let created = product::Entity::find_by_id(result.new_products_created[0].product_id)
        .one(&*db)
        .await
        .unwrap()
        .expect("product persisted");
    assert!(created.sku.starts_with(&seeded.order.po_number));
    assert_eq!(created.selling_price, dec!(15));

    let line = purchase_order_line::Entity::find_by_id(line_id)
        .one(&*db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line.product_id, Some(created.id));
    assert_eq!(line.quantity_received, 100);

    let batches = stock_batch::Entity::find()
        .filter(stock_batch::Column::ProductId.eq(created.id))
        .all(&*db)
        .await
        .unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].quantity, 100);
    assert_eq!(batches[0].unit_cost, dec!(10));
}

#[tokio::test]
async fn payments_accumulate_and_derive_status() {
    let db = setup_db().await;
    let prod = seed_product(&db, "Existing widget").await;
    let seeded = seed_order(
        &db,
        dec!(1000),
        vec![LineSpec::existing(100, dec!(10), prod.id)],
    )
    .await;
    let svc = receiving_service(db.clone());

    let first = svc
        .receive_items(command(
            seeded.order.id,
            "tok-pay-1",
            vec![],
            Some(payment(dec!(400))),
        ))
        .await
        .expect("first payment");
    assert_eq!(first.order.amount_paid, dec!(400));
    assert_eq!(first.order.amount_due, dec!(600));
    assert_eq!(first.order.payment_status, PaymentStatus::Partial);

    let second = svc
        .receive_items(command(
            seeded.order.id,
            "tok-pay-2",
            vec![],
            Some(payment(dec!(600))),
        ))
        .await
        .expect("second payment");
    assert_eq!(second.order.amount_paid, dec!(1000));
    assert_eq!(second.order.amount_due, dec!(0));
    assert_eq!(second.order.payment_status, PaymentStatus::Paid);

    // amount_paid + amount_due == grand_total after every apply, and the
    // ledger holds exactly one row per non-zero payment.
    let records = payment_record::Entity::find()
        .filter(payment_record::Column::PurchaseOrderId.eq(seeded.order.id))
        .all(&*db)
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    let total: Decimal = records.iter().map(|r| r.amount).sum();
    assert_eq!(total, dec!(1000));
}

#[tokio::test]
async fn over_receipt_is_rejected_without_state_change() {
    let db = setup_db().await;
    let prod = seed_product(&db, "Bolt").await;
    let seeded = seed_order(
        &db,
        dec!(1000),
        vec![LineSpec::existing(100, dec!(10), prod.id)],
    )
    .await;
    let svc = receiving_service(db.clone());
    let line_id = seeded.lines[0].id;

    svc.receive_items(command(
        seeded.order.id,
        "tok-fill",
        vec![item(line_id, 100, dec!(10), None)],
        None,
    ))
    .await
    .expect("fill the line");

    let err = svc
        .receive_items(command(
            seeded.order.id,
            "tok-overflow",
            vec![item(line_id, 50, dec!(10), None)],
            None,
        ))
        .await
        .expect_err("over-receipt must fail");

    assert_matches!(err, ServiceError::Validation { ref line_errors, .. } if line_errors.len() == 1);

    let line = purchase_order_line::Entity::find_by_id(line_id)
        .one(&*db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line.quantity_received, 100);

    let batches = stock_batch::Entity::find()
        .filter(stock_batch::Column::PurchaseOrderLineId.eq(line_id))
        .all(&*db)
        .await
        .unwrap();
    assert_eq!(batches.len(), 1, "rejected receipt must not add batches");
}

#[tokio::test]
async fn duplicate_token_replays_original_result() {
    let db = setup_db().await;
    let seeded = seed_order(&db, dec!(1000), vec![LineSpec::pending(100, dec!(10))]).await;
    let svc = receiving_service(db.clone());
    let line_id = seeded.lines[0].id;

    let cmd = command(
        seeded.order.id,
        "tok-idempotent",
        vec![item(line_id, 100, dec!(10), Some(dec!(15)))],
        None,
    );
    let first = svc.receive_items(cmd.clone()).await.expect("first apply");
    let replay = svc.receive_items(cmd).await.expect("replay");

    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&replay).unwrap(),
        "replay must return the identical result"
    );

    let batches = stock_batch::Entity::find()
        .filter(stock_batch::Column::PurchaseOrderLineId.eq(line_id))
        .all(&*db)
        .await
        .unwrap();
    assert_eq!(batches.len(), 1, "replay must not double-apply stock");

    let products = product::Entity::find().all(&*db).await.unwrap();
    assert_eq!(products.len(), 1, "replay must not create a second product");
}

#[tokio::test]
async fn one_invalid_line_rejects_the_whole_request() {
    let db = setup_db().await;
    let prod = seed_product(&db, "Nut").await;
    let seeded = seed_order(
        &db,
        dec!(1000),
        vec![
            LineSpec::existing(100, dec!(10), prod.id),
            LineSpec::existing(50, dec!(5), prod.id),
        ],
    )
    .await;
    let svc = receiving_service(db.clone());

    let err = svc
        .receive_items(command(
            seeded.order.id,
            "tok-mixed",
            vec![
                item(seeded.lines[0].id, 10, dec!(10), None),
                item(seeded.lines[1].id, 999, dec!(5), None),
            ],
            Some(payment(dec!(100))),
        ))
        .await
        .expect_err("mixed request must fail as a whole");
    assert_matches!(err, ServiceError::Validation { .. });

    // Neither the valid line, the stock, nor the payment was applied.
    for line in &seeded.lines {
        let stored = purchase_order_line::Entity::find_by_id(line.id)
            .one(&*db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.quantity_received, 0);
    }
    assert!(stock_batch::Entity::find().all(&*db).await.unwrap().is_empty());
    assert!(payment_record::Entity::find()
        .all(&*db)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn overpayment_is_rejected() {
    let db = setup_db().await;
    let prod = seed_product(&db, "Washer").await;
    let seeded = seed_order(
        &db,
        dec!(1000),
        vec![LineSpec::existing(10, dec!(100), prod.id)],
    )
    .await;
    let svc = receiving_service(db.clone());

    let err = svc
        .receive_items(command(
            seeded.order.id,
            "tok-overpay",
            vec![],
            Some(payment(dec!(1200))),
        ))
        .await
        .expect_err("overpayment must fail");
    assert_matches!(
        err,
        ServiceError::Overpayment { attempted, grand_total }
            if attempted == dec!(1200) && grand_total == dec!(1000)
    );
    assert!(payment_record::Entity::find()
        .all(&*db)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn zero_amount_payment_is_a_noop() {
    let db = setup_db().await;
    let prod = seed_product(&db, "Screw").await;
    let seeded = seed_order(
        &db,
        dec!(500),
        vec![LineSpec::existing(50, dec!(10), prod.id)],
    )
    .await;
    let svc = receiving_service(db.clone());

    let result = svc
        .receive_items(command(
            seeded.order.id,
            "tok-zero-pay",
            vec![item(seeded.lines[0].id, 20, dec!(10), None)],
            Some(payment(dec!(0))),
        ))
        .await
        .expect("zero payment is valid");

    assert_eq!(result.order.payment_status, PaymentStatus::Pending);
    assert!(payment_record::Entity::find()
        .all(&*db)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn missing_selling_price_falls_back_to_configured_markup() {
    let db = setup_db().await;
    let prod = seed_product(&db, "Hinge").await;
    let seeded = seed_order(
        &db,
        dec!(1000),
        vec![LineSpec::existing(100, dec!(10), prod.id)],
    )
    .await;
    let svc = receiving_service(db.clone());
    let line_id = seeded.lines[0].id;

    svc.receive_items(command(
        seeded.order.id,
        "tok-markup",
        vec![item(line_id, 10, dec!(10), None)],
        None,
    ))
    .await
    .expect("receipt");

    let line = purchase_order_line::Entity::find_by_id(line_id)
        .one(&*db)
        .await
        .unwrap()
        .unwrap();
    // Default policy: 30% over the purchase price.
    assert_eq!(line.selling_price, Some(dec!(13.00)));
}

#[tokio::test]
async fn received_order_still_accepts_balance_payment() {
    let db = setup_db().await;
    let prod = seed_product(&db, "Gasket").await;
    let seeded = seed_order(
        &db,
        dec!(200),
        vec![LineSpec::existing(20, dec!(10), prod.id)],
    )
    .await;
    let svc = receiving_service(db.clone());

    svc.receive_items(command(
        seeded.order.id,
        "tok-goods",
        vec![item(seeded.lines[0].id, 20, dec!(10), None)],
        None,
    ))
    .await
    .expect("full receipt");

    let paid = svc
        .receive_items(command(
            seeded.order.id,
            "tok-balance",
            vec![],
            Some(payment(dec!(200))),
        ))
        .await
        .expect("balance payment after full receipt");
    assert_eq!(paid.order.status, OrderStatus::Received);
    assert_eq!(paid.order.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.order.amount_due, dec!(0));
}

#[tokio::test]
async fn received_and_paid_never_decrease() {
    let db = setup_db().await;
    let prod = seed_product(&db, "Clamp").await;
    let seeded = seed_order(
        &db,
        dec!(600),
        vec![LineSpec::existing(60, dec!(10), prod.id)],
    )
    .await;
    let svc = receiving_service(db.clone());
    let line_id = seeded.lines[0].id;

    let mut last_received = 0;
    let mut last_paid = Decimal::ZERO;
    for (i, (delta, amount)) in [(20, dec!(100)), (0, dec!(200)), (40, dec!(300))]
        .into_iter()
        .enumerate()
    {
        let result = svc
            .receive_items(command(
                seeded.order.id,
                &format!("tok-mono-{}", i),
                vec![item(line_id, delta, dec!(10), None)],
                Some(payment(amount)),
            ))
            .await
            .expect("apply");
        let received = purchase_order_line::Entity::find_by_id(line_id)
            .one(&*db)
            .await
            .unwrap()
            .unwrap()
            .quantity_received;
        assert!(received >= last_received);
        assert!(result.order.amount_paid >= last_paid);
        assert_eq!(
            result.order.amount_paid + result.order.amount_due,
            dec!(600)
        );
        last_received = received;
        last_paid = result.order.amount_paid;
    }
    assert_eq!(last_received, 60);
    assert_eq!(last_paid, dec!(600));
}
