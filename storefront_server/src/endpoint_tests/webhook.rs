//! Webhook intake tests: signature verification fails closed, verified deliveries drive the order, duplicates are
//! acknowledged without re-processing.
use actix_web::test;
use storefront_common::Cents;
use storefront_engine::{
    db_types::{FulfillmentStatus, LineItem, Order, PaymentMethod, PaymentStatus},
    order_objects::CheckoutRequest,
    OrderFlowApi,
    SqliteDatabase,
};

use super::helpers::{build_app, new_test_db, seed_address, seed_product, test_config, BUYER, WEBHOOK_SECRET};
use super::mocks::MockProvider;
use crate::{helpers::calculate_hmac, middleware::PAYMENT_SIGNATURE_HEADER};

async fn awaiting_payment_order(db: &SqliteDatabase) -> Order {
    let product = seed_product(db, 100, 5).await;
    let address_id = seed_address(db, BUYER).await;
    let api = OrderFlowApi::new(db.clone());
    api.checkout(CheckoutRequest {
        buyer_id: BUYER.to_string(),
        address_id,
        items: vec![LineItem { product_id: product.id.clone(), quantity: 1, selected_variant: None }],
        payment_method: PaymentMethod::OnlinePayment,
        client_estimated_amount: None,
    })
    .await
    .expect("Error creating order")
    .order
}

fn success_payload(order: &Order, intent_id: &str) -> String {
    serde_json::json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": { "object": {
            "id": intent_id,
            "metadata": { "order_id": order.id.as_str(), "buyer_id": order.buyer_id },
        }},
    })
    .to_string()
}

#[actix_web::test]
async fn webhook_without_signature_is_rejected_unprocessed() {
    let db = new_test_db().await;
    let order = awaiting_payment_order(&db).await;
    let app = test::init_service(build_app(db.clone(), MockProvider::default(), test_config())).await;

    let req = test::TestRequest::post()
        .uri("/webhook/payment")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(success_payload(&order, "pi_1"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 400);

    // fail closed: the unverified payload must never reach the reconciler
    let api = OrderFlowApi::new(db);
    let current = api.order_for_buyer(&order.id, BUYER).await.unwrap();
    assert_eq!(current.fulfillment_status, FulfillmentStatus::AwaitingPayment);
    assert_eq!(current.payment_status, PaymentStatus::Pending);
}

#[actix_web::test]
async fn webhook_with_wrong_signature_is_rejected_unprocessed() {
    let db = new_test_db().await;
    let order = awaiting_payment_order(&db).await;
    let app = test::init_service(build_app(db.clone(), MockProvider::default(), test_config())).await;

    let payload = success_payload(&order, "pi_1");
    let forged = calculate_hmac("not-the-real-secret", payload.as_bytes());
    let req = test::TestRequest::post()
        .uri("/webhook/payment")
        .insert_header(("Content-Type", "application/json"))
        .insert_header((PAYMENT_SIGNATURE_HEADER, forged))
        .set_payload(payload)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 400);

    let api = OrderFlowApi::new(db);
    let current = api.order_for_buyer(&order.id, BUYER).await.unwrap();
    assert_eq!(current.fulfillment_status, FulfillmentStatus::AwaitingPayment);
}

#[actix_web::test]
async fn signed_webhook_settles_the_order_and_duplicates_are_acknowledged() {
    let db = new_test_db().await;
    let order = awaiting_payment_order(&db).await;
    assert_eq!(order.amount, Cents::from(102));
    let app = test::init_service(build_app(db.clone(), MockProvider::default(), test_config())).await;

    let payload = success_payload(&order, "pi_100");
    let signature = calculate_hmac(WEBHOOK_SECRET, payload.as_bytes());
    let req = test::TestRequest::post()
        .uri("/webhook/payment")
        .insert_header(("Content-Type", "application/json"))
        .insert_header((PAYMENT_SIGNATURE_HEADER, signature.clone()))
        .set_payload(payload.clone())
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 200);

    let api = OrderFlowApi::new(db.clone());
    let current = api.order_for_buyer(&order.id, BUYER).await.unwrap();
    assert_eq!(current.fulfillment_status, FulfillmentStatus::Placed);
    assert_eq!(current.payment_status, PaymentStatus::Paid);
    assert_eq!(current.payment_ref.as_deref(), Some("pi_100"));

    // identical redelivery: 200, same state, no further transition
    let req = test::TestRequest::post()
        .uri("/webhook/payment")
        .insert_header(("Content-Type", "application/json"))
        .insert_header((PAYMENT_SIGNATURE_HEADER, signature))
        .set_payload(payload)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 200);
    let after = api.order_for_buyer(&order.id, BUYER).await.unwrap();
    assert_eq!(after, current);
}

#[actix_web::test]
async fn webhook_for_unknown_event_types_is_acknowledged_and_ignored() {
    let db = new_test_db().await;
    let order = awaiting_payment_order(&db).await;
    let app = test::init_service(build_app(db.clone(), MockProvider::default(), test_config())).await;

    let payload = serde_json::json!({
        "id": "evt_2",
        "type": "payment_intent.created",
        "data": { "object": { "id": "pi_1", "metadata": { "order_id": order.id.as_str() } } },
    })
    .to_string();
    let signature = calculate_hmac(WEBHOOK_SECRET, payload.as_bytes());
    let req = test::TestRequest::post()
        .uri("/webhook/payment")
        .insert_header(("Content-Type", "application/json"))
        .insert_header((PAYMENT_SIGNATURE_HEADER, signature))
        .set_payload(payload)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 200);
    let api = OrderFlowApi::new(db);
    let current = api.order_for_buyer(&order.id, BUYER).await.unwrap();
    assert_eq!(current.fulfillment_status, FulfillmentStatus::AwaitingPayment);
}
