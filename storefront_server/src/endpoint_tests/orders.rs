//! Order endpoint tests: identity is mandatory, amounts are validated, reads are buyer-scoped, and the client
//! payment hint never moves an order the provider has not settled.
use actix_web::test;
use storefront_engine::{
    db_types::{FulfillmentStatus, LineItem, PaymentMethod},
    order_objects::CheckoutRequest,
    traits::IntentStatus,
    OrderFlowApi,
};

use super::helpers::{build_app, new_test_db, seed_address, seed_product, test_config, BUYER};
use super::mocks::MockProvider;
use crate::data_objects::{CreateIntentResponse, CreateOrderResponse};

#[actix_web::test]
async fn checkout_requires_a_verified_identity() {
    let db = new_test_db().await;
    let app = test::init_service(build_app(db, MockProvider::default(), test_config())).await;
    let req = test::TestRequest::post()
        .uri("/api/orders")
        .set_json(serde_json::json!({
            "address_id": "adr-1",
            "items": [{"product_id": "prd-1", "quantity": 1}],
            "payment_method": "CashOnDelivery",
        }))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 401);
}

#[actix_web::test]
async fn checkout_rejects_amounts_beyond_tolerance() {
    let db = new_test_db().await;
    let product = seed_product(&db, 100, 5).await;
    let address_id = seed_address(&db, BUYER).await;
    let app = test::init_service(build_app(db, MockProvider::default(), test_config())).await;

    // server computes 102; a client estimate of 105 is three units out
    let req = test::TestRequest::post()
        .uri("/api/orders")
        .insert_header(("x-verified-user-id", BUYER))
        .set_json(serde_json::json!({
            "address_id": address_id,
            "items": [{"product_id": product.id.as_str(), "quantity": 1}],
            "payment_method": "OnlinePayment",
            "client_estimated_amount": 105,
        }))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 400);
}

#[actix_web::test]
async fn checkout_accepts_an_estimate_within_tolerance() {
    let db = new_test_db().await;
    let product = seed_product(&db, 100, 5).await;
    let address_id = seed_address(&db, BUYER).await;
    let app = test::init_service(build_app(db, MockProvider::default(), test_config())).await;

    let req = test::TestRequest::post()
        .uri("/api/orders")
        .insert_header(("x-verified-user-id", BUYER))
        .set_json(serde_json::json!({
            "address_id": address_id,
            "items": [{"product_id": product.id.as_str(), "quantity": 1}],
            "payment_method": "OnlinePayment",
            "client_estimated_amount": 103,
        }))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 200);
    let body: CreateOrderResponse = test::read_body_json(res).await;
    assert_eq!(body.amount.value(), 102);
}

#[actix_web::test]
async fn order_reads_are_scoped_to_the_buyer() {
    let db = new_test_db().await;
    let product = seed_product(&db, 100, 5).await;
    let address_id = seed_address(&db, BUYER).await;
    let api = OrderFlowApi::new(db.clone());
    let receipt = api
        .checkout(CheckoutRequest {
            buyer_id: BUYER.to_string(),
            address_id,
            items: vec![LineItem { product_id: product.id.clone(), quantity: 1, selected_variant: None }],
            payment_method: PaymentMethod::CashOnDelivery,
            client_estimated_amount: None,
        })
        .await
        .unwrap();
    let app = test::init_service(build_app(db, MockProvider::default(), test_config())).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/orders/{}", receipt.order.id.as_str()))
        .insert_header(("x-verified-user-id", "buyer-2"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 403);

    let req = test::TestRequest::get()
        .uri(&format!("/api/orders/{}", receipt.order.id.as_str()))
        .insert_header(("x-verified-user-id", BUYER))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 200);
}

#[actix_web::test]
async fn client_payment_hint_does_not_move_an_unsettled_order() {
    let db = new_test_db().await;
    let provider = MockProvider::default();
    let product = seed_product(&db, 100, 5).await;
    let address_id = seed_address(&db, BUYER).await;
    let app = test::init_service(build_app(db.clone(), provider.clone(), test_config())).await;

    let req = test::TestRequest::post()
        .uri("/api/orders")
        .insert_header(("x-verified-user-id", BUYER))
        .set_json(serde_json::json!({
            "address_id": address_id,
            "items": [{"product_id": product.id.as_str(), "quantity": 1}],
            "payment_method": "OnlinePayment",
        }))
        .to_request();
    let created: CreateOrderResponse = test::read_body_json(test::call_service(&app, req).await).await;

    let req = test::TestRequest::post()
        .uri("/api/payments/intent")
        .insert_header(("x-verified-user-id", BUYER))
        .set_json(serde_json::json!({ "order_id": created.order_id.as_str() }))
        .to_request();
    let intent: CreateIntentResponse = test::read_body_json(test::call_service(&app, req).await).await;

    // the browser claims success, but the provider still says pending
    let req = test::TestRequest::post()
        .uri(&format!("/api/orders/{}/payment-result", created.order_id.as_str()))
        .insert_header(("x-verified-user-id", BUYER))
        .set_json(serde_json::json!({ "intent_id": intent.intent_id }))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 200);
    let api = OrderFlowApi::new(db.clone());
    let order = api.order_for_buyer(&created.order_id, BUYER).await.unwrap();
    assert_eq!(order.fulfillment_status, FulfillmentStatus::AwaitingPayment);

    // once the provider agrees, the verified hint settles the order
    provider.set_intent(&created.order_id, &intent.intent_id, IntentStatus::Succeeded);
    let req = test::TestRequest::post()
        .uri(&format!("/api/orders/{}/payment-result", created.order_id.as_str()))
        .insert_header(("x-verified-user-id", BUYER))
        .set_json(serde_json::json!({ "intent_id": intent.intent_id }))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 200);
    let order = api.order_for_buyer(&created.order_id, BUYER).await.unwrap();
    assert_eq!(order.fulfillment_status, FulfillmentStatus::Placed);
}
