//! End-to-end order lifecycle tests against a throwaway SQLite database.
use log::*;
use storefront_common::Cents;
use storefront_engine::{
    db_types::{FulfillmentStatus, LineItem, PaymentMethod, PaymentStatus},
    lifecycle::{plan_transition, OrderEvent, Transition, TransitionError},
    order_objects::{CheckoutRequest, NextAction, PaymentOutcome, PaymentSignal, ReconcileOutcome, SignalSource},
    traits::IntentStatus,
    OrderFlowApi,
    OrderFlowError,
    SqliteDatabase,
    StorefrontDatabase,
};
use tokio::runtime::Runtime;

mod support;

use support::{new_test_db, seed_address, seed_product, tear_down, FakeProvider};

const BUYER: &str = "buyer-1";

fn checkout_request(address_id: String, items: Vec<LineItem>, method: PaymentMethod) -> CheckoutRequest {
    CheckoutRequest {
        buyer_id: BUYER.to_string(),
        address_id,
        items,
        payment_method: method,
        client_estimated_amount: None,
    }
}

fn succeeded(order_id: &storefront_engine::db_types::OrderId, payment_ref: &str) -> PaymentSignal {
    PaymentSignal {
        order_id: order_id.clone(),
        payment_ref: payment_ref.to_string(),
        outcome: PaymentOutcome::Succeeded,
        source: SignalSource::Webhook,
    }
}

#[test]
fn online_order_settles_through_webhook_and_dedupes_redelivery() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let db = new_test_db().await;
        let api = OrderFlowApi::new(db.clone());
        let product = seed_product(&db, 100, 10).await;
        let address_id = seed_address(&db, BUYER).await;

        let mut req = checkout_request(
            address_id,
            vec![LineItem { product_id: product.id.clone(), quantity: 1, selected_variant: None }],
            PaymentMethod::OnlinePayment,
        );
        // 100 + 2% tax = 102; a client estimate one unit off is accepted
        req.client_estimated_amount = Some(Cents::from(103));
        let receipt = api.checkout(req).await.expect("Error creating order");
        assert_eq!(receipt.order.amount, Cents::from(102));
        assert_eq!(receipt.order.fulfillment_status, FulfillmentStatus::AwaitingPayment);
        assert_eq!(receipt.order.payment_status, PaymentStatus::Pending);
        assert_eq!(receipt.next_action, NextAction::PayOnline);
        // nothing enqueued until the payment settles
        assert!(db.claim_due_events(10).await.unwrap().is_empty());

        let oid = receipt.order.id.clone();
        let outcome = api.process_payment_signal(succeeded(&oid, "pi_100")).await.expect("Error applying webhook");
        let ReconcileOutcome::Applied(order) = outcome else {
            panic!("first delivery should apply");
        };
        assert_eq!(order.fulfillment_status, FulfillmentStatus::Placed);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.payment_ref.as_deref(), Some("pi_100"));
        let pending = db.claim_due_events(10).await.unwrap();
        assert_eq!(pending.len(), 1, "exactly one payment-completed event enqueued");

        // identical redelivery: same final state, no new side effects
        let outcome = api.process_payment_signal(succeeded(&oid, "pi_100")).await.expect("Error on redelivery");
        let ReconcileOutcome::AlreadyProcessed(recorded) = outcome else {
            panic!("redelivery should replay the recorded result");
        };
        assert_eq!(recorded.fulfillment_status, FulfillmentStatus::Placed);
        assert_eq!(recorded.payment_status, PaymentStatus::Paid);
        assert_eq!(db.claim_due_events(10).await.unwrap().len(), 1, "no additional events enqueued");
        tear_down(db).await;
    });
    info!("🧪️ test complete");
}

#[test]
fn client_estimate_beyond_tolerance_is_rejected() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let db = new_test_db().await;
        let api = OrderFlowApi::new(db.clone());
        let product = seed_product(&db, 100, 10).await;
        let address_id = seed_address(&db, BUYER).await;
        let mut req = checkout_request(
            address_id,
            vec![LineItem { product_id: product.id.clone(), quantity: 1, selected_variant: None }],
            PaymentMethod::OnlinePayment,
        );
        req.client_estimated_amount = Some(Cents::from(105));
        let err = api.checkout(req).await.unwrap_err();
        assert!(matches!(err, OrderFlowError::AmountMismatch { expected, supplied }
            if expected == Cents::from(102) && supplied == Cents::from(105)));
        tear_down(db).await;
    });
}

#[test]
fn cash_order_delivery_collects_payment() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let db = new_test_db().await;
        let api = OrderFlowApi::new(db.clone());
        let product = seed_product(&db, 2_500, 3).await;
        let address_id = seed_address(&db, BUYER).await;
        let receipt = api
            .checkout(checkout_request(
                address_id,
                vec![LineItem { product_id: product.id.clone(), quantity: 1, selected_variant: None }],
                PaymentMethod::CashOnDelivery,
            ))
            .await
            .expect("Error creating order");
        assert_eq!(receipt.order.fulfillment_status, FulfillmentStatus::Placed);
        assert_eq!(receipt.next_action, NextAction::None);

        let order = api
            .set_fulfillment_status(&receipt.order.id, FulfillmentStatus::Delivered, "seller-1")
            .await
            .expect("Error delivering order");
        assert_eq!(order.fulfillment_status, FulfillmentStatus::Delivered);
        assert_eq!(order.payment_status, PaymentStatus::Paid, "delivery collects a cash payment atomically");
        tear_down(db).await;
    });
}

#[test]
fn conflicting_payment_reference_leaves_order_untouched() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let db = new_test_db().await;
        let api = OrderFlowApi::new(db.clone());
        let product = seed_product(&db, 100, 10).await;
        let address_id = seed_address(&db, BUYER).await;
        let receipt = api
            .checkout(checkout_request(
                address_id,
                vec![LineItem { product_id: product.id.clone(), quantity: 1, selected_variant: None }],
                PaymentMethod::OnlinePayment,
            ))
            .await
            .unwrap();
        let oid = receipt.order.id.clone();
        api.process_payment_signal(succeeded(&oid, "pi_first")).await.expect("Error applying webhook");

        let err = api.process_payment_signal(succeeded(&oid, "pi_other")).await.unwrap_err();
        assert!(matches!(err, OrderFlowError::Transition(TransitionError::PaymentRefMismatch { .. })));
        let order = api.order_for_buyer(&oid, BUYER).await.unwrap();
        assert_eq!(order.payment_ref.as_deref(), Some("pi_first"));
        assert_eq!(order.fulfillment_status, FulfillmentStatus::Placed);
        tear_down(db).await;
    });
}

#[test]
fn payment_failure_after_delivery_is_rejected() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let db = new_test_db().await;
        let api = OrderFlowApi::new(db.clone());
        let product = seed_product(&db, 100, 10).await;
        let address_id = seed_address(&db, BUYER).await;
        let receipt = api
            .checkout(checkout_request(
                address_id,
                vec![LineItem { product_id: product.id.clone(), quantity: 1, selected_variant: None }],
                PaymentMethod::CashOnDelivery,
            ))
            .await
            .unwrap();
        let oid = receipt.order.id.clone();
        api.set_fulfillment_status(&oid, FulfillmentStatus::Delivered, "seller-1").await.unwrap();

        let signal = PaymentSignal {
            order_id: oid.clone(),
            payment_ref: "pi_late".to_string(),
            outcome: PaymentOutcome::Failed { reason: "card declined".to_string() },
            source: SignalSource::Webhook,
        };
        let err = api.process_payment_signal(signal).await.unwrap_err();
        assert!(matches!(
            err,
            OrderFlowError::Transition(TransitionError::Illegal { from: FulfillmentStatus::Delivered, .. })
        ));
        let order = api.order_for_buyer(&oid, BUYER).await.unwrap();
        assert_eq!(order.fulfillment_status, FulfillmentStatus::Delivered);
        tear_down(db).await;
    });
}

#[test]
fn conditional_update_lets_exactly_one_racing_transition_win() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let db = new_test_db().await;
        let api = OrderFlowApi::new(db.clone());
        let product = seed_product(&db, 100, 10).await;
        let address_id = seed_address(&db, BUYER).await;
        let receipt = api
            .checkout(checkout_request(
                address_id,
                vec![LineItem { product_id: product.id.clone(), quantity: 1, selected_variant: None }],
                PaymentMethod::CashOnDelivery,
            ))
            .await
            .unwrap();
        let order = receipt.order;

        // Two transitions planned against the same snapshot: only the first conditional update may land.
        let to_processing = plan_transition(&order, &OrderEvent::SellerSetStatus {
            status: FulfillmentStatus::Processing,
        })
        .unwrap();
        let to_cancelled = plan_transition(&order, &OrderEvent::BuyerCancelled).unwrap();
        let (Transition::Apply(plan_a), Transition::Apply(plan_b)) = (to_processing, to_cancelled) else {
            panic!("both plans should apply from Placed");
        };

        let winner = db.apply_transition(&order.id, &plan_a).await.unwrap();
        assert!(winner.is_some());
        let loser = db.apply_transition(&order.id, &plan_b).await.unwrap();
        assert!(loser.is_none(), "the stale plan must not land");

        let current = api.order_for_buyer(&order.id, BUYER).await.unwrap();
        assert_eq!(current.fulfillment_status, FulfillmentStatus::Processing);
        tear_down(db).await;
    });
}

#[test]
fn only_a_seller_of_a_line_item_may_update_fulfillment() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let db = new_test_db().await;
        let api = OrderFlowApi::new(db.clone());
        let product = seed_product(&db, 100, 10).await;
        let address_id = seed_address(&db, BUYER).await;
        let receipt = api
            .checkout(checkout_request(
                address_id,
                vec![LineItem { product_id: product.id.clone(), quantity: 1, selected_variant: None }],
                PaymentMethod::CashOnDelivery,
            ))
            .await
            .unwrap();
        let err = api
            .set_fulfillment_status(&receipt.order.id, FulfillmentStatus::Processing, "someone-else")
            .await
            .unwrap_err();
        assert!(matches!(err, OrderFlowError::Forbidden(_)));
        let order = api.order_for_buyer(&receipt.order.id, BUYER).await.unwrap();
        assert_eq!(order.fulfillment_status, FulfillmentStatus::Placed);
        tear_down(db).await;
    });
}

#[test]
fn orders_are_scoped_to_their_buyer() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let db = new_test_db().await;
        let api = OrderFlowApi::new(db.clone());
        let product = seed_product(&db, 100, 10).await;
        let address_id = seed_address(&db, BUYER).await;
        let receipt = api
            .checkout(checkout_request(
                address_id,
                vec![LineItem { product_id: product.id.clone(), quantity: 1, selected_variant: None }],
                PaymentMethod::CashOnDelivery,
            ))
            .await
            .unwrap();
        let err = api.order_for_buyer(&receipt.order.id, "buyer-2").await.unwrap_err();
        assert!(matches!(err, OrderFlowError::Forbidden(_)));
        let missing = storefront_engine::db_types::OrderId::from("ord-missing".to_string());
        let err = api.order_for_buyer(&missing, BUYER).await.unwrap_err();
        assert!(matches!(err, OrderFlowError::OrderNotFound(_)));
        tear_down(db).await;
    });
}

#[test]
fn failed_payment_can_be_retried_and_then_settled() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let db = new_test_db().await;
        let api = OrderFlowApi::new(db.clone());
        let provider = FakeProvider::default();
        let product = seed_product(&db, 100, 10).await;
        let address_id = seed_address(&db, BUYER).await;
        let receipt = api
            .checkout(checkout_request(
                address_id,
                vec![LineItem { product_id: product.id.clone(), quantity: 1, selected_variant: None }],
                PaymentMethod::OnlinePayment,
            ))
            .await
            .unwrap();
        let oid = receipt.order.id.clone();

        let failed = PaymentSignal {
            order_id: oid.clone(),
            payment_ref: "pi_v1".to_string(),
            outcome: PaymentOutcome::Failed { reason: "insufficient funds".to_string() },
            source: SignalSource::Webhook,
        };
        api.process_payment_signal(failed).await.expect("Error applying failure webhook");
        let order = api.order_for_buyer(&oid, BUYER).await.unwrap();
        assert_eq!(order.fulfillment_status, FulfillmentStatus::PaymentFailed);
        assert_eq!(order.payment_status, PaymentStatus::Failed);

        // Retrying creates a fresh intent and puts the order back in front of the provider
        let intent = api.create_payment_intent(&oid, BUYER, &provider).await.expect("Error creating retry intent");
        let order = api.order_for_buyer(&oid, BUYER).await.unwrap();
        assert_eq!(order.fulfillment_status, FulfillmentStatus::AwaitingPayment);
        assert_eq!(order.payment_status, PaymentStatus::Pending);

        api.process_payment_signal(succeeded(&oid, &intent.intent_id)).await.expect("Error applying webhook");
        let order = api.order_for_buyer(&oid, BUYER).await.unwrap();
        assert_eq!(order.fulfillment_status, FulfillmentStatus::Placed);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        tear_down(db).await;
    });
}

#[test]
fn client_hint_is_verified_against_the_provider() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let db = new_test_db().await;
        let api = OrderFlowApi::new(db.clone());
        let provider = FakeProvider::default();
        let product = seed_product(&db, 100, 10).await;
        let address_id = seed_address(&db, BUYER).await;
        let receipt = api
            .checkout(checkout_request(
                address_id,
                vec![LineItem { product_id: product.id.clone(), quantity: 1, selected_variant: None }],
                PaymentMethod::OnlinePayment,
            ))
            .await
            .unwrap();
        let oid = receipt.order.id.clone();
        let intent = api.create_payment_intent(&oid, BUYER, &provider).await.unwrap();

        // The browser claims success, but the provider still reports pending: the order must not move.
        let outcome = api.verify_client_result(BUYER, &oid, &intent.intent_id, &provider).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Unresolved(_)));
        let order = api.order_for_buyer(&oid, BUYER).await.unwrap();
        assert_eq!(order.fulfillment_status, FulfillmentStatus::AwaitingPayment);

        // Once the provider agrees, the verified outcome drives the transition.
        provider.set_intent(&oid, &intent.intent_id, IntentStatus::Succeeded);
        let outcome = api.verify_client_result(BUYER, &oid, &intent.intent_id, &provider).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Applied(_)));
        let order = api.order_for_buyer(&oid, BUYER).await.unwrap();
        assert_eq!(order.fulfillment_status, FulfillmentStatus::Placed);
        tear_down(db).await;
    });
}

#[test]
fn sweep_resolves_orders_the_webhook_never_reached() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let db = new_test_db().await;
        let api = OrderFlowApi::new(db.clone());
        let provider = FakeProvider::default();
        let product = seed_product(&db, 100, 10).await;
        let address_id = seed_address(&db, BUYER).await;
        let receipt = api
            .checkout(checkout_request(
                address_id,
                vec![LineItem { product_id: product.id.clone(), quantity: 1, selected_variant: None }],
                PaymentMethod::OnlinePayment,
            ))
            .await
            .unwrap();
        let oid = receipt.order.id.clone();
        provider.set_intent(&oid, "pi_lost_webhook", IntentStatus::Succeeded);

        let result = api.sweep_stuck_orders(chrono::Duration::seconds(-1), &provider).await.unwrap();
        assert_eq!(result.settled.len(), 1);
        assert_eq!(result.resolved_count(), 1);
        let order = api.order_for_buyer(&oid, BUYER).await.unwrap();
        assert_eq!(order.fulfillment_status, FulfillmentStatus::Placed);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.payment_ref.as_deref(), Some("pi_lost_webhook"));
        tear_down(db).await;
    });
}
