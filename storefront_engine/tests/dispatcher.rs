//! Outbox dispatcher tests: side effects are applied in batches and exactly once, even under redelivery.
use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use futures_util::FutureExt;
use storefront_engine::{
    db_types::{CartItem, LineItem, PaymentMethod},
    events::{DispatcherConfig, DomainEvent, EventDispatcher, EventHandlers, EventHooks, EventProducers},
    order_objects::CheckoutRequest,
    AccountApi,
    OrderFlowApi,
    SqliteDatabase,
    StorefrontDatabase,
};
use tokio::runtime::Runtime;

mod support;

use support::{new_test_db, seed_address, seed_product, tear_down};

const BUYER: &str = "buyer-1";

fn test_config() -> DispatcherConfig {
    DispatcherConfig {
        batch_size: 10,
        poll_interval: std::time::Duration::from_millis(50),
        max_attempts: 3,
        retry_backoff: chrono::Duration::seconds(1),
    }
}

async fn place_cash_order(db: &SqliteDatabase, quantity: u32) -> storefront_engine::db_types::Order {
    let api = OrderFlowApi::new(db.clone());
    let product = seed_product(db, 1_000, 10).await;
    let address_id = seed_address(db, BUYER).await;
    // the buyer has the product in their cart when they check out
    let accounts = AccountApi::new(db.clone());
    accounts
        .update_cart(BUYER, vec![CartItem { product_id: product.id.clone(), quantity, selected_variant: None }])
        .await
        .expect("Error saving cart");
    let receipt = api
        .checkout(CheckoutRequest {
            buyer_id: BUYER.to_string(),
            address_id,
            items: vec![LineItem { product_id: product.id.clone(), quantity, selected_variant: None }],
            payment_method: PaymentMethod::CashOnDelivery,
            client_estimated_amount: None,
        })
        .await
        .expect("Error creating order");
    receipt.order
}

#[test]
fn placing_an_order_decrements_stock_and_clears_the_cart_once() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let db = new_test_db().await;
        let order = place_cash_order(&db, 2).await;
        let product_id = order.line_items[0].product_id.clone();

        let dispatcher = EventDispatcher::new(db.clone(), EventProducers::default(), test_config());
        let processed = dispatcher.run_once().await.expect("Error draining outbox");
        assert_eq!(processed, 1);

        let product = db.fetch_product(&product_id).await.unwrap().unwrap();
        assert_eq!(product.stock, 8, "stock decremented by the ordered quantity");
        let cart = db.fetch_cart(BUYER).await.unwrap();
        assert!(cart.is_empty(), "cart cleared by the placement");
        assert!(db.claim_due_events(10).await.unwrap().is_empty(), "outbox drained");

        // Redelivery of the same placement event must not re-apply either side effect.
        let duplicate = DomainEvent::OrderPlaced {
            order_id: order.id.clone(),
            buyer_id: order.buyer_id.clone(),
            line_items: order.line_items.clone(),
            amount: order.amount,
            payment_method: order.payment_method,
        };
        db.enqueue_events(&[duplicate]).await.unwrap();
        let accounts = AccountApi::new(db.clone());
        accounts
            .update_cart(BUYER, vec![CartItem { product_id: product_id.clone(), quantity: 1, selected_variant: None }])
            .await
            .unwrap();

        let processed = dispatcher.run_once().await.expect("Error draining outbox");
        assert_eq!(processed, 1);
        let product = db.fetch_product(&product_id).await.unwrap().unwrap();
        assert_eq!(product.stock, 8, "no double decrement on redelivery");
        let cart = db.fetch_cart(BUYER).await.unwrap();
        assert_eq!(cart.len(), 1, "a cart refilled after the first clear is not cleared again");
        tear_down(db).await;
    });
}

#[test]
fn cancelling_a_placed_order_restocks_once() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let db = new_test_db().await;
        let order = place_cash_order(&db, 3).await;
        let product_id = order.line_items[0].product_id.clone();
        let dispatcher = EventDispatcher::new(db.clone(), EventProducers::default(), test_config());
        dispatcher.run_once().await.unwrap();
        assert_eq!(db.fetch_product(&product_id).await.unwrap().unwrap().stock, 7);

        let api = OrderFlowApi::new(db.clone());
        api.cancel_order(&order.id, BUYER).await.expect("Error cancelling order");
        dispatcher.run_once().await.unwrap();
        assert_eq!(db.fetch_product(&product_id).await.unwrap().unwrap().stock, 10, "cancellation restocks");

        // replaying the cancellation event must not restock again
        let duplicate = DomainEvent::OrderCancelled {
            order_id: order.id.clone(),
            buyer_id: order.buyer_id.clone(),
            line_items: order.line_items.clone(),
            was_placed: true,
        };
        db.enqueue_events(&[duplicate]).await.unwrap();
        dispatcher.run_once().await.unwrap();
        assert_eq!(db.fetch_product(&product_id).await.unwrap().unwrap().stock, 10);
        tear_down(db).await;
    });
}

#[test]
fn notification_hooks_fire_for_placed_orders() {
    let rt = Runtime::new().unwrap();
    let calls = Arc::new(AtomicI32::new(0));
    let calls_copy = calls.clone();
    rt.block_on(async move {
        let db = new_test_db().await;
        let _order = place_cash_order(&db, 1).await;

        let mut hooks = EventHooks::default();
        hooks.on_order_placed(move |event| {
            let calls = calls_copy.clone();
            async move {
                assert!(matches!(event, DomainEvent::OrderPlaced { .. }));
                calls.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        });
        let handlers = EventHandlers::new(8, hooks);
        let producers = handlers.producers();

        let dispatcher = EventDispatcher::new(db.clone(), producers, test_config());
        dispatcher.run_once().await.expect("Error draining outbox");
        drop(dispatcher);

        // with all producers dropped, the handler drains and shuts down
        if let Some(handler) = handlers.on_order_placed {
            handler.start_handler().await;
        }
        tear_down(db).await;
    });
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
