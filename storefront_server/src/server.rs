use std::{future::Future, pin::Pin, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use storefront_engine::{
    events::{DispatcherConfig, DomainEvent, EventDispatcher, EventHandlers, EventHooks},
    AccountApi,
    CatalogApi,
    OrderFlowApi,
    SqliteDatabase,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    integrations::HostedCheckoutClient,
    middleware::{HmacMiddlewareFactory, PAYMENT_SIGNATURE_HEADER},
    routes::{
        add_address,
        add_product,
        cancel_order,
        catalog,
        create_order,
        create_payment_intent,
        health,
        my_addresses,
        my_cart,
        my_orders,
        order_by_id,
        payment_result,
        payment_webhook,
        product_by_id,
        set_order_status,
        update_cart,
    },
    sweep_worker::start_sweep_worker,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    sqlx::migrate!("../storefront_engine/src/sqlite/migrations")
        .run(db.pool())
        .await
        .map_err(|e| ServerError::InitializeError(format!("migrations failed: {e}")))?;
    let provider = HostedCheckoutClient::new(config.provider.clone())
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;

    // Notification hooks: the built-in consumers (stock, cart) run inside the dispatcher; these handlers are the
    // user-facing notification fan-out.
    let handlers = EventHandlers::new(64, notification_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let dispatcher_config = DispatcherConfig {
        batch_size: config.dispatcher_batch_size,
        poll_interval: Duration::from_secs(config.dispatcher_poll_secs),
        ..DispatcherConfig::default()
    };
    let _dispatcher = EventDispatcher::new(db.clone(), producers, dispatcher_config).start();
    let _sweeper = start_sweep_worker(
        db.clone(),
        provider.clone(),
        config.sweep_interval_secs,
        config.stuck_order_timeout,
    );

    let srv = create_server_instance(config, db, provider)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    provider: HostedCheckoutClient,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone());
        let accounts_api = AccountApi::new(db.clone());
        let catalog_api = CatalogApi::new(db.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("sfs::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(accounts_api))
            .app_data(web::Data::new(catalog_api))
            .app_data(web::Data::new(provider.clone()))
            .app_data(web::Data::new(config.clone()));
        // Buyer/seller surface: every route in here requires a verified identity
        let api_scope = web::scope("/api")
            .service(
                web::resource("/orders")
                    .route(web::post().to(create_order::<SqliteDatabase>))
                    .route(web::get().to(my_orders::<SqliteDatabase>)),
            )
            .service(web::resource("/orders/{id}").route(web::get().to(order_by_id::<SqliteDatabase>)))
            .service(web::resource("/orders/{id}/cancel").route(web::post().to(cancel_order::<SqliteDatabase>)))
            .service(web::resource("/orders/{id}/status").route(web::post().to(set_order_status::<SqliteDatabase>)))
            .service(
                web::resource("/orders/{id}/payment-result")
                    .route(web::post().to(payment_result::<SqliteDatabase, HostedCheckoutClient>)),
            )
            .service(
                web::resource("/payments/intent")
                    .route(web::post().to(create_payment_intent::<SqliteDatabase, HostedCheckoutClient>)),
            )
            .service(
                web::resource("/cart")
                    .route(web::get().to(my_cart::<SqliteDatabase>))
                    .route(web::put().to(update_cart::<SqliteDatabase>)),
            )
            .service(
                web::resource("/addresses")
                    .route(web::post().to(add_address::<SqliteDatabase>))
                    .route(web::get().to(my_addresses::<SqliteDatabase>)),
            )
            .service(web::resource("/products").route(web::post().to(add_product::<SqliteDatabase>)));
        // The signed webhook scope: signature verification fails closed before any handler runs
        let webhook_scope = web::scope("/webhook")
            .wrap(HmacMiddlewareFactory::new(
                PAYMENT_SIGNATURE_HEADER,
                config.provider.webhook_secret.clone(),
                config.provider.signature_checks,
            ))
            .service(web::resource("/payment").route(web::post().to(payment_webhook::<SqliteDatabase>)));
        // Public catalog reads
        let catalog_scope = web::scope("/products")
            .service(web::resource("").route(web::get().to(catalog::<SqliteDatabase>)))
            .service(web::resource("/{id}").route(web::get().to(product_by_id::<SqliteDatabase>)));
        app.service(health).service(api_scope).service(webhook_scope).service(catalog_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

fn notification_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_order_placed(|event| {
        Box::pin(async move {
            if let DomainEvent::OrderPlaced { order_id, buyer_id, .. }
            | DomainEvent::PaymentCompleted { order_id, buyer_id, .. } = event
            {
                info!("🔔️ Notifying {buyer_id}: order {order_id} is confirmed");
            }
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    hooks.on_payment_failed(|event| {
        Box::pin(async move {
            if let DomainEvent::PaymentFailed { order_id, buyer_id, reason } = event {
                info!("🔔️ Notifying {buyer_id}: payment for order {order_id} failed ({reason})");
            }
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    hooks.on_status_changed(|event| {
        Box::pin(async move {
            match event {
                DomainEvent::OrderStatusChanged { order_id, buyer_id, new_status, .. } => {
                    info!("🔔️ Notifying {buyer_id}: order {order_id} is now {new_status}");
                },
                DomainEvent::OrderCancelled { order_id, buyer_id, .. } => {
                    info!("🔔️ Notifying {buyer_id}: order {order_id} was cancelled");
                },
                _ => {},
            }
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    hooks
}
