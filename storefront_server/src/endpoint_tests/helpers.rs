use actix_web::{
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    web,
    App,
    Error,
};
use storefront_common::{Cents, Secret};
use storefront_engine::{
    db_types::{NewAddress, NewProduct, Product},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    AccountApi,
    CatalogApi,
    OrderFlowApi,
    SqliteDatabase,
};

use super::mocks::MockProvider;
use crate::{
    config::ServerConfig,
    middleware::{HmacMiddlewareFactory, PAYMENT_SIGNATURE_HEADER},
    routes::{
        cancel_order,
        create_order,
        create_payment_intent,
        my_orders,
        order_by_id,
        payment_result,
        payment_webhook,
        set_order_status,
    },
};

pub const WEBHOOK_SECRET: &str = "whsec_endpoint_tests";
pub const BUYER: &str = "buyer-1";

pub async fn new_test_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.provider.webhook_secret = Secret::new(WEBHOOK_SECRET.to_string());
    config.provider.signature_checks = true;
    config
}

/// The application under test: the identity-scoped API plus the signed webhook scope, wired to a throwaway
/// database and a programmable provider.
pub fn build_app(
    db: SqliteDatabase,
    provider: MockProvider,
    config: ServerConfig,
) -> App<
    impl ServiceFactory<ServiceRequest, Config = (), Response = ServiceResponse, Error = Error, InitError = ()>,
> {
    let webhook_scope = web::scope("/webhook")
        .wrap(HmacMiddlewareFactory::new(
            PAYMENT_SIGNATURE_HEADER,
            config.provider.webhook_secret.clone(),
            config.provider.signature_checks,
        ))
        .service(web::resource("/payment").route(web::post().to(payment_webhook::<SqliteDatabase>)));
    App::new()
        .app_data(web::Data::new(OrderFlowApi::new(db.clone())))
        .app_data(web::Data::new(AccountApi::new(db.clone())))
        .app_data(web::Data::new(CatalogApi::new(db)))
        .app_data(web::Data::new(provider))
        .app_data(web::Data::new(config))
        .service(
            web::scope("/api")
                .service(
                    web::resource("/orders")
                        .route(web::post().to(create_order::<SqliteDatabase>))
                        .route(web::get().to(my_orders::<SqliteDatabase>)),
                )
                .service(web::resource("/orders/{id}").route(web::get().to(order_by_id::<SqliteDatabase>)))
                .service(web::resource("/orders/{id}/cancel").route(web::post().to(cancel_order::<SqliteDatabase>)))
                .service(
                    web::resource("/orders/{id}/status").route(web::post().to(set_order_status::<SqliteDatabase>)),
                )
                .service(
                    web::resource("/orders/{id}/payment-result")
                        .route(web::post().to(payment_result::<SqliteDatabase, MockProvider>)),
                )
                .service(
                    web::resource("/payments/intent")
                        .route(web::post().to(create_payment_intent::<SqliteDatabase, MockProvider>)),
                ),
        )
        .service(webhook_scope)
}

pub async fn seed_product(db: &SqliteDatabase, offer_price: i64, stock: i64) -> Product {
    CatalogApi::new(db.clone())
        .add_product(NewProduct {
            seller_id: "seller-1".to_string(),
            name: "Mechanical keyboard".to_string(),
            description: "Tenkeyless, brown switches".to_string(),
            list_price: Cents::from(offer_price + 1_000),
            offer_price: Cents::from(offer_price),
            stock,
            category: "peripherals".to_string(),
            variants: vec![],
        })
        .await
        .expect("Error listing product")
}

pub async fn seed_address(db: &SqliteDatabase, buyer_id: &str) -> String {
    AccountApi::new(db.clone())
        .add_address(buyer_id, NewAddress {
            full_name: "Alice Example".to_string(),
            phone: "555-0100".to_string(),
            postal_code: "94110".to_string(),
            area: "24th St".to_string(),
            city: "San Francisco".to_string(),
            region: "CA".to_string(),
        })
        .await
        .expect("Error saving address")
        .id
}
