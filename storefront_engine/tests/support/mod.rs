use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
};

use log::*;
use sqlx::{migrate, migrate::MigrateDatabase, Sqlite};
use storefront_common::Cents;
use storefront_engine::{
    db_types::{NewAddress, NewProduct, OrderId, Product},
    traits::{IntentStatus, PaymentIntent, PaymentProvider, ProviderError},
    AccountApi,
    CatalogApi,
    SqliteDatabase,
    StorefrontDatabase,
};

pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    create_database(url).await;
    run_migrations(url).await;
}

pub fn random_db_path() -> String {
    format!("sqlite://../data/test_store_{}", rand::random::<u64>())
}

pub async fn run_migrations(url: &str) {
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    migrate!("./src/sqlite/migrations").run(db.pool()).await.expect("Error running DB migrations");
    info!("🚀️ Migrations complete");
}

pub async fn create_database<P: AsRef<Path>>(path: P) {
    let p = path.as_ref().as_os_str().to_str().unwrap();
    if let Err(e) = Sqlite::drop_database(p).await {
        warn!("Error dropping database {p}: {e:?}");
    }
    Sqlite::create_database(p).await.expect("Error creating database");
    info!("Created Sqlite database {p}");
}

pub async fn new_test_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

pub async fn tear_down(mut db: SqliteDatabase) {
    let url = db.url().to_string();
    if let Err(e) = db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(&url).await.expect("Error dropping test database");
}

/// A programmable stand-in for the hosted payment provider.
#[derive(Clone, Default)]
pub struct FakeProvider {
    intents: Arc<Mutex<HashMap<String, IntentStatus>>>,
    by_order: Arc<Mutex<HashMap<String, String>>>,
}

impl FakeProvider {
    /// Programs the status the provider reports for an intent, correlated to the order.
    pub fn set_intent(&self, order_id: &OrderId, intent_id: &str, status: IntentStatus) {
        self.intents.lock().unwrap().insert(intent_id.to_string(), status);
        self.by_order.lock().unwrap().insert(order_id.as_str().to_string(), intent_id.to_string());
    }
}

impl PaymentProvider for FakeProvider {
    async fn create_intent(
        &self,
        order_id: &OrderId,
        _buyer_id: &str,
        _amount: Cents,
    ) -> Result<PaymentIntent, ProviderError> {
        let intent_id = format!("pi_{}", rand::random::<u32>());
        self.set_intent(order_id, &intent_id, IntentStatus::Pending);
        Ok(PaymentIntent { intent_id: intent_id.clone(), client_secret: format!("{intent_id}_secret") })
    }

    async fn fetch_intent(&self, intent_id: &str) -> Result<IntentStatus, ProviderError> {
        self.intents
            .lock()
            .unwrap()
            .get(intent_id)
            .cloned()
            .ok_or_else(|| ProviderError::IntentNotFound(intent_id.to_string()))
    }

    async fn find_intent_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<(String, IntentStatus)>, ProviderError> {
        let by_order = self.by_order.lock().unwrap();
        let Some(intent_id) = by_order.get(order_id.as_str()) else {
            return Ok(None);
        };
        let status = self.intents.lock().unwrap().get(intent_id).cloned();
        Ok(status.map(|s| (intent_id.clone(), s)))
    }
}

/// Lists a product with the given offer price and stock under `seller-1`.
pub async fn seed_product(db: &SqliteDatabase, offer_price: i64, stock: i64) -> Product {
    let api = CatalogApi::new(db.clone());
    api.add_product(NewProduct {
        seller_id: "seller-1".to_string(),
        name: "Wireless headphones".to_string(),
        description: "Over-ear, noise cancelling".to_string(),
        list_price: Cents::from(offer_price + 500),
        offer_price: Cents::from(offer_price),
        stock,
        category: "audio".to_string(),
        variants: vec![],
    })
    .await
    .expect("Error listing product")
}

/// Saves a shipping address for the buyer and returns its id.
pub async fn seed_address(db: &SqliteDatabase, buyer_id: &str) -> String {
    let api = AccountApi::new(db.clone());
    let address = api
        .add_address(buyer_id, NewAddress {
            full_name: "Alice Example".to_string(),
            phone: "555-0100".to_string(),
            postal_code: "94110".to_string(),
            area: "24th St".to_string(),
            city: "San Francisco".to_string(),
            region: "CA".to_string(),
        })
        .await
        .expect("Error saving address");
    address.id
}
