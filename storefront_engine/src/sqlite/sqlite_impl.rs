//! `SqliteDatabase` is a concrete implementation of a storefront ledger store.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the [`StorefrontDatabase`] trait by composing the
//! low-level functions in [`super::db`] into transactions. The two operations with atomicity requirements —
//! [`StorefrontDatabase::insert_order`] and [`StorefrontDatabase::apply_transition`] — wrap the order write and
//! the outbox enqueue in a single transaction.
use std::fmt::Debug;

use sqlx::SqlitePool;

use super::db::{addresses, idempotency, new_pool, orders, outbox, products, users};
use crate::{
    db_types::{
        Address,
        CartItems,
        NewAddress,
        NewOrder,
        NewProduct,
        OperationTicket,
        Order,
        OrderId,
        Product,
        ProductId,
    },
    events::{DomainEvent, EventRecord},
    lifecycle::TransitionPlan,
    traits::{LedgerError, StockAdjustment, StorefrontDatabase},
};

/// An explicitly constructed, dependency-injected store client. The pool is created exactly once here; there is no
/// process-wide singleton handle.
#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, LedgerError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl StorefrontDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder, events: &[DomainEvent]) -> Result<Order, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        outbox::enqueue(events, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(id, &mut conn).await
    }

    async fn fetch_orders_for_buyer(&self, buyer_id: &str) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_orders_for_buyer(buyer_id, &mut conn).await
    }

    async fn apply_transition(&self, order_id: &OrderId, plan: &TransitionPlan) -> Result<Option<Order>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let updated = orders::conditional_update(order_id, plan, &mut tx).await?;
        let updated = match updated {
            Some(order) => {
                outbox::enqueue(&plan.events, &mut tx).await?;
                tx.commit().await?;
                Some(order)
            },
            None => None,
        };
        Ok(updated)
    }

    async fn fetch_stuck_awaiting_payment(&self, stuck_after: chrono::Duration) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_stuck_awaiting_payment(stuck_after, &mut conn).await
    }

    async fn begin_operation(&self, op_key: &str) -> Result<OperationTicket, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        idempotency::begin_operation(op_key, &mut conn).await
    }

    async fn complete_operation(&self, op_key: &str, result: &str) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        idempotency::complete_operation(op_key, result, &mut conn).await
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        products::insert_product(product, &mut conn).await
    }

    async fn fetch_product(&self, id: &ProductId) -> Result<Option<Product>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        products::fetch_product(id, &mut conn).await
    }

    async fn fetch_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        products::fetch_products(ids, &mut conn).await
    }

    async fn fetch_catalog(&self) -> Result<Vec<Product>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        products::fetch_catalog(&mut conn).await
    }

    async fn adjust_stock_keyed(&self, groups: &[(String, Vec<StockAdjustment>)]) -> Result<usize, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let mut applied = 0;
        for (op_key, deltas) in groups {
            if idempotency::claim_for_processing(op_key, &mut tx).await? {
                products::adjust_stock(deltas, &mut tx).await?;
                idempotency::complete_operation(op_key, "applied", &mut tx).await?;
                applied += 1;
            }
        }
        tx.commit().await?;
        Ok(applied)
    }

    async fn fetch_cart(&self, user_id: &str) -> Result<CartItems, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        users::fetch_cart(user_id, &mut conn).await
    }

    async fn put_cart(&self, user_id: &str, items: &CartItems) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        users::put_cart(user_id, items, &mut conn).await
    }

    async fn clear_cart_once(&self, user_id: &str, op_key: &str) -> Result<bool, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let proceed = idempotency::claim_for_processing(op_key, &mut tx).await?;
        if proceed {
            users::clear_cart(user_id, &mut tx).await?;
            idempotency::complete_operation(op_key, "cleared", &mut tx).await?;
        }
        tx.commit().await?;
        Ok(proceed)
    }

    async fn insert_address(&self, user_id: &str, address: NewAddress) -> Result<Address, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        addresses::insert_address(user_id, address, &mut conn).await
    }

    async fn fetch_address(&self, id: &str) -> Result<Option<Address>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        addresses::fetch_address(id, &mut conn).await
    }

    async fn fetch_addresses_for_user(&self, user_id: &str) -> Result<Vec<Address>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        addresses::fetch_addresses_for_user(user_id, &mut conn).await
    }

    async fn enqueue_events(&self, events: &[DomainEvent]) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;
        outbox::enqueue(events, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn claim_due_events(&self, limit: usize) -> Result<Vec<EventRecord>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        outbox::claim_due(limit, &mut conn).await
    }

    async fn mark_event_processed(&self, event_id: i64) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        outbox::mark_processed(event_id, &mut conn).await
    }

    async fn reschedule_event(&self, event_id: i64, delay: chrono::Duration) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        outbox::reschedule(event_id, delay, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), LedgerError> {
        self.pool.close().await;
        Ok(())
    }
}
