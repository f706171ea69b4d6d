use thiserror::Error;

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
};

/// A single stock delta for a product. Negative deltas decrement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockAdjustment {
    pub product_id: ProductId,
    pub delta: i64,
}

/// This trait defines the behaviour a storage backend must provide to act as the storefront's ledger store.
///
/// The two load-bearing guarantees are:
/// * [`Self::apply_transition`] is an atomic conditional update: the new order state lands only if the order is
///   still in the state the plan expects, and the plan's domain events are enqueued in the same transaction. This
///   is the only legal way to mutate an order after creation.
/// * [`Self::begin_operation`] is backed by a uniqueness constraint, so two concurrent attempts to claim the same
///   operation key cannot both see `New`. A read-then-write check is not an acceptable implementation.
#[allow(async_fn_in_trait)]
pub trait StorefrontDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    //----------------------------------------    Orders    ----------------------------------------------------------
    /// Stores a brand-new order and enqueues the given events, in a single atomic transaction.
    async fn insert_order(&self, order: NewOrder, events: &[DomainEvent]) -> Result<Order, LedgerError>;

    async fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, LedgerError>;

    /// All orders belonging to the buyer, most recent first.
    async fn fetch_orders_for_buyer(&self, buyer_id: &str) -> Result<Vec<Order>, LedgerError>;

    /// Applies a transition plan with a compare-and-swap on the current fulfillment status (and a null-or-equal
    /// guard on the payment reference, when the plan writes one), enqueueing the plan's events in the same
    /// transaction.
    ///
    /// Returns `None` when the conditional update matched no row — i.e. a concurrent transition won the race — in
    /// which case the caller re-reads the order and re-plans.
    async fn apply_transition(&self, order_id: &OrderId, plan: &TransitionPlan) -> Result<Option<Order>, LedgerError>;

    /// Online orders still in `AwaitingPayment` whose last update is older than `stuck_after`. Input to the
    /// reconciliation sweep.
    async fn fetch_stuck_awaiting_payment(&self, stuck_after: chrono::Duration) -> Result<Vec<Order>, LedgerError>;

    //----------------------------------------  Idempotency  ---------------------------------------------------------
    /// Claims an operation key. The insert relies on the store's uniqueness constraint; a duplicate claim returns
    /// [`OperationTicket::Replayed`] with whatever result the first attempt recorded.
    async fn begin_operation(&self, op_key: &str) -> Result<OperationTicket, LedgerError>;

    /// Records the outcome for a previously claimed operation key.
    async fn complete_operation(&self, op_key: &str, result: &str) -> Result<(), LedgerError>;

    //----------------------------------------    Catalog    ---------------------------------------------------------
    async fn insert_product(&self, product: NewProduct) -> Result<Product, LedgerError>;

    async fn fetch_product(&self, id: &ProductId) -> Result<Option<Product>, LedgerError>;

    /// Fetches the given products in one round trip. Missing ids are simply absent from the result.
    async fn fetch_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, LedgerError>;

    async fn fetch_catalog(&self) -> Result<Vec<Product>, LedgerError>;

    /// Applies keyed groups of stock deltas. For each group, claiming the operation key, applying the deltas and
    /// recording completion happen in one transaction, so a group is applied at most once no matter how often its
    /// event is redelivered. Groups whose key was already completed are skipped. Returns the number of groups
    /// applied. Stock never goes below zero.
    async fn adjust_stock_keyed(&self, groups: &[(String, Vec<StockAdjustment>)]) -> Result<usize, LedgerError>;

    //----------------------------------------     Carts     ---------------------------------------------------------
    /// The buyer's cart. A buyer who has never written a cart gets an empty one.
    async fn fetch_cart(&self, user_id: &str) -> Result<CartItems, LedgerError>;

    async fn put_cart(&self, user_id: &str, items: &CartItems) -> Result<(), LedgerError>;

    /// Empties the cart at most once per operation key: the claim, the clear and the completion land in one
    /// transaction. Returns whether this call performed the clear.
    async fn clear_cart_once(&self, user_id: &str, op_key: &str) -> Result<bool, LedgerError>;

    //----------------------------------------   Addresses   ---------------------------------------------------------
    async fn insert_address(&self, user_id: &str, address: NewAddress) -> Result<Address, LedgerError>;

    async fn fetch_address(&self, id: &str) -> Result<Option<Address>, LedgerError>;

    async fn fetch_addresses_for_user(&self, user_id: &str) -> Result<Vec<Address>, LedgerError>;

    //----------------------------------------     Outbox    ---------------------------------------------------------
    /// Enqueues events outside a transition (transitions enqueue through [`Self::apply_transition`] and
    /// [`Self::insert_order`] instead, atomically). Delivery is at-least-once; consumers must deduplicate.
    async fn enqueue_events(&self, events: &[DomainEvent]) -> Result<(), LedgerError>;

    /// The next batch of unprocessed, due events in enqueue order.
    async fn claim_due_events(&self, limit: usize) -> Result<Vec<EventRecord>, LedgerError>;

    async fn mark_event_processed(&self, event_id: i64) -> Result<(), LedgerError>;

    /// Pushes an event's next attempt `delay` into the future and bumps its attempt counter.
    async fn reschedule_event(&self, event_id: i64, delay: chrono::Duration) -> Result<(), LedgerError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("Cannot insert order, since it already exists with id {0}")]
    OrderAlreadyExists(OrderId),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested product {0} does not exist")]
    ProductNotFound(ProductId),
    #[error("The requested address {0} does not exist")]
    AddressNotFound(String),
    #[error("Stored document could not be decoded: {0}")]
    CorruptRecord(String),
    #[error("The outbox event {0} does not exist")]
    EventNotFound(i64),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}
