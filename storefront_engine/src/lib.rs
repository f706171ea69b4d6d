//! Storefront Order & Payment Engine
//!
//! This library contains the core logic for the storefront's order lifecycle: how an order moves between states as
//! signals arrive from buyers, sellers, the payment provider and background workers. It is HTTP-framework agnostic.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`]). Currently, SQLite is the supported backend. You should never
//!    need to access the database directly. Instead, use the public API provided by the engine. The exception is the
//!    data types used in the database. These are defined in the `db_types` module and are public.
//! 2. The engine public API ([`mod@api`]). This provides the public-facing functionality: checkout, payment
//!    reconciliation, fulfillment updates, carts, catalog and addresses. Specific backends need to implement the
//!    traits in the [`mod@traits`] module in order to act as a backend for the storefront server.
//! 3. The event system ([`mod@events`]). Every committed order transition enqueues domain events into a durable
//!    outbox in the same transaction. A background dispatcher drains the outbox in batches and drives the idempotent
//!    side-effect consumers (stock adjustment, cart clearing) as well as the in-process notification hooks.
//!
//! The state machine itself lives in [`mod@lifecycle`] and is a pure function from (order, event) to a transition
//! plan; the backend's atomic conditional update is the only mechanism that applies a plan.
pub mod api;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod lifecycle;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use api::{
    account_api::AccountApi,
    catalog_api::CatalogApi,
    errors::OrderFlowError,
    order_flow_api::OrderFlowApi,
    order_objects,
};
pub use traits::{LedgerError, PaymentProvider, StorefrontDatabase};
