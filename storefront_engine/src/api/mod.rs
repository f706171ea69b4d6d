//! The engine's public API.
//!
//! [`order_flow_api::OrderFlowApi`] is the primary entry point: checkout, payment reconciliation, fulfillment
//! updates and the stuck-order sweep all go through it. [`account_api::AccountApi`] covers buyer-profile concerns
//! (carts, addresses) and [`catalog_api::CatalogApi`] the minimal seller catalog surface.
pub mod account_api;
pub mod catalog_api;
pub mod errors;
pub mod order_flow_api;
pub mod order_objects;
