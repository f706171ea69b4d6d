use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storefront_common::Cents;

use crate::db_types::{FulfillmentStatus, LineItem, OrderId, PaymentMethod};

/// The closed set of domain events produced by order transitions.
///
/// Events are serialized into the outbox as tagged JSON and must carry everything a consumer needs, so that the
/// dispatcher never has to re-read the order to apply a side effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// The order is committed: a cash order at checkout, or an online order on payment confirmation.
    OrderPlaced {
        order_id: OrderId,
        buyer_id: String,
        line_items: Vec<LineItem>,
        amount: Cents,
        payment_method: PaymentMethod,
    },
    /// The provider reported a settled payment for the order.
    PaymentCompleted {
        order_id: OrderId,
        buyer_id: String,
        payment_ref: String,
        amount: Cents,
        line_items: Vec<LineItem>,
    },
    /// The provider reported a failed payment attempt.
    PaymentFailed { order_id: OrderId, buyer_id: String, reason: String },
    /// The seller moved the order along the fulfillment chain.
    OrderStatusChanged {
        order_id: OrderId,
        buyer_id: String,
        old_status: FulfillmentStatus,
        new_status: FulfillmentStatus,
    },
    /// The order was cancelled. `was_placed` tells the stock consumer whether a decrement needs undoing.
    OrderCancelled { order_id: OrderId, buyer_id: String, line_items: Vec<LineItem>, was_placed: bool },
}

impl DomainEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            DomainEvent::OrderPlaced { .. } => "order_placed",
            DomainEvent::PaymentCompleted { .. } => "payment_completed",
            DomainEvent::PaymentFailed { .. } => "payment_failed",
            DomainEvent::OrderStatusChanged { .. } => "order_status_changed",
            DomainEvent::OrderCancelled { .. } => "order_cancelled",
        }
    }

    pub fn order_id(&self) -> &OrderId {
        match self {
            DomainEvent::OrderPlaced { order_id, .. }
            | DomainEvent::PaymentCompleted { order_id, .. }
            | DomainEvent::PaymentFailed { order_id, .. }
            | DomainEvent::OrderStatusChanged { order_id, .. }
            | DomainEvent::OrderCancelled { order_id, .. } => order_id,
        }
    }

    pub fn buyer_id(&self) -> &str {
        match self {
            DomainEvent::OrderPlaced { buyer_id, .. }
            | DomainEvent::PaymentCompleted { buyer_id, .. }
            | DomainEvent::PaymentFailed { buyer_id, .. }
            | DomainEvent::OrderStatusChanged { buyer_id, .. }
            | DomainEvent::OrderCancelled { buyer_id, .. } => buyer_id,
        }
    }
}

/// An event as it sits in the durable outbox.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub id: i64,
    pub event: DomainEvent,
    pub emitted_at: DateTime<Utc>,
    pub attempts: i64,
}
