use serde::{Deserialize, Serialize};
use storefront_common::Cents;

use crate::db_types::{FulfillmentStatus, LineItem, Order, OrderId, PaymentMethod, PaymentStatus};

//--------------------------------------    CheckoutRequest    -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub buyer_id: String,
    pub address_id: String,
    pub items: Vec<LineItem>,
    pub payment_method: PaymentMethod,
    /// A consistency hint from the client. Never trusted as the charge; checkout rejects it if it diverges from
    /// the server-computed total by more than the tolerance.
    pub client_estimated_amount: Option<Cents>,
}

/// What the buyer's client should do after checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NextAction {
    /// Cash order: nothing to pay up front.
    None,
    /// Online order: create a payment intent and complete the provider's hosted confirmation.
    PayOnline,
}

#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    pub order: Order,
    pub next_action: NextAction,
}

//--------------------------------------     PaymentSignal     -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded,
    Failed { reason: String },
}

impl PaymentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOutcome::Succeeded => "succeeded",
            PaymentOutcome::Failed { .. } => "failed",
        }
    }
}

/// Where a payment signal came from. All sources funnel into the same reconciliation path; the source only matters
/// for logging and audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSource {
    /// Signed push from the payment provider. The source of truth.
    Webhook,
    /// The buyer's browser reporting an SDK result. A hint, verified against the provider before being trusted.
    ClientConfirmed,
    /// The background reconciliation sweep querying the provider directly.
    Sweep,
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalSource::Webhook => write!(f, "webhook"),
            SignalSource::ClientConfirmed => write!(f, "client-confirmed"),
            SignalSource::Sweep => write!(f, "sweep"),
        }
    }
}

/// A normalized payment outcome signal: every inbound source maps to one of these before touching an order.
#[derive(Debug, Clone)]
pub struct PaymentSignal {
    pub order_id: OrderId,
    pub payment_ref: String,
    pub outcome: PaymentOutcome,
    pub source: SignalSource,
}

impl PaymentSignal {
    /// The idempotency key: reference plus outcome, so the same terminal signal deduplicates no matter which
    /// source delivers it.
    pub fn op_key(&self) -> String {
        format!("{}:{}", self.payment_ref, self.outcome.as_str())
    }
}

//--------------------------------------   ReconcileOutcome    -------------------------------------------------------
/// The recorded result of a processed payment signal; stored as the idempotency record's result and returned on
/// duplicate delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedOutcome {
    pub order_id: OrderId,
    pub fulfillment_status: FulfillmentStatus,
    pub payment_status: PaymentStatus,
}

impl From<&Order> for RecordedOutcome {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            fulfillment_status: order.fulfillment_status,
            payment_status: order.payment_status,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// The signal drove a transition (or an idempotent re-application returning the same state).
    Applied(Order),
    /// The exact signal was fully processed before; this is the recorded result of that first processing.
    AlreadyProcessed(RecordedOutcome),
    /// The provider has not settled yet. The order is untouched; the webhook or the sweep will resolve it.
    Unresolved(Order),
}

//--------------------------------------      SweepResult      -------------------------------------------------------
/// Outcome of one reconciliation sweep pass over orders stuck in `AwaitingPayment`.
#[derive(Debug, Clone, Default)]
pub struct SweepResult {
    /// Orders the provider reported as settled; now `Placed`/`Paid`.
    pub settled: Vec<Order>,
    /// Orders the provider reported as failed; now `PaymentFailed`.
    pub failed: Vec<Order>,
    /// Orders the provider still considers unsettled (or has no intent for). Left untouched.
    pub still_pending: usize,
}

impl SweepResult {
    pub fn resolved_count(&self) -> usize {
        self.settled.len() + self.failed.len()
    }
}
