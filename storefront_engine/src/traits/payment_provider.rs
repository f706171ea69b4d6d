use storefront_common::Cents;
use thiserror::Error;

use crate::db_types::OrderId;

/// A freshly created payment intent. The client secret goes back to the buyer's browser; the intent id correlates
/// later webhook and verification signals. No final status exists yet at this point.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub intent_id: String,
    pub client_secret: String,
}

/// The provider's view of an intent, as returned by a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentStatus {
    /// The provider has not reached a terminal outcome. Callers must not fabricate one locally.
    Pending,
    Succeeded,
    Failed { reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Could not reach the payment provider. {0}")]
    Request(String),
    #[error("Could not decode the payment provider's response. {0}")]
    Decode(String),
    #[error("The payment provider does not know intent {0}")]
    IntentNotFound(String),
}

/// The hosted payment provider, as consumed by the engine. The concrete REST client lives in the server crate;
/// tests substitute programmable fakes.
#[allow(async_fn_in_trait)]
pub trait PaymentProvider: Clone {
    /// Creates a payment intent for the order, tagged with `{order_id, buyer_id}` metadata so asynchronous signals
    /// can be correlated back.
    async fn create_intent(
        &self,
        order_id: &OrderId,
        buyer_id: &str,
        amount: Cents,
    ) -> Result<PaymentIntent, ProviderError>;

    /// Queries the provider for the authoritative status of an intent.
    async fn fetch_intent(&self, intent_id: &str) -> Result<IntentStatus, ProviderError>;

    /// Looks up the most recent intent the provider holds for an order, by the metadata the intent was created
    /// with. Used by the reconciliation sweep for orders whose webhook never arrived; returns `None` when the
    /// provider has no intent for the order.
    async fn find_intent_for_order(&self, order_id: &OrderId) -> Result<Option<(String, IntentStatus)>, ProviderError>;
}
