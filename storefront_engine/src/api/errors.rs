use storefront_common::Cents;
use thiserror::Error;

use crate::{
    db_types::OrderId,
    lifecycle::TransitionError,
    traits::{LedgerError, ProviderError},
};

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("The supplied total {supplied} diverges from the computed total {expected} by more than the tolerance")]
    AmountMismatch { expected: Cents, supplied: Cents },
    #[error("{0}")]
    Forbidden(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Order {0} kept being modified concurrently; giving up after retries")]
    Contention(OrderId),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("Payment provider error. {0}")]
    Provider(#[from] ProviderError),
}
