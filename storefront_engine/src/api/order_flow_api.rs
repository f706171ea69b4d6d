use std::{collections::HashMap, fmt::Debug};

use log::*;

use crate::{
    api::{
        errors::OrderFlowError,
        order_objects::{
            CheckoutReceipt,
            CheckoutRequest,
            NextAction,
            PaymentOutcome,
            PaymentSignal,
            ReconcileOutcome,
            RecordedOutcome,
            SignalSource,
            SweepResult,
        },
    },
    db_types::{FulfillmentStatus, NewOrder, OperationTicket, Order, OrderId, PaymentMethod, ProductId},
    events::DomainEvent,
    helpers::{order_total, within_tolerance},
    lifecycle::{plan_transition, OrderEvent, Transition},
    traits::{IntentStatus, LedgerError, PaymentIntent, PaymentProvider, StorefrontDatabase},
};

/// How often a transition is re-planned after losing the conditional update race before giving up. Losing twice in
/// a row already means two other transitions landed in between; beyond that something is wrong.
const MAX_TRANSITION_ATTEMPTS: usize = 3;

/// `OrderFlowApi` is the primary API for the order lifecycle: checkout, payment reconciliation, fulfillment
/// updates, buyer reads and the stuck-order sweep.
pub struct OrderFlowApi<B> {
    db: B,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> OrderFlowApi<B>
where B: StorefrontDatabase
{
    /// Submit a checkout and create the order.
    ///
    /// The total is computed server-side from the catalog's offer prices plus tax; a client-supplied estimate is
    /// only a consistency check. Cash orders are committed as `Placed` and their placement events are enqueued in
    /// the same transaction that stores the order. Online orders are stored as `AwaitingPayment` and produce no
    /// side effects until the provider confirms payment.
    pub async fn checkout(&self, req: CheckoutRequest) -> Result<CheckoutReceipt, OrderFlowError> {
        if req.items.is_empty() {
            return Err(OrderFlowError::Validation("order has no line items".to_string()));
        }
        if let Some(item) = req.items.iter().find(|i| i.quantity == 0) {
            return Err(OrderFlowError::Validation(format!(
                "line item for product {} has zero quantity",
                item.product_id
            )));
        }
        let address = self
            .db
            .fetch_address(&req.address_id)
            .await?
            .ok_or_else(|| OrderFlowError::Validation(format!("address {} does not exist", req.address_id)))?;
        if address.user_id != req.buyer_id {
            warn!("🛒️ Buyer {} tried to ship to an address owned by {}", req.buyer_id, address.user_id);
            return Err(OrderFlowError::Forbidden("address belongs to another user".to_string()));
        }

        let ids: Vec<ProductId> = req.items.iter().map(|i| i.product_id.clone()).collect();
        let products: HashMap<ProductId, _> =
            self.db.fetch_products(&ids).await?.into_iter().map(|p| (p.id.clone(), p)).collect();
        let mut subtotal = storefront_common::Cents::from(0);
        for item in &req.items {
            let product = products.get(&item.product_id).ok_or_else(|| {
                OrderFlowError::Validation(format!("product {} does not exist", item.product_id))
            })?;
            subtotal = subtotal + product.offer_price * i64::from(item.quantity);
        }
        let amount = order_total(subtotal);
        if let Some(client_amount) = req.client_estimated_amount {
            if !within_tolerance(amount, client_amount) {
                debug!("🛒️ Amount mismatch for buyer {}: server {amount}, client {client_amount}", req.buyer_id);
                return Err(OrderFlowError::AmountMismatch { expected: amount, supplied: client_amount });
            }
        }

        let new_order = NewOrder::new(req.buyer_id, req.address_id, req.items, amount, req.payment_method);
        let events = match req.payment_method {
            PaymentMethod::CashOnDelivery => vec![DomainEvent::OrderPlaced {
                order_id: new_order.id.clone(),
                buyer_id: new_order.buyer_id.clone(),
                line_items: new_order.line_items.clone(),
                amount,
                payment_method: new_order.payment_method,
            }],
            PaymentMethod::OnlinePayment => vec![],
        };
        let order = self.db.insert_order(new_order, &events).await?;
        let next_action = match order.payment_method {
            PaymentMethod::CashOnDelivery => NextAction::None,
            PaymentMethod::OnlinePayment => NextAction::PayOnline,
        };
        info!(
            "🛒️ Order {} created for buyer {} ({}, {})",
            order.id, order.buyer_id, order.amount, order.payment_method
        );
        Ok(CheckoutReceipt { order, next_action })
    }

    /// Drives a single lifecycle event through the state machine.
    ///
    /// The order is re-read and the transition re-planned each time the store's conditional update reports that a
    /// concurrent transition got there first; the plan is therefore always evaluated against a state that was
    /// current at plan time, and exactly one of two racing transitions can win any given state. A `Noop` plan
    /// (duplicate delivery) returns the unchanged order as success.
    pub async fn apply_order_event(&self, order_id: &OrderId, event: OrderEvent) -> Result<Order, OrderFlowError> {
        for attempt in 0..MAX_TRANSITION_ATTEMPTS {
            let order = self
                .db
                .fetch_order(order_id)
                .await?
                .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
            match plan_transition(&order, &event)? {
                Transition::Noop => {
                    debug!("🔄️ {} on order {order_id} is already reflected; returning current state", event.name());
                    return Ok(order);
                },
                Transition::Apply(plan) => match self.db.apply_transition(order_id, &plan).await? {
                    Some(updated) => {
                        info!(
                            "🔄️ Order {order_id}: {} → {} ({})",
                            plan.expect_fulfillment,
                            updated.fulfillment_status,
                            event.name()
                        );
                        return Ok(updated);
                    },
                    None => {
                        debug!(
                            "🔄️ Order {order_id} changed underneath a {} transition (attempt {attempt}), \
                             re-planning",
                            event.name()
                        );
                    },
                },
            }
        }
        Err(OrderFlowError::Contention(order_id.clone()))
    }

    /// Feeds a normalized payment signal through the idempotency guard and the state machine.
    ///
    /// The guard key is reference + outcome, so redelivery of the same terminal signal — from any source —
    /// short-circuits to the recorded result without re-applying side effects. A claimed key whose first attempt
    /// never recorded a result is driven again; the transition itself is idempotent, so this is safe.
    pub async fn process_payment_signal(&self, signal: PaymentSignal) -> Result<ReconcileOutcome, OrderFlowError> {
        let op_key = signal.op_key();
        let ticket = self.db.begin_operation(&op_key).await?;
        if let OperationTicket::Replayed { result: Some(prior) } = ticket {
            debug!("💳️ Signal {op_key} ({}) already processed; returning recorded result", signal.source);
            let recorded: RecordedOutcome = serde_json::from_str(&prior)
                .map_err(|e| LedgerError::CorruptRecord(format!("operation {op_key}: {e}")))?;
            return Ok(ReconcileOutcome::AlreadyProcessed(recorded));
        }

        let event = match &signal.outcome {
            PaymentOutcome::Succeeded => OrderEvent::PaymentConfirmed { payment_ref: signal.payment_ref.clone() },
            PaymentOutcome::Failed { reason } => OrderEvent::PaymentFailed { reason: reason.clone() },
        };
        let order = self.apply_order_event(&signal.order_id, event).await?;
        let recorded = RecordedOutcome::from(&order);
        let result = serde_json::to_string(&recorded)
            .map_err(|e| LedgerError::CorruptRecord(format!("operation {op_key}: {e}")))?;
        self.db.complete_operation(&op_key, &result).await?;
        info!(
            "💳️ Payment signal {op_key} from {} applied to order {}: now {}/{}",
            signal.source, order.id, order.fulfillment_status, order.payment_status
        );
        Ok(ReconcileOutcome::Applied(order))
    }

    /// Handles the buyer's browser reporting a provider SDK result. The report is a hint: the provider is queried
    /// for the authoritative status, and only a provider-verified terminal outcome enters the reconciliation path.
    pub async fn verify_client_result<P: PaymentProvider>(
        &self,
        buyer_id: &str,
        order_id: &OrderId,
        intent_id: &str,
        provider: &P,
    ) -> Result<ReconcileOutcome, OrderFlowError> {
        let order = self.order_for_buyer(order_id, buyer_id).await?;
        let status = provider.fetch_intent(intent_id).await?;
        let outcome = match status {
            IntentStatus::Pending => {
                debug!("💳️ Client reported a result for {intent_id}, but the provider has not settled yet");
                return Ok(ReconcileOutcome::Unresolved(order));
            },
            IntentStatus::Succeeded => PaymentOutcome::Succeeded,
            IntentStatus::Failed { reason } => PaymentOutcome::Failed { reason },
        };
        let signal = PaymentSignal {
            order_id: order_id.clone(),
            payment_ref: intent_id.to_string(),
            outcome,
            source: SignalSource::ClientConfirmed,
        };
        self.process_payment_signal(signal).await
    }

    /// Creates a payment intent for an online order awaiting payment. An order parked in `PaymentFailed` is first
    /// re-entered into `AwaitingPayment` (the buyer is retrying).
    ///
    /// The intent id is deliberately not written to the order here: the order's payment reference is recorded by
    /// the first *confirmed* signal, so abandoned and retried intents never conflict with the set-once rule.
    pub async fn create_payment_intent<P: PaymentProvider>(
        &self,
        order_id: &OrderId,
        buyer_id: &str,
        provider: &P,
    ) -> Result<PaymentIntent, OrderFlowError> {
        let order = self.order_for_buyer(order_id, buyer_id).await?;
        if order.payment_method != PaymentMethod::OnlinePayment {
            return Err(OrderFlowError::Validation("order is not an online-payment order".to_string()));
        }
        let order = match order.fulfillment_status {
            FulfillmentStatus::AwaitingPayment => order,
            FulfillmentStatus::PaymentFailed => self.apply_order_event(order_id, OrderEvent::Placed).await?,
            other => {
                return Err(OrderFlowError::Validation(format!("order in state {other} is not awaiting payment")))
            },
        };
        let intent = provider.create_intent(&order.id, buyer_id, order.amount).await?;
        debug!("💳️ Created intent {} for order {}", intent.intent_id, order.id);
        Ok(intent)
    }

    /// A seller moves an order along the fulfillment chain (or cancels it). The acting user must be the seller of
    /// at least one line item.
    pub async fn set_fulfillment_status(
        &self,
        order_id: &OrderId,
        requested: FulfillmentStatus,
        acting_seller: &str,
    ) -> Result<Order, OrderFlowError> {
        let order = self
            .db
            .fetch_order(order_id)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        let ids: Vec<ProductId> = order.line_items.iter().map(|i| i.product_id.clone()).collect();
        let products = self.db.fetch_products(&ids).await?;
        if !products.iter().any(|p| p.seller_id == acting_seller) {
            warn!("🔄️ User {acting_seller} tried to update order {order_id} without selling any of its items");
            return Err(OrderFlowError::Forbidden("not a seller of any item in this order".to_string()));
        }
        self.apply_order_event(order_id, OrderEvent::SellerSetStatus { status: requested }).await
    }

    /// The buyer cancels their own order.
    pub async fn cancel_order(&self, order_id: &OrderId, buyer_id: &str) -> Result<Order, OrderFlowError> {
        let order = self.order_for_buyer(order_id, buyer_id).await?;
        self.apply_order_event(&order.id, OrderEvent::BuyerCancelled).await
    }

    /// Fetches an order, enforcing buyer ownership.
    pub async fn order_for_buyer(&self, order_id: &OrderId, buyer_id: &str) -> Result<Order, OrderFlowError> {
        let order = self
            .db
            .fetch_order(order_id)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        if order.buyer_id != buyer_id {
            warn!("🛒️ Buyer {buyer_id} tried to access order {order_id} owned by {}", order.buyer_id);
            return Err(OrderFlowError::Forbidden("order belongs to another buyer".to_string()));
        }
        Ok(order)
    }

    pub async fn orders_for_buyer(&self, buyer_id: &str) -> Result<Vec<Order>, OrderFlowError> {
        Ok(self.db.fetch_orders_for_buyer(buyer_id).await?)
    }

    /// Resolves orders stuck in `AwaitingPayment` longer than `stuck_after` by asking the provider what actually
    /// happened. Orders the provider has no terminal outcome for are left exactly as they are; a timeout is never
    /// turned into a locally fabricated success or failure.
    pub async fn sweep_stuck_orders<P: PaymentProvider>(
        &self,
        stuck_after: chrono::Duration,
        provider: &P,
    ) -> Result<SweepResult, OrderFlowError> {
        let stuck = self.db.fetch_stuck_awaiting_payment(stuck_after).await?;
        let mut result = SweepResult::default();
        for order in stuck {
            let found = match provider.find_intent_for_order(&order.id).await {
                Ok(found) => found,
                Err(e) => {
                    warn!("🕰️ Could not query the provider for order {}: {e}", order.id);
                    result.still_pending += 1;
                    continue;
                },
            };
            let (intent_id, status) = match found {
                Some(pair) => pair,
                None => {
                    debug!("🕰️ Provider has no intent for stuck order {}; leaving it alone", order.id);
                    result.still_pending += 1;
                    continue;
                },
            };
            let outcome = match status {
                IntentStatus::Pending => {
                    result.still_pending += 1;
                    continue;
                },
                IntentStatus::Succeeded => PaymentOutcome::Succeeded,
                IntentStatus::Failed { reason } => PaymentOutcome::Failed { reason },
            };
            let was_success = matches!(outcome, PaymentOutcome::Succeeded);
            let signal = PaymentSignal {
                order_id: order.id.clone(),
                payment_ref: intent_id,
                outcome,
                source: SignalSource::Sweep,
            };
            match self.process_payment_signal(signal).await {
                Ok(ReconcileOutcome::Applied(order)) | Ok(ReconcileOutcome::Unresolved(order)) => {
                    if was_success {
                        result.settled.push(order);
                    } else {
                        result.failed.push(order);
                    }
                },
                Ok(ReconcileOutcome::AlreadyProcessed(_)) => {
                    // A webhook landed between the stuck query and now. Nothing left to do.
                },
                Err(e) => {
                    warn!("🕰️ Sweep could not resolve order {}: {e}", order.id);
                    result.still_pending += 1;
                },
            }
        }
        Ok(result)
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}
