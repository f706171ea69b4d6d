//! The order lifecycle state machine.
//!
//! [`plan_transition`] is a pure function from an order and an inbound event to a [`TransitionPlan`]: the target
//! statuses, the optional payment-reference write, and the domain events to enqueue. It performs no I/O. The plan is
//! applied by the backend's atomic conditional update ([`crate::traits::StorefrontDatabase::apply_transition`]),
//! which compares the order's current fulfillment status (and payment reference, where relevant) in the same
//! statement that writes the new one. Concurrent transitions on the same order therefore serialize at the store; no
//! application-level lock is ever held.
//!
//! The happy path for an online order is
//! `AwaitingPayment → Placed → Processing → Shipped → Delivered`; cash orders skip `AwaitingPayment` and enter
//! `Placed` directly. Side branches: `AwaitingPayment → PaymentFailed` (re-enters `AwaitingPayment` on retry), and
//! cancellation from any non-terminal state.

use thiserror::Error;

use crate::{
    db_types::{FulfillmentStatus, Order, OrderId, PaymentMethod, PaymentStatus},
    events::DomainEvent,
};

//--------------------------------------      OrderEvent       -------------------------------------------------------
/// An inbound signal that may move an order between states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
    /// The payment provider reported a settled payment carrying its opaque reference.
    PaymentConfirmed { payment_ref: String },
    /// The payment provider reported a failed payment attempt.
    PaymentFailed { reason: String },
    /// A seller moved the order along the fulfillment chain (or cancelled it).
    SellerSetStatus { status: FulfillmentStatus },
    /// The buyer cancelled their own order.
    BuyerCancelled,
    /// The order is (re-)submitted for fulfillment: initial placement out of `Draft`, or a payment retry
    /// re-entering `AwaitingPayment` from `PaymentFailed`.
    Placed,
}

impl OrderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::PaymentConfirmed { .. } => "PaymentConfirmed",
            OrderEvent::PaymentFailed { .. } => "PaymentFailed",
            OrderEvent::SellerSetStatus { .. } => "SellerSetStatus",
            OrderEvent::BuyerCancelled => "BuyerCancelled",
            OrderEvent::Placed => "Placed",
        }
    }
}

//--------------------------------------    TransitionPlan     -------------------------------------------------------
/// Everything the store needs to apply a transition atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    /// The fulfillment status the order must still be in when the update lands. The conditional update fails (and
    /// the caller re-plans) if a concurrent transition got there first.
    pub expect_fulfillment: FulfillmentStatus,
    pub new_fulfillment: FulfillmentStatus,
    pub new_payment_status: Option<PaymentStatus>,
    /// Written with a `NULL`-or-equal guard so a recorded reference is never overwritten with a different one.
    pub set_payment_ref: Option<String>,
    /// Enqueued into the outbox in the same transaction as the status write.
    pub events: Vec<DomainEvent>,
}

/// The outcome of planning: either a concrete plan, or the recognition that the order already reflects the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Apply(TransitionPlan),
    /// The event was already applied (duplicate delivery). The caller reports success with the unchanged order.
    Noop,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("A {event} event is not legal for order {order_id} in state {from}")]
    Illegal { order_id: OrderId, from: FulfillmentStatus, event: &'static str },
    #[error(
        "Order {order_id} already has payment reference {recorded}, but a confirmation arrived for {received}. \
         Flagging for manual review."
    )]
    PaymentRefMismatch { order_id: OrderId, recorded: String, received: String },
}

//--------------------------------------    plan_transition    -------------------------------------------------------
/// Plans the transition for `event` against the order's current state.
///
/// The rules, by event:
///
/// | Event              | Legal from                                  | Result                                      |
/// |--------------------|---------------------------------------------|---------------------------------------------|
/// | PaymentConfirmed   | AwaitingPayment, PaymentFailed              | Placed, payment Paid, reference recorded    |
/// | PaymentConfirmed   | any state, same reference already recorded  | No-op (duplicate delivery)                  |
/// | PaymentConfirmed   | any state, different reference recorded     | Rejected: reference conflict                |
/// | PaymentFailed      | AwaitingPayment                             | PaymentFailed, payment Failed               |
/// | Placed             | Draft                                       | Placed (cash) or AwaitingPayment (online)   |
/// | Placed             | PaymentFailed                               | AwaitingPayment (payment retry)             |
/// | BuyerCancelled     | AwaitingPayment, Placed, PaymentFailed      | Cancelled                                   |
/// | SellerSetStatus    | forward moves along Placed..Delivered       | target status; Delivered on cash ⇒ Paid     |
/// | SellerSetStatus    | Cancelled target, any non-terminal state    | Cancelled                                   |
///
/// Everything else is rejected with [`TransitionError::Illegal`] — illegal transitions are reported, never silently
/// ignored, and never a retry target.
pub fn plan_transition(order: &Order, event: &OrderEvent) -> Result<Transition, TransitionError> {
    use FulfillmentStatus::*;
    let from = order.fulfillment_status;
    match event {
        OrderEvent::PaymentConfirmed { payment_ref } => {
            if let Some(recorded) = order.payment_ref.as_deref() {
                if recorded != payment_ref {
                    return Err(TransitionError::PaymentRefMismatch {
                        order_id: order.id.clone(),
                        recorded: recorded.to_string(),
                        received: payment_ref.clone(),
                    });
                }
                // Same reference delivered again: the first confirmation already moved the order on.
                if order.payment_status == PaymentStatus::Paid {
                    return Ok(Transition::Noop);
                }
            }
            match from {
                AwaitingPayment | PaymentFailed => Ok(Transition::Apply(TransitionPlan {
                    expect_fulfillment: from,
                    new_fulfillment: Placed,
                    new_payment_status: Some(PaymentStatus::Paid),
                    set_payment_ref: Some(payment_ref.clone()),
                    events: vec![DomainEvent::PaymentCompleted {
                        order_id: order.id.clone(),
                        buyer_id: order.buyer_id.clone(),
                        payment_ref: payment_ref.clone(),
                        amount: order.amount,
                        line_items: order.line_items.clone(),
                    }],
                })),
                Draft | Placed | Processing | Shipped | Delivered | Cancelled => {
                    Err(illegal(order, from, event))
                },
            }
        },
        OrderEvent::PaymentFailed { reason } => match from {
            AwaitingPayment => Ok(Transition::Apply(TransitionPlan {
                expect_fulfillment: from,
                new_fulfillment: PaymentFailed,
                new_payment_status: Some(PaymentStatus::Failed),
                set_payment_ref: None,
                events: vec![DomainEvent::PaymentFailed {
                    order_id: order.id.clone(),
                    buyer_id: order.buyer_id.clone(),
                    reason: reason.clone(),
                }],
            })),
            PaymentFailed => Ok(Transition::Noop),
            Draft | Placed | Processing | Shipped | Delivered | Cancelled => Err(illegal(order, from, event)),
        },
        OrderEvent::Placed => match (from, order.payment_method) {
            (Draft, PaymentMethod::CashOnDelivery) => Ok(Transition::Apply(TransitionPlan {
                expect_fulfillment: from,
                new_fulfillment: Placed,
                new_payment_status: None,
                set_payment_ref: None,
                events: vec![placed_event(order)],
            })),
            (Draft, PaymentMethod::OnlinePayment) => Ok(Transition::Apply(TransitionPlan {
                expect_fulfillment: from,
                new_fulfillment: AwaitingPayment,
                new_payment_status: None,
                set_payment_ref: None,
                events: vec![],
            })),
            // A payment retry puts the order back in front of the provider.
            (PaymentFailed, PaymentMethod::OnlinePayment) => Ok(Transition::Apply(TransitionPlan {
                expect_fulfillment: from,
                new_fulfillment: AwaitingPayment,
                new_payment_status: Some(PaymentStatus::Pending),
                set_payment_ref: None,
                events: vec![],
            })),
            (AwaitingPayment, _) => Ok(Transition::Noop),
            (_, _) => Err(illegal(order, from, event)),
        },
        OrderEvent::BuyerCancelled => match from {
            AwaitingPayment | Placed | PaymentFailed => Ok(Transition::Apply(cancel_plan(order, from))),
            Cancelled => Ok(Transition::Noop),
            Draft | Processing | Shipped | Delivered => Err(illegal(order, from, event)),
        },
        OrderEvent::SellerSetStatus { status } => plan_seller_status(order, from, *status, event),
    }
}

fn plan_seller_status(
    order: &Order,
    from: FulfillmentStatus,
    target: FulfillmentStatus,
    event: &OrderEvent,
) -> Result<Transition, TransitionError> {
    use FulfillmentStatus::*;
    match target {
        Cancelled => match from {
            Cancelled => Ok(Transition::Noop),
            Delivered => Err(illegal(order, from, event)),
            _ => Ok(Transition::Apply(cancel_plan(order, from))),
        },
        Processing | Shipped | Delivered => {
            let (Some(from_rank), Some(target_rank)) = (from.progress_rank(), target.progress_rank()) else {
                return Err(illegal(order, from, event));
            };
            if from_rank == target_rank {
                return Ok(Transition::Noop);
            }
            if from_rank > target_rank {
                return Err(illegal(order, from, event));
            }
            // Delivering a cash order collects the payment; the two writes land in one atomic update.
            let new_payment_status = (target == Delivered
                && order.payment_method == PaymentMethod::CashOnDelivery)
                .then_some(PaymentStatus::Paid);
            Ok(Transition::Apply(TransitionPlan {
                expect_fulfillment: from,
                new_fulfillment: target,
                new_payment_status,
                set_payment_ref: None,
                events: vec![DomainEvent::OrderStatusChanged {
                    order_id: order.id.clone(),
                    buyer_id: order.buyer_id.clone(),
                    old_status: from,
                    new_status: target,
                }],
            }))
        },
        Draft | AwaitingPayment | Placed | PaymentFailed => Err(illegal(order, from, event)),
    }
}

fn cancel_plan(order: &Order, from: FulfillmentStatus) -> TransitionPlan {
    use FulfillmentStatus::*;
    // Stock was only taken for orders that made it into the fulfillment chain.
    let was_placed = matches!(from, Placed | Processing | Shipped);
    TransitionPlan {
        expect_fulfillment: from,
        new_fulfillment: Cancelled,
        new_payment_status: None,
        set_payment_ref: None,
        events: vec![DomainEvent::OrderCancelled {
            order_id: order.id.clone(),
            buyer_id: order.buyer_id.clone(),
            line_items: order.line_items.clone(),
            was_placed,
        }],
    }
}

fn placed_event(order: &Order) -> DomainEvent {
    DomainEvent::OrderPlaced {
        order_id: order.id.clone(),
        buyer_id: order.buyer_id.clone(),
        line_items: order.line_items.clone(),
        amount: order.amount,
        payment_method: order.payment_method,
    }
}

fn illegal(order: &Order, from: FulfillmentStatus, event: &OrderEvent) -> TransitionError {
    TransitionError::Illegal { order_id: order.id.clone(), from, event: event.name() }
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use storefront_common::Cents;

    use super::*;
    use crate::db_types::{LineItem, OrderId, ProductId};

    fn order(method: PaymentMethod, status: FulfillmentStatus) -> Order {
        Order {
            id: OrderId::from("ord-test".to_string()),
            buyer_id: "buyer-1".to_string(),
            line_items: vec![LineItem { product_id: ProductId::from("prd-1"), quantity: 2, selected_variant: None }],
            amount: Cents::from(102),
            payment_method: method,
            payment_status: PaymentStatus::Pending,
            fulfillment_status: status,
            payment_ref: None,
            address_id: "adr-1".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn confirmed(payment_ref: &str) -> OrderEvent {
        OrderEvent::PaymentConfirmed { payment_ref: payment_ref.to_string() }
    }

    #[test]
    fn payment_confirmation_places_online_order() {
        let o = order(PaymentMethod::OnlinePayment, FulfillmentStatus::AwaitingPayment);
        let Transition::Apply(plan) = plan_transition(&o, &confirmed("pi_123")).unwrap() else {
            panic!("expected a plan");
        };
        assert_eq!(plan.expect_fulfillment, FulfillmentStatus::AwaitingPayment);
        assert_eq!(plan.new_fulfillment, FulfillmentStatus::Placed);
        assert_eq!(plan.new_payment_status, Some(PaymentStatus::Paid));
        assert_eq!(plan.set_payment_ref.as_deref(), Some("pi_123"));
        assert!(matches!(plan.events.as_slice(), [DomainEvent::PaymentCompleted { .. }]));
    }

    #[test]
    fn duplicate_confirmation_is_a_noop() {
        let mut o = order(PaymentMethod::OnlinePayment, FulfillmentStatus::Placed);
        o.payment_status = PaymentStatus::Paid;
        o.payment_ref = Some("pi_123".to_string());
        assert_eq!(plan_transition(&o, &confirmed("pi_123")).unwrap(), Transition::Noop);
    }

    #[test]
    fn conflicting_reference_is_rejected() {
        let mut o = order(PaymentMethod::OnlinePayment, FulfillmentStatus::Placed);
        o.payment_status = PaymentStatus::Paid;
        o.payment_ref = Some("pi_123".to_string());
        let err = plan_transition(&o, &confirmed("pi_999")).unwrap_err();
        assert!(matches!(err, TransitionError::PaymentRefMismatch { recorded, received, .. }
            if recorded == "pi_123" && received == "pi_999"));
    }

    #[test]
    fn confirmation_on_cash_order_is_illegal() {
        let o = order(PaymentMethod::CashOnDelivery, FulfillmentStatus::Placed);
        let err = plan_transition(&o, &confirmed("pi_123")).unwrap_err();
        assert!(matches!(err, TransitionError::Illegal { from: FulfillmentStatus::Placed, .. }));
    }

    #[test]
    fn late_confirmation_rescues_failed_payment() {
        let mut o = order(PaymentMethod::OnlinePayment, FulfillmentStatus::PaymentFailed);
        o.payment_status = PaymentStatus::Failed;
        let Transition::Apply(plan) = plan_transition(&o, &confirmed("pi_123")).unwrap() else {
            panic!("expected a plan");
        };
        assert_eq!(plan.new_fulfillment, FulfillmentStatus::Placed);
        assert_eq!(plan.new_payment_status, Some(PaymentStatus::Paid));
    }

    #[test]
    fn payment_failure_on_delivered_order_is_rejected() {
        let mut o = order(PaymentMethod::OnlinePayment, FulfillmentStatus::Delivered);
        o.payment_status = PaymentStatus::Paid;
        let err = plan_transition(&o, &OrderEvent::PaymentFailed { reason: "card declined".into() }).unwrap_err();
        assert!(matches!(err, TransitionError::Illegal { from: FulfillmentStatus::Delivered, .. }));
    }

    #[test]
    fn payment_failure_parks_order() {
        let o = order(PaymentMethod::OnlinePayment, FulfillmentStatus::AwaitingPayment);
        let Transition::Apply(plan) =
            plan_transition(&o, &OrderEvent::PaymentFailed { reason: "card declined".into() }).unwrap()
        else {
            panic!("expected a plan");
        };
        assert_eq!(plan.new_fulfillment, FulfillmentStatus::PaymentFailed);
        assert_eq!(plan.new_payment_status, Some(PaymentStatus::Failed));
    }

    #[test]
    fn retry_reenters_awaiting_payment() {
        let mut o = order(PaymentMethod::OnlinePayment, FulfillmentStatus::PaymentFailed);
        o.payment_status = PaymentStatus::Failed;
        let Transition::Apply(plan) = plan_transition(&o, &OrderEvent::Placed).unwrap() else {
            panic!("expected a plan");
        };
        assert_eq!(plan.new_fulfillment, FulfillmentStatus::AwaitingPayment);
        assert_eq!(plan.new_payment_status, Some(PaymentStatus::Pending));
        assert!(plan.events.is_empty());
    }

    #[test]
    fn cash_delivery_collects_payment_atomically() {
        let o = order(PaymentMethod::CashOnDelivery, FulfillmentStatus::Shipped);
        let ev = OrderEvent::SellerSetStatus { status: FulfillmentStatus::Delivered };
        let Transition::Apply(plan) = plan_transition(&o, &ev).unwrap() else {
            panic!("expected a plan");
        };
        assert_eq!(plan.new_fulfillment, FulfillmentStatus::Delivered);
        assert_eq!(plan.new_payment_status, Some(PaymentStatus::Paid));
    }

    #[test]
    fn online_delivery_leaves_payment_alone() {
        let mut o = order(PaymentMethod::OnlinePayment, FulfillmentStatus::Shipped);
        o.payment_status = PaymentStatus::Paid;
        o.payment_ref = Some("pi_123".to_string());
        let ev = OrderEvent::SellerSetStatus { status: FulfillmentStatus::Delivered };
        let Transition::Apply(plan) = plan_transition(&o, &ev).unwrap() else {
            panic!("expected a plan");
        };
        assert_eq!(plan.new_payment_status, None);
    }

    #[test]
    fn fulfillment_never_moves_backwards() {
        let o = order(PaymentMethod::CashOnDelivery, FulfillmentStatus::Shipped);
        let ev = OrderEvent::SellerSetStatus { status: FulfillmentStatus::Processing };
        assert!(plan_transition(&o, &ev).is_err());
        let same = OrderEvent::SellerSetStatus { status: FulfillmentStatus::Shipped };
        assert_eq!(plan_transition(&o, &same).unwrap(), Transition::Noop);
    }

    #[test]
    fn seller_cannot_process_an_unpaid_online_order() {
        let o = order(PaymentMethod::OnlinePayment, FulfillmentStatus::AwaitingPayment);
        let ev = OrderEvent::SellerSetStatus { status: FulfillmentStatus::Processing };
        assert!(plan_transition(&o, &ev).is_err());
    }

    #[test]
    fn seller_cancel_allowed_from_any_non_terminal_state() {
        for from in [
            FulfillmentStatus::AwaitingPayment,
            FulfillmentStatus::Placed,
            FulfillmentStatus::Processing,
            FulfillmentStatus::Shipped,
            FulfillmentStatus::PaymentFailed,
        ] {
            let o = order(PaymentMethod::OnlinePayment, from);
            let ev = OrderEvent::SellerSetStatus { status: FulfillmentStatus::Cancelled };
            assert!(matches!(plan_transition(&o, &ev).unwrap(), Transition::Apply(_)), "from {from}");
        }
        let delivered = order(PaymentMethod::OnlinePayment, FulfillmentStatus::Delivered);
        let ev = OrderEvent::SellerSetStatus { status: FulfillmentStatus::Cancelled };
        assert!(plan_transition(&delivered, &ev).is_err());
    }

    #[test]
    fn buyer_cancel_stops_at_processing() {
        let o = order(PaymentMethod::CashOnDelivery, FulfillmentStatus::Placed);
        assert!(matches!(plan_transition(&o, &OrderEvent::BuyerCancelled).unwrap(), Transition::Apply(_)));
        let o = order(PaymentMethod::CashOnDelivery, FulfillmentStatus::Processing);
        assert!(plan_transition(&o, &OrderEvent::BuyerCancelled).is_err());
    }

    #[test]
    fn cancelling_a_placed_order_flags_restock() {
        let o = order(PaymentMethod::CashOnDelivery, FulfillmentStatus::Placed);
        let Transition::Apply(plan) = plan_transition(&o, &OrderEvent::BuyerCancelled).unwrap() else {
            panic!("expected a plan");
        };
        assert!(matches!(plan.events.as_slice(), [DomainEvent::OrderCancelled { was_placed: true, .. }]));

        let o = order(PaymentMethod::OnlinePayment, FulfillmentStatus::AwaitingPayment);
        let Transition::Apply(plan) = plan_transition(&o, &OrderEvent::BuyerCancelled).unwrap() else {
            panic!("expected a plan");
        };
        assert!(matches!(plan.events.as_slice(), [DomainEvent::OrderCancelled { was_placed: false, .. }]));
    }
}
