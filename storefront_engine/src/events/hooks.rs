use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{DomainEvent, EventHandler, EventProducer, Handler};

/// The set of live producers handed to the dispatcher. Each event kind fans out to its subscribers; all payloads
/// are [`DomainEvent`] values so handlers match on the closed enum.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_placed_producer: Vec<EventProducer<DomainEvent>>,
    pub payment_failed_producer: Vec<EventProducer<DomainEvent>>,
    pub status_changed_producer: Vec<EventProducer<DomainEvent>>,
}

pub struct EventHandlers {
    pub on_order_placed: Option<EventHandler<DomainEvent>>,
    pub on_payment_failed: Option<EventHandler<DomainEvent>>,
    pub on_status_changed: Option<EventHandler<DomainEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_placed = hooks.on_order_placed.map(|f| EventHandler::new(buffer_size, f));
        let on_payment_failed = hooks.on_payment_failed.map(|f| EventHandler::new(buffer_size, f));
        let on_status_changed = hooks.on_status_changed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_placed, on_payment_failed, on_status_changed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_placed {
            result.order_placed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_failed {
            result.payment_failed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_status_changed {
            result.status_changed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        for handler in [self.on_order_placed, self.on_payment_failed, self.on_status_changed]
            .into_iter()
            .flatten()
        {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

/// User-registered notification hooks. Handlers run outside the request cycle and outside the outbox transaction;
/// they receive at-least-once delivery and must be idempotent.
#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_placed: Option<Handler<DomainEvent>>,
    pub on_payment_failed: Option<Handler<DomainEvent>>,
    pub on_status_changed: Option<Handler<DomainEvent>>,
}

impl EventHooks {
    pub fn on_order_placed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DomainEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_placed = Some(Arc::new(f));
        self
    }

    pub fn on_payment_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DomainEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_failed = Some(Arc::new(f));
        self
    }

    pub fn on_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DomainEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_status_changed = Some(Arc::new(f));
        self
    }
}
