//! The outbox dispatcher.
//!
//! Order transitions enqueue [`DomainEvent`]s into a durable outbox in the same transaction that commits the
//! transition, so an event exists if and only if its transition committed. This worker drains the outbox in bounded
//! batches, applies the built-in side-effect consumers and fans events out to the notification hooks.
//!
//! Delivery is at-least-once: a crash between applying a side effect and marking the event processed redelivers the
//! event, so every consumer runs under an operation key from the idempotency guard. Events whose consumers keep
//! failing are retried with a growing delay and parked after `max_attempts`, loudly.
//!
//! There is no ordering guarantee across orders. Within one order, events are claimed in enqueue order, but
//! consumers tolerate reordering because each side effect is keyed independently.
use std::collections::BTreeMap;

use log::*;
use tokio::task::JoinHandle;

use crate::{
    db_types::ProductId,
    events::{DomainEvent, EventProducers, EventRecord},
    traits::{LedgerError, StockAdjustment, StorefrontDatabase},
};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum events claimed per poll.
    pub batch_size: usize,
    /// How long the worker idles when the outbox is empty.
    pub poll_interval: std::time::Duration,
    /// Attempts before an event is parked.
    pub max_attempts: i64,
    /// Base delay between attempts; grows linearly with the attempt count.
    pub retry_backoff: chrono::Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            poll_interval: std::time::Duration::from_secs(5),
            max_attempts: 8,
            retry_backoff: chrono::Duration::seconds(30),
        }
    }
}

pub struct EventDispatcher<B> {
    db: B,
    producers: EventProducers,
    config: DispatcherConfig,
}

// The dispatcher loop is only spawnable for the concrete backend: a spawned task must be Send, and the futures of
// a generic `B`'s async trait methods are not known to be.
#[cfg(feature = "sqlite")]
impl EventDispatcher<crate::SqliteDatabase> {
    /// Starts the dispatcher loop. Do not await the returned JoinHandle, as it runs indefinitely.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("📤️ Event dispatcher started (batch size {})", self.config.batch_size);
            loop {
                match self.run_once().await {
                    Ok(0) => tokio::time::sleep(self.config.poll_interval).await,
                    Ok(n) => trace!("📤️ Dispatched {n} events"),
                    Err(e) => {
                        error!("📤️ Dispatcher poll failed: {e}");
                        tokio::time::sleep(self.config.poll_interval).await;
                    },
                }
            }
        })
    }
}

impl<B> EventDispatcher<B>
where B: StorefrontDatabase + Send + Sync + 'static
{
    pub fn new(db: B, producers: EventProducers, config: DispatcherConfig) -> Self {
        Self { db, producers, config }
    }

    /// Claims and processes one batch. Returns the number of events that finished (processed or parked).
    /// Exposed so tests and the sweep can drain the outbox deterministically.
    pub async fn run_once(&self) -> Result<usize, LedgerError> {
        let batch = self.db.claim_due_events(self.config.batch_size).await?;
        if batch.is_empty() {
            return Ok(0);
        }
        trace!("📤️ Claimed {} events", batch.len());

        // Stock work is collected across the whole batch and applied as one keyed bulk adjustment; everything
        // else is handled per event.
        let mut stock_groups: Vec<(String, Vec<StockAdjustment>)> = Vec::new();
        let mut awaiting_stock: Vec<&EventRecord> = Vec::new();
        let mut done: Vec<&EventRecord> = Vec::new();
        let mut failed: Vec<&EventRecord> = Vec::new();

        for record in &batch {
            match self.apply_consumers(record, &mut stock_groups).await {
                Ok(true) => awaiting_stock.push(record),
                Ok(false) => done.push(record),
                Err(e) => {
                    warn!("📤️ Event {} ({}) failed: {e}", record.id, record.event.type_name());
                    failed.push(record);
                },
            }
        }

        if !stock_groups.is_empty() {
            match self.db.adjust_stock_keyed(&stock_groups).await {
                Ok(applied) => {
                    trace!("📤️ {applied} of {} stock groups applied", stock_groups.len());
                    done.append(&mut awaiting_stock);
                },
                Err(e) => {
                    // Unapplied groups keep their events; redelivery re-offers them and the keys dedupe.
                    warn!("📤️ Bulk stock adjustment failed, rescheduling contributing events: {e}");
                    failed.append(&mut awaiting_stock);
                },
            }
        } else {
            done.append(&mut awaiting_stock);
        }

        let mut finished = 0;
        for record in done {
            self.db.mark_event_processed(record.id).await?;
            finished += 1;
        }
        for record in failed {
            let attempts = record.attempts + 1;
            if attempts >= self.config.max_attempts {
                error!(
                    "📤️ Event {} ({}) for order {} exhausted {attempts} attempts and is parked for manual review",
                    record.id,
                    record.event.type_name(),
                    record.event.order_id()
                );
                self.db.mark_event_processed(record.id).await?;
                finished += 1;
            } else {
                let delay = self.config.retry_backoff * (attempts as i32);
                self.db.reschedule_event(record.id, delay).await?;
            }
        }
        Ok(finished)
    }

    /// Runs the per-event consumers. Returns `true` when the event contributed stock work that is applied after
    /// the loop, `false` when the event is fully handled.
    async fn apply_consumers(
        &self,
        record: &EventRecord,
        stock_groups: &mut Vec<(String, Vec<StockAdjustment>)>,
    ) -> Result<bool, LedgerError> {
        let event = &record.event;
        match event {
            DomainEvent::OrderPlaced { order_id, buyer_id, line_items, .. }
            | DomainEvent::PaymentCompleted { order_id, buyer_id, line_items, .. } => {
                let stock_key = format!("stock:{}", order_id.as_str());
                stock_groups.push((stock_key, item_deltas(line_items, -1)));

                let cart_key = format!("cart_clear:{}", order_id.as_str());
                if self.db.clear_cart_once(buyer_id, &cart_key).await? {
                    debug!("📤️ Cart cleared for buyer {buyer_id} (order {order_id})");
                } else {
                    trace!("📤️ Cart for order {order_id} already cleared, skipping");
                }

                self.notify(&self.producers.order_placed_producer, event).await;
                Ok(true)
            },
            DomainEvent::PaymentFailed { .. } => {
                self.notify(&self.producers.payment_failed_producer, event).await;
                Ok(false)
            },
            DomainEvent::OrderStatusChanged { .. } => {
                self.notify(&self.producers.status_changed_producer, event).await;
                Ok(false)
            },
            DomainEvent::OrderCancelled { order_id, line_items, was_placed, .. } => {
                if *was_placed {
                    let restock_key = format!("restock:{}", order_id.as_str());
                    stock_groups.push((restock_key, item_deltas(line_items, 1)));
                }
                self.notify(&self.producers.status_changed_producer, event).await;
                Ok(*was_placed)
            },
        }
    }

    async fn notify(&self, producers: &[crate::events::EventProducer<DomainEvent>], event: &DomainEvent) {
        for producer in producers {
            producer.publish_event(event.clone()).await;
        }
    }
}

/// Sums the per-product deltas for a set of line items, signed by `direction` (-1 takes stock, +1 returns it).
fn item_deltas(line_items: &[crate::db_types::LineItem], direction: i64) -> Vec<StockAdjustment> {
    let mut deltas: BTreeMap<ProductId, i64> = BTreeMap::new();
    for item in line_items {
        *deltas.entry(item.product_id.clone()).or_insert(0) += direction * i64::from(item.quantity);
    }
    deltas.into_iter().map(|(product_id, delta)| StockAdjustment { product_id, delta }).collect()
}
