use chrono::Duration;
use log::*;
use storefront_engine::{db_types::Order, OrderFlowApi, SqliteDatabase};
use tokio::task::JoinHandle;

use crate::integrations::HostedCheckoutClient;

/// Starts the reconciliation sweep worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every `interval_secs` the worker asks the provider what happened to orders stuck in `AwaitingPayment` beyond
/// the threshold — orders whose webhook was lost, or whose checkout timed out before the provider answered. Only
/// provider-verified outcomes move orders; anything the provider has not settled stays exactly where it is.
pub fn start_sweep_worker(
    db: SqliteDatabase,
    provider: HostedCheckoutClient,
    interval_secs: u64,
    stuck_after: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        let api = OrderFlowApi::new(db);
        info!("🕰️ Stuck-order reconciliation sweep started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running reconciliation sweep");
            match api.sweep_stuck_orders(stuck_after, &provider).await {
                Ok(result) => {
                    if result.resolved_count() > 0 {
                        info!(
                            "🕰️ Sweep resolved {} orders ({} settled, {} failed), {} still pending",
                            result.resolved_count(),
                            result.settled.len(),
                            result.failed.len(),
                            result.still_pending
                        );
                        debug!("🕰️ Settled: {}", order_list(&result.settled));
                        debug!("🕰️ Failed: {}", order_list(&result.failed));
                    }
                },
                Err(e) => {
                    error!("🕰️ Error running reconciliation sweep: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("{} buyer: {} amount: {}", o.id, o.buyer_id, o.amount))
        .collect::<Vec<String>>()
        .join(", ")
}
