use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, Order, OrderId},
    lifecycle::TransitionPlan,
    traits::LedgerError,
};

/// Inserts a new order. The order id is unique; a duplicate insert surfaces as
/// [`LedgerError::OrderAlreadyExists`] rather than silently overwriting.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, LedgerError> {
    let id = order.id.clone();
    let items_json = serde_json::to_string(&order.line_items)
        .map_err(|e| LedgerError::CorruptRecord(format!("line items for order {id}: {e}")))?;
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                id,
                buyer_id,
                line_items,
                amount,
                payment_method,
                payment_status,
                fulfillment_status,
                address_id
            ) VALUES ($1, $2, $3, $4, $5, 'Pending', $6, $7)
            RETURNING *;
        "#,
    )
    .bind(order.id)
    .bind(order.buyer_id)
    .bind(items_json)
    .bind(order.amount)
    .bind(order.payment_method.to_string())
    .bind(order.fulfillment_status.to_string())
    .bind(order.address_id)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => LedgerError::OrderAlreadyExists(id),
        _ => LedgerError::from(e),
    })?;
    debug!("📝️ Order {} stored in state {}", order.id, order.fulfillment_status);
    Ok(order)
}

pub async fn fetch_order(id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, LedgerError> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_orders_for_buyer(buyer_id: &str, conn: &mut SqliteConnection) -> Result<Vec<Order>, LedgerError> {
    let orders = sqlx::query_as("SELECT * FROM orders WHERE buyer_id = $1 ORDER BY created_at DESC, id DESC")
        .bind(buyer_id)
        .fetch_all(conn)
        .await?;
    Ok(orders)
}

/// The compare-and-swap that applies a transition plan.
///
/// The `WHERE` clause re-checks the fulfillment status the plan was made against, and — when the plan records a
/// payment reference — that no *different* reference is already stored. Zero rows updated means a concurrent
/// transition won; the caller re-reads and re-plans. This single statement is the entire mutual-exclusion story
/// for an order: no lock is held across any await point.
pub async fn conditional_update(
    id: &OrderId,
    plan: &TransitionPlan,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, LedgerError> {
    let new_payment_status = plan.new_payment_status.map(|s| s.to_string());
    let result: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders SET
                fulfillment_status = $1,
                payment_status = COALESCE($2, payment_status),
                payment_ref = COALESCE($3, payment_ref),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $4
              AND fulfillment_status = $5
              AND ($3 IS NULL OR payment_ref IS NULL OR payment_ref = $3)
            RETURNING *;
        "#,
    )
    .bind(plan.new_fulfillment.to_string())
    .bind(new_payment_status)
    .bind(plan.set_payment_ref.as_deref())
    .bind(id.as_str())
    .bind(plan.expect_fulfillment.to_string())
    .fetch_optional(conn)
    .await?;
    trace!(
        "📝️ Conditional update on {id} ({} → {}): {}",
        plan.expect_fulfillment,
        plan.new_fulfillment,
        if result.is_some() { "applied" } else { "lost the race" }
    );
    Ok(result)
}

/// Online orders sitting in `AwaitingPayment` with no update for longer than `stuck_after`.
pub async fn fetch_stuck_awaiting_payment(
    stuck_after: chrono::Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, LedgerError> {
    let rows = sqlx::query_as(
        format!(
            "SELECT * FROM orders WHERE fulfillment_status = 'AwaitingPayment' AND \
             (unixepoch(CURRENT_TIMESTAMP) - unixepoch(updated_at)) > {} ORDER BY updated_at ASC",
            stuck_after.num_seconds()
        )
        .as_str(),
    )
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
