use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    events::{DomainEvent, EventRecord},
    traits::LedgerError,
};

#[derive(Debug, Clone, FromRow)]
struct OutboxRow {
    id: i64,
    payload: String,
    emitted_at: DateTime<Utc>,
    attempts: i64,
}

impl OutboxRow {
    fn into_record(self) -> Result<EventRecord, LedgerError> {
        let event: DomainEvent = serde_json::from_str(&self.payload)
            .map_err(|e| LedgerError::CorruptRecord(format!("outbox event {}: {e}", self.id)))?;
        Ok(EventRecord { id: self.id, event, emitted_at: self.emitted_at, attempts: self.attempts })
    }
}

/// Enqueues events. Callers pass the connection of the transaction that commits the producing transition, so an
/// event exists exactly when its transition does.
pub async fn enqueue(events: &[DomainEvent], conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    for event in events {
        let payload = serde_json::to_string(event)
            .map_err(|e| LedgerError::CorruptRecord(format!("event for order {}: {e}", event.order_id())))?;
        sqlx::query("INSERT INTO event_outbox (event_type, payload) VALUES ($1, $2)")
            .bind(event.type_name())
            .bind(payload)
            .execute(&mut *conn)
            .await?;
        trace!("📤️ Enqueued {} for order {}", event.type_name(), event.order_id());
    }
    Ok(())
}

/// The next unprocessed, due events in enqueue (id) order.
pub async fn claim_due(limit: usize, conn: &mut SqliteConnection) -> Result<Vec<EventRecord>, LedgerError> {
    let rows: Vec<OutboxRow> = sqlx::query_as(
        r#"
            SELECT id, payload, emitted_at, attempts FROM event_outbox
            WHERE processed_at IS NULL AND unixepoch(available_at) <= unixepoch(CURRENT_TIMESTAMP)
            ORDER BY id ASC
            LIMIT $1;
        "#,
    )
    .bind(limit as i64)
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(OutboxRow::into_record).collect()
}

pub async fn mark_processed(event_id: i64, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let result = sqlx::query("UPDATE event_outbox SET processed_at = CURRENT_TIMESTAMP WHERE id = $1")
        .bind(event_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::EventNotFound(event_id));
    }
    Ok(())
}

/// Bumps the attempt counter and pushes the next delivery into the future.
pub async fn reschedule(
    event_id: i64,
    delay: chrono::Duration,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    let result = sqlx::query(
        format!(
            "UPDATE event_outbox SET attempts = attempts + 1, available_at = datetime(CURRENT_TIMESTAMP, '+{} \
             seconds') WHERE id = $1",
            delay.num_seconds()
        )
        .as_str(),
    )
    .bind(event_id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::EventNotFound(event_id));
    }
    Ok(())
}
