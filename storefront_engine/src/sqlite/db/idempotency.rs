use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{OperationRecord, OperationTicket},
    traits::LedgerError,
};

/// Claims an operation key.
///
/// The claim is the `INSERT` itself: the primary key constraint decides the winner atomically, so two concurrent
/// claims for the same key cannot both see [`OperationTicket::New`]. There is deliberately no read-before-write
/// here — a check-then-act sequence would race.
pub async fn begin_operation(op_key: &str, conn: &mut SqliteConnection) -> Result<OperationTicket, LedgerError> {
    let inserted = sqlx::query("INSERT INTO operations (op_key) VALUES ($1)").bind(op_key).execute(&mut *conn).await;
    match inserted {
        Ok(_) => {
            trace!("🎟️ Operation {op_key} claimed");
            Ok(OperationTicket::New)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            let record: OperationRecord =
                sqlx::query_as("SELECT * FROM operations WHERE op_key = $1").bind(op_key).fetch_one(conn).await?;
            trace!("🎟️ Operation {op_key} was claimed before (result recorded: {})", record.result.is_some());
            Ok(OperationTicket::Replayed { result: record.result })
        },
        Err(e) => Err(e.into()),
    }
}

/// In-transaction claim used by the side-effect consumers. Returns whether the caller should proceed: true for a
/// fresh claim, and for a key whose earlier attempt never recorded completion (the side effect may or may not have
/// landed; callers couple this claim, the side effect and [`complete_operation`] in one transaction precisely so
/// that question cannot arise).
pub async fn claim_for_processing(op_key: &str, conn: &mut SqliteConnection) -> Result<bool, LedgerError> {
    let inserted = sqlx::query("INSERT INTO operations (op_key) VALUES ($1) ON CONFLICT (op_key) DO NOTHING")
        .bind(op_key)
        .execute(&mut *conn)
        .await?;
    if inserted.rows_affected() == 1 {
        trace!("🎟️ Operation {op_key} claimed");
        return Ok(true);
    }
    let record: OperationRecord =
        sqlx::query_as("SELECT * FROM operations WHERE op_key = $1").bind(op_key).fetch_one(conn).await?;
    Ok(record.result.is_none())
}

/// Records the outcome of a claimed operation. Records are kept indefinitely, since provider retries can arrive
/// hours apart.
pub async fn complete_operation(op_key: &str, result: &str, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    sqlx::query("UPDATE operations SET result = $1 WHERE op_key = $2")
        .bind(result)
        .bind(op_key)
        .execute(conn)
        .await?;
    Ok(())
}
