use log::trace;
use sqlx::SqliteConnection;

use crate::{db_types::CartItems, traits::LedgerError};

/// The buyer's cart document. A user row is created lazily on the first cart write, so a buyer who has never
/// saved a cart simply gets an empty one back.
pub async fn fetch_cart(user_id: &str, conn: &mut SqliteConnection) -> Result<CartItems, LedgerError> {
    let stored: Option<(String,)> =
        sqlx::query_as("SELECT cart_items FROM users WHERE user_id = $1").bind(user_id).fetch_optional(conn).await?;
    match stored {
        None => Ok(CartItems::new()),
        Some((json,)) => {
            serde_json::from_str(&json).map_err(|e| LedgerError::CorruptRecord(format!("cart for {user_id}: {e}")))
        },
    }
}

pub async fn put_cart(user_id: &str, items: &CartItems, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let json =
        serde_json::to_string(items).map_err(|e| LedgerError::CorruptRecord(format!("cart for {user_id}: {e}")))?;
    sqlx::query(
        r#"
            INSERT INTO users (user_id, cart_items) VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET cart_items = excluded.cart_items, updated_at = CURRENT_TIMESTAMP;
        "#,
    )
    .bind(user_id)
    .bind(json)
    .execute(conn)
    .await?;
    Ok(())
}

/// Empties the cart. A missing user row means there is nothing to clear.
pub async fn clear_cart(user_id: &str, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let result =
        sqlx::query("UPDATE users SET cart_items = '{}', updated_at = CURRENT_TIMESTAMP WHERE user_id = $1")
            .bind(user_id)
            .execute(conn)
            .await?;
    trace!("🛒️ Cart clear for {user_id}: {} row(s)", result.rows_affected());
    Ok(())
}
