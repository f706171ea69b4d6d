use sqlx::SqliteConnection;

use crate::{
    db_types::{Address, NewAddress},
    traits::LedgerError,
};

pub async fn insert_address(
    user_id: &str,
    address: NewAddress,
    conn: &mut SqliteConnection,
) -> Result<Address, LedgerError> {
    let id = format!("adr-{:016x}", rand::random::<u64>());
    let address = sqlx::query_as(
        r#"
            INSERT INTO addresses (id, user_id, full_name, phone, postal_code, area, city, region)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(address.full_name)
    .bind(address.phone)
    .bind(address.postal_code)
    .bind(address.area)
    .bind(address.city)
    .bind(address.region)
    .fetch_one(conn)
    .await?;
    Ok(address)
}

pub async fn fetch_address(id: &str, conn: &mut SqliteConnection) -> Result<Option<Address>, LedgerError> {
    let address = sqlx::query_as("SELECT * FROM addresses WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(address)
}

pub async fn fetch_addresses_for_user(
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<Address>, LedgerError> {
    let addresses = sqlx::query_as("SELECT * FROM addresses WHERE user_id = $1 ORDER BY created_at DESC")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(addresses)
}
