use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewProduct, Product, ProductId},
    traits::{LedgerError, StockAdjustment},
};

pub async fn insert_product(product: NewProduct, conn: &mut SqliteConnection) -> Result<Product, LedgerError> {
    let id = ProductId::random();
    let variants_json = serde_json::to_string(&product.variants)
        .map_err(|e| LedgerError::CorruptRecord(format!("variants for product {id}: {e}")))?;
    let product = sqlx::query_as(
        r#"
            INSERT INTO products (id, seller_id, name, description, list_price, offer_price, stock, category, variants)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(product.seller_id)
    .bind(product.name)
    .bind(product.description)
    .bind(product.list_price)
    .bind(product.offer_price)
    .bind(product.stock)
    .bind(product.category)
    .bind(variants_json)
    .fetch_one(conn)
    .await?;
    Ok(product)
}

pub async fn fetch_product(id: &ProductId, conn: &mut SqliteConnection) -> Result<Option<Product>, LedgerError> {
    let product =
        sqlx::query_as("SELECT * FROM products WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await?;
    Ok(product)
}

/// Fetches a set of products in one query. Ids that do not exist are simply absent from the result; callers decide
/// whether that is an error.
pub async fn fetch_products(ids: &[ProductId], conn: &mut SqliteConnection) -> Result<Vec<Product>, LedgerError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::new("SELECT * FROM products WHERE id IN (");
    let mut in_list = builder.separated(", ");
    for id in ids {
        in_list.push_bind(id.as_str());
    }
    builder.push(")");
    let products = builder.build_query_as::<Product>().fetch_all(conn).await?;
    Ok(products)
}

pub async fn fetch_catalog(conn: &mut SqliteConnection) -> Result<Vec<Product>, LedgerError> {
    let products = sqlx::query_as("SELECT * FROM products ORDER BY created_at DESC").fetch_all(conn).await?;
    Ok(products)
}

/// Applies stock deltas. Stock is clamped at zero: oversold inventory is a business problem to surface, not a
/// negative number to store.
pub async fn adjust_stock(deltas: &[StockAdjustment], conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    for adj in deltas {
        let updated = sqlx::query(
            "UPDATE products SET stock = MAX(stock + $1, 0), updated_at = CURRENT_TIMESTAMP WHERE id = $2",
        )
        .bind(adj.delta)
        .bind(adj.product_id.as_str())
        .execute(&mut *conn)
        .await?;
        if updated.rows_affected() == 0 {
            trace!("🏷️️ Stock adjustment for unknown product {} skipped", adj.product_id);
        }
    }
    Ok(())
}
