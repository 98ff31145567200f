use sqlx::{FromRow, SqliteConnection};

use crate::db_types::CartLine;

#[derive(FromRow)]
struct CartItemRow {
    product_id: i64,
    variant: String,
    quantity: i64,
}

impl From<CartItemRow> for CartLine {
    fn from(row: CartItemRow) -> Self {
        let variant = if row.variant.is_empty() { None } else { Some(row.variant) };
        CartLine { product_id: row.product_id, variant, quantity: row.quantity }
    }
}

async fn fetch_or_create_cart(user_id: &str, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let id: i64 = sqlx::query_scalar(
        r#"
            INSERT INTO carts (user_id) VALUES ($1)
            ON CONFLICT (user_id) DO UPDATE SET updated_at = CURRENT_TIMESTAMP
            RETURNING id;
        "#,
    )
    .bind(user_id)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn fetch_cart(user_id: &str, conn: &mut SqliteConnection) -> Result<Vec<CartLine>, sqlx::Error> {
    let rows: Vec<CartItemRow> = sqlx::query_as(
        r#"
            SELECT ci.product_id, ci.variant, ci.quantity
            FROM cart_items ci JOIN carts c ON ci.cart_id = c.id
            WHERE c.user_id = $1
            ORDER BY ci.id
        "#,
    )
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(CartLine::from).collect())
}

pub async fn upsert_line(user_id: &str, line: CartLine, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    let cart_id = fetch_or_create_cart(user_id, conn).await?;
    sqlx::query(
        r#"
            INSERT INTO cart_items (cart_id, product_id, variant, quantity) VALUES ($1, $2, $3, $4)
            ON CONFLICT (cart_id, product_id, variant)
            DO UPDATE SET quantity = excluded.quantity, updated_at = CURRENT_TIMESTAMP;
        "#,
    )
    .bind(cart_id)
    .bind(line.product_id)
    .bind(line.variant.unwrap_or_default())
    .bind(line.quantity)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn remove_line(
    user_id: &str,
    product_id: i64,
    variant: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            DELETE FROM cart_items
            WHERE product_id = $1 AND variant = $2 AND cart_id = (SELECT id FROM carts WHERE user_id = $3)
        "#,
    )
    .bind(product_id)
    .bind(variant.unwrap_or_default())
    .bind(user_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn clear_cart(user_id: &str, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM cart_items WHERE cart_id IN (SELECT id FROM carts WHERE user_id = $1)")
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}
