use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{
        CouponSnapshot,
        Money,
        NewOrder,
        Order,
        OrderItem,
        OrderStatusType,
        PaymentInfo,
        SettlementProgress,
        ShippingInfo,
    },
    traits::StoreError,
};

#[derive(Debug, FromRow)]
struct OrderRow {
    id: i64,
    user_id: String,
    external_payment_id: String,
    external_order_id: String,
    payment_status: String,
    payment_method: String,
    shipping_info: String,
    items_price: Money,
    discount_amount: Money,
    shipping_amount: Money,
    tax_amount: Money,
    total_amount: Money,
    processor_total: Option<Money>,
    coupon_snapshot: Option<String>,
    order_status: String,
    stock_applied: bool,
    cart_cleared: bool,
    coupon_finalized: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct OrderItemRow {
    product_id: Option<i64>,
    name: String,
    unit_price: Money,
    quantity: i64,
    line_total: Money,
    is_gift: bool,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            product_id: row.product_id,
            name: row.name,
            unit_price: row.unit_price,
            quantity: row.quantity,
            line_total: row.line_total,
            is_gift: row.is_gift,
        }
    }
}

fn into_order(row: OrderRow, items: Vec<OrderItem>) -> Result<Order, StoreError> {
    let shipping_info: ShippingInfo = serde_json::from_str(&row.shipping_info)?;
    let coupon: Option<CouponSnapshot> = row.coupon_snapshot.as_deref().map(serde_json::from_str).transpose()?;
    let order_status = row.order_status.parse::<OrderStatusType>().map_err(|e| StoreError::InvalidData(e.to_string()))?;
    Ok(Order {
        id: row.id,
        user_id: row.user_id,
        shipping_info,
        items,
        items_price: row.items_price,
        discount_amount: row.discount_amount,
        shipping_amount: row.shipping_amount,
        tax_amount: row.tax_amount,
        total_amount: row.total_amount,
        processor_total: row.processor_total,
        payment_method: row.payment_method,
        payment_info: PaymentInfo { external_payment_id: row.external_payment_id, status: row.payment_status },
        external_order_id: row.external_order_id,
        coupon,
        order_status,
        settlement: SettlementProgress {
            stock_applied: row.stock_applied,
            cart_cleared: row.cart_cleared,
            coupon_finalized: row.coupon_finalized,
        },
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

async fn fetch_items(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    let rows: Vec<OrderItemRow> = sqlx::query_as(
        "SELECT product_id, name, unit_price, quantity, line_total, is_gift FROM order_items WHERE order_id = $1 \
         ORDER BY position",
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(OrderItem::from).collect())
}

async fn hydrate(row: Option<OrderRow>, conn: &mut SqliteConnection) -> Result<Option<Order>, StoreError> {
    match row {
        Some(row) => {
            let items = fetch_items(row.id, conn).await?;
            into_order(row, items).map(Some)
        },
        None => Ok(None),
    }
}

pub async fn fetch_order_by_id(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, StoreError> {
    let row = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(order_id).fetch_optional(&mut *conn).await?;
    hydrate(row, conn).await
}

pub async fn fetch_order_by_payment_id(
    external_payment_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, StoreError> {
    let row = sqlx::query_as("SELECT * FROM orders WHERE external_payment_id = $1")
        .bind(external_payment_id)
        .fetch_optional(&mut *conn)
        .await?;
    hydrate(row, conn).await
}

pub async fn fetch_orders_for_user(user_id: &str, conn: &mut SqliteConnection) -> Result<Vec<Order>, StoreError> {
    let rows: Vec<OrderRow> = sqlx::query_as("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC")
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;
    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        let items = fetch_items(row.id, conn).await?;
        orders.push(into_order(row, items)?);
    }
    Ok(orders)
}

/// Inserts the order and its items. Returns `None` if an order for the same external payment id already exists.
///
/// The unique constraint on `external_payment_id` makes this safe under concurrent deliveries: only one insert can
/// win. This is not atomic with respect to the items or the coupon claim, so call it inside a transaction. The
/// coupon is marked as finalized on insert, since the caller claims it in that same transaction.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Option<Order>, StoreError> {
    let shipping_info = serde_json::to_string(&order.shipping_info)?;
    let coupon_snapshot = order.coupon.as_ref().map(serde_json::to_string).transpose()?;
    let row: Option<OrderRow> = sqlx::query_as(
        r#"
            INSERT INTO orders (
                user_id,
                external_payment_id,
                external_order_id,
                payment_status,
                shipping_info,
                items_price,
                discount_amount,
                shipping_amount,
                tax_amount,
                total_amount,
                processor_total,
                coupon_snapshot,
                coupon_finalized
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 1)
            ON CONFLICT (external_payment_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(&order.user_id)
    .bind(&order.payment_info.external_payment_id)
    .bind(&order.external_order_id)
    .bind(&order.payment_info.status)
    .bind(shipping_info)
    .bind(order.items_price)
    .bind(order.discount_amount)
    .bind(order.shipping_amount)
    .bind(order.tax_amount)
    .bind(order.total_amount)
    .bind(order.processor_total)
    .bind(coupon_snapshot)
    .fetch_optional(&mut *conn)
    .await?;
    let Some(row) = row else {
        debug!("🗃️ An order for payment {} already exists", order.payment_info.external_payment_id);
        return Ok(None);
    };
    for (position, item) in order.items.iter().enumerate() {
        sqlx::query(
            r#"
                INSERT INTO order_items (order_id, position, product_id, name, unit_price, quantity, line_total, is_gift)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(row.id)
        .bind(position as i64)
        .bind(item.product_id)
        .bind(&item.name)
        .bind(item.unit_price)
        .bind(item.quantity)
        .bind(item.line_total)
        .bind(item.is_gift)
        .execute(&mut *conn)
        .await?;
    }
    trace!("🗃️ Order #{} saved with {} items", row.id, order.items.len());
    into_order(row, order.items).map(Some)
}

/// The settlement progress flags on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementFlag {
    StockApplied,
    CartCleared,
}

impl SettlementFlag {
    fn column(&self) -> &'static str {
        match self {
            SettlementFlag::StockApplied => "stock_applied",
            SettlementFlag::CartCleared => "cart_cleared",
        }
    }
}

/// Sets the flag if it is not set yet. Returns true if this call set it, which grants the caller the right to apply
/// the guarded side effect in the same transaction.
///
/// This is a write, so issuing it first in a transaction takes SQLite's write lock before anything is read.
pub async fn claim_settlement_step(
    order_id: i64,
    flag: SettlementFlag,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let column = flag.column();
    let sql = format!("UPDATE orders SET {column} = 1, updated_at = CURRENT_TIMESTAMP WHERE id = $1 AND {column} = 0");
    let result = sqlx::query(&sql).bind(order_id).execute(conn).await?;
    Ok(result.rows_affected() == 1)
}
