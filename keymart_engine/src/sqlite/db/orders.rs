use chrono::{DateTime, Utc};
use km_common::Money;
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    api::order_objects::{OrderQueryFilter, OrderStats},
    db_types::{
        Actor,
        DeliveredCode,
        InventoryMode,
        NewOrder,
        Order,
        OrderItem,
        OrderNumber,
        OrderStatus,
        RefundStatus,
        TimelineEntry,
    },
    traits::OrderError,
};

/// Inserts the order, its items and the opening timeline entry. Not atomic on its own; callers wrap this in a
/// transaction and pass `&mut *tx` as the connection.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, OrderError> {
    let order_id: i64 = sqlx::query_scalar(
        r#"
            INSERT INTO orders (
                order_number,
                customer_id,
                subtotal,
                discount,
                tax,
                total,
                currency,
                payment_method,
                payment_status,
                transaction_id,
                paid_at,
                status,
                coupon_code,
                is_plus_member
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING id;
        "#,
    )
    .bind(order.order_number.as_str())
    .bind(&order.customer_id)
    .bind(order.subtotal)
    .bind(order.discount)
    .bind(order.tax)
    .bind(order.total)
    .bind(&order.currency)
    .bind(&order.payment_method)
    .bind(order.payment_status)
    .bind(&order.transaction_id)
    .bind(order.paid_at)
    .bind(order.status)
    .bind(&order.coupon_code)
    .bind(order.is_plus_member)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => OrderError::DuplicateOrderNumber,
        _ => OrderError::from(e),
    })?;
    for item in &order.items {
        // Only finite pools are fulfilled from the code ledger; unlimited and preorder
        // items commit without claiming anything.
        let code_gated = item.mode == InventoryMode::Limited;
        sqlx::query(
            r#"
                INSERT INTO order_items (order_id, product_id, title, quantity, price, final_price, code_gated)
                VALUES ($1, $2, $3, $4, $5, $6, $7);
            "#,
        )
        .bind(order_id)
        .bind(&item.product_id)
        .bind(&item.title)
        .bind(item.quantity)
        .bind(item.price)
        .bind(item.final_price)
        .bind(code_gated)
        .execute(&mut *conn)
        .await?;
    }
    append_timeline(order_id, &order.status.to_string(), Some("Order created"), &Actor::System, conn).await?;
    let order = fetch_order_by_id(order_id, conn)
        .await?
        .ok_or_else(|| OrderError::DatabaseError("Order vanished immediately after insert".to_string()))?;
    Ok(order)
}

/// Inserts the order, returning `false` in the second element if an order with the same number already exists.
/// The attempt-then-fetch shape keeps the insert as the first write of the caller's transaction.
pub async fn idempotent_insert(order: NewOrder, conn: &mut SqliteConnection) -> Result<(Order, bool), OrderError> {
    let order_number = order.order_number.clone();
    match insert_order(order, conn).await {
        Ok(order) => {
            debug!("📦️ Order [{}] inserted with id {}", order.order_number, order.id);
            Ok((order, true))
        },
        Err(OrderError::DuplicateOrderNumber) => {
            let existing = fetch_order_by_number(&order_number, conn)
                .await?
                .ok_or_else(|| OrderError::OrderNotFound(order_number))?;
            Ok((existing, false))
        },
        Err(e) => Err(e),
    }
}

pub async fn fetch_order_by_number(
    order_number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE order_number = $1")
        .bind(order_number.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    match order {
        Some(order) => Ok(Some(attach_items(order, conn).await?)),
        None => Ok(None),
    }
}

pub async fn fetch_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order: Option<Order> =
        sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(&mut *conn).await?;
    match order {
        Some(order) => Ok(Some(attach_items(order, conn).await?)),
        None => Ok(None),
    }
}

/// All orders for the customer, newest first, items included.
pub async fn fetch_orders_for_customer(
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders: Vec<Order> = sqlx::query_as("SELECT * FROM orders WHERE customer_id = $1 ORDER BY created_at DESC")
        .bind(customer_id)
        .fetch_all(&mut *conn)
        .await?;
    let mut result = Vec::with_capacity(orders.len());
    for order in orders {
        result.push(attach_items(order, conn).await?);
    }
    Ok(result)
}

/// Fetches orders according to the criteria in the `OrderQueryFilter`, ordered by `created_at` ascending.
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(cid) = query.customer_id {
        where_clause.push("customer_id = ");
        where_clause.push_bind_unseparated(cid);
    }
    if query.status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let statuses =
            query.status.as_ref().unwrap().iter().map(|s| format!("'{s}'")).collect::<Vec<String>>().join(",");
        where_clause.push(format!("status IN ({statuses})"));
    }
    if let Some(ps) = query.payment_status {
        where_clause.push("payment_status = ");
        where_clause.push_bind_unseparated(ps.to_string());
    }
    if let Some(rs) = query.refund_status {
        where_clause.push("refund_status = ");
        where_clause.push_bind_unseparated(rs.to_string());
    }
    if let Some(coupon) = query.coupon_code {
        where_clause.push("coupon_code = ");
        where_clause.push_bind_unseparated(coupon);
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    if query.undelivered_codes {
        where_clause.push(
            "payment_status = 'completed' AND EXISTS (SELECT 1 FROM order_items oi WHERE oi.order_id = orders.id \
             AND oi.code_gated = 1 AND oi.code_delivered = 0)",
        );
    }
    builder.push(" ORDER BY created_at ASC");
    trace!("📦️ Executing query: {}", builder.sql());
    let orders: Vec<Order> = builder.build_query_as::<Order>().fetch_all(&mut *conn).await?;
    let mut result = Vec::with_capacity(orders.len());
    for order in orders {
        result.push(attach_items(order, conn).await?);
    }
    trace!("📦️ search_orders matched {} order(s)", result.len());
    Ok(result)
}

async fn attach_items(mut order: Order, conn: &mut SqliteConnection) -> Result<Order, sqlx::Error> {
    let mut items: Vec<OrderItem> = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
        .bind(order.id)
        .fetch_all(&mut *conn)
        .await?;
    for item in &mut items {
        if item.code_delivered {
            item.codes = fetch_item_codes(item.id, conn).await?;
        }
    }
    order.items = items;
    Ok(order)
}

pub async fn fetch_item_codes(
    order_item_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<DeliveredCode>, sqlx::Error> {
    sqlx::query_as("SELECT code, delivered_at FROM order_item_codes WHERE order_item_id = $1 ORDER BY code")
        .bind(order_item_id)
        .fetch_all(conn)
        .await
}

/// Records a batch of delivered codes against the item and flips its `code_delivered` flag. Callers run this inside
/// the same transaction as the claim on the code pool.
pub async fn record_item_codes(
    order_item_id: i64,
    codes: &[String],
    delivered_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<DeliveredCode>, sqlx::Error> {
    for code in codes {
        sqlx::query("INSERT INTO order_item_codes (order_item_id, code, delivered_at) VALUES ($1, $2, $3)")
            .bind(order_item_id)
            .bind(code)
            .bind(delivered_at)
            .execute(&mut *conn)
            .await?;
    }
    sqlx::query("UPDATE order_items SET code_delivered = 1 WHERE id = $1")
        .bind(order_item_id)
        .execute(&mut *conn)
        .await?;
    Ok(codes.iter().map(|code| DeliveredCode { code: code.clone(), delivered_at }).collect())
}

pub async fn fetch_timeline(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<TimelineEntry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_timeline WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await
}

pub async fn append_timeline(
    order_id: i64,
    status: &str,
    note: Option<&str>,
    actor: &Actor,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO order_timeline (order_id, status, note, actor) VALUES ($1, $2, $3, $4)")
        .bind(order_id)
        .bind(status)
        .bind(note)
        .bind(actor.to_string())
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn update_order_status(
    order_id: i64,
    status: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(status)
        .bind(order_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_payment_completed(
    order_id: i64,
    transaction_id: &str,
    paid_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            UPDATE orders
            SET payment_status = 'completed',
                transaction_id = $1,
                paid_at = $2,
                payment_failure_reason = NULL,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $3;
        "#,
    )
    .bind(transaction_id)
    .bind(paid_at)
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn set_refund_requested(
    order_id: i64,
    amount: Money,
    reason: &str,
    requested_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            UPDATE orders
            SET refund_status = 'requested',
                refund_amount = $1,
                refund_reason = $2,
                refund_requested_at = $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $4;
        "#,
    )
    .bind(amount)
    .bind(reason)
    .bind(requested_at)
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn set_refund_status(
    order_id: i64,
    status: RefundStatus,
    processed_at: Option<DateTime<Utc>>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            UPDATE orders
            SET refund_status = $1,
                refund_processed_at = COALESCE($2, refund_processed_at),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $3;
        "#,
    )
    .bind(status)
    .bind(processed_at)
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Marks the payment refunded alongside a completed refund.
pub async fn set_payment_refunded(order_id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET payment_status = 'refunded', updated_at = CURRENT_TIMESTAMP WHERE id = $1")
        .bind(order_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Aggregate figures over the orders matching the filter. Revenue counts orders whose payment completed, using the
/// totals locked in at commit time.
pub async fn order_stats(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<OrderStats, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
        SELECT
            COUNT(*) AS total_orders,
            COALESCE(SUM(CASE WHEN payment_status = 'completed' THEN total ELSE 0 END), 0) AS total_revenue,
            COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0) AS pending_orders,
            COALESCE(SUM(CASE WHEN status = 'confirmed' THEN 1 ELSE 0 END), 0) AS confirmed_orders,
            COALESCE(SUM(CASE WHEN status = 'delivered' THEN 1 ELSE 0 END), 0) AS delivered_orders,
            COALESCE(SUM(CASE WHEN status = 'cancelled' THEN 1 ELSE 0 END), 0) AS cancelled_orders,
            COALESCE(SUM(CASE WHEN status = 'refunded' THEN 1 ELSE 0 END), 0) AS refunded_orders
        FROM orders
    "#,
    );
    let mut has_where = false;
    if let Some(cid) = query.customer_id {
        builder.push(" WHERE customer_id = ");
        builder.push_bind(cid);
        has_where = true;
    }
    if let Some(since) = query.since {
        builder.push(if has_where { " AND " } else { " WHERE " });
        builder.push("created_at >= ");
        builder.push_bind(since);
        has_where = true;
    }
    if let Some(until) = query.until {
        builder.push(if has_where { " AND " } else { " WHERE " });
        builder.push("created_at <= ");
        builder.push_bind(until);
    }
    let row: (i64, Money, i64, i64, i64, i64, i64) =
        builder.build_query_as().fetch_one(conn).await?;
    Ok(OrderStats {
        total_orders: row.0,
        total_revenue: row.1,
        pending_orders: row.2,
        confirmed_orders: row.3,
        delivered_orders: row.4,
        cancelled_orders: row.5,
        refunded_orders: row.6,
    })
}

/// Resolves an order number to its internal row id.
pub async fn order_id_for_number(
    order_number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT id FROM orders WHERE order_number = $1")
        .bind(order_number.as_str())
        .fetch_optional(conn)
        .await
}
