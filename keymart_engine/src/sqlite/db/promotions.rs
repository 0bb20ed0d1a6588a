use km_common::Money;
use log::debug;
use sqlx::SqliteConnection;

use crate::db_types::Promotion;

/// Creates or replaces a promotion. The code is stored upper-cased so lookups can be case-insensitive.
pub async fn upsert_promotion(promotion: Promotion, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    let code = promotion.code.to_uppercase();
    sqlx::query(
        r#"
            INSERT INTO promotions (
                code, kind, value, min_purchase, max_discount, usage_limit, usage_per_user,
                starts_at, ends_at, is_active, times_used
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (code) DO UPDATE SET
                kind = excluded.kind,
                value = excluded.value,
                min_purchase = excluded.min_purchase,
                max_discount = excluded.max_discount,
                usage_limit = excluded.usage_limit,
                usage_per_user = excluded.usage_per_user,
                starts_at = excluded.starts_at,
                ends_at = excluded.ends_at,
                is_active = excluded.is_active;
        "#,
    )
    .bind(&code)
    .bind(promotion.kind)
    .bind(promotion.value)
    .bind(promotion.min_purchase)
    .bind(promotion.max_discount)
    .bind(promotion.usage_limit)
    .bind(promotion.usage_per_user)
    .bind(promotion.starts_at)
    .bind(promotion.ends_at)
    .bind(promotion.is_active)
    .bind(promotion.times_used)
    .execute(conn)
    .await?;
    debug!("🏷️ Promotion [{code}] upserted");
    Ok(())
}

pub async fn fetch_promotion(code: &str, conn: &mut SqliteConnection) -> Result<Option<Promotion>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM promotions WHERE code = $1")
        .bind(code.to_uppercase())
        .fetch_optional(conn)
        .await
}

/// How many committed orders this customer has placed with this code.
pub async fn usage_count_for(code: &str, customer_id: &str, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM promotion_usage WHERE code = $1 AND customer_id = $2")
        .bind(code.to_uppercase())
        .bind(customer_id)
        .fetch_one(conn)
        .await
}

/// Appends a usage row and bumps the global counter. Runs on the caller's connection so it can share a transaction
/// with the order commit.
pub async fn record_usage(
    code: &str,
    customer_id: Option<&str>,
    order_id: i64,
    amount: Money,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    let code = code.to_uppercase();
    sqlx::query("INSERT INTO promotion_usage (code, customer_id, order_id, amount) VALUES ($1, $2, $3, $4)")
        .bind(&code)
        .bind(customer_id)
        .bind(order_id)
        .bind(amount)
        .execute(&mut *conn)
        .await?;
    sqlx::query("UPDATE promotions SET times_used = times_used + 1 WHERE code = $1")
        .bind(&code)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Returns the number of rows affected, so callers can tell a missing code from a deactivated one.
pub async fn deactivate_promotion(code: &str, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let res = sqlx::query("UPDATE promotions SET is_active = 0 WHERE code = $1")
        .bind(code.to_uppercase())
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}
