use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{ActivationCode, InventoryMode},
    traits::InventoryError,
};

pub async fn register_pool(
    product_id: &str,
    mode: InventoryMode,
    conn: &mut SqliteConnection,
) -> Result<(), InventoryError> {
    sqlx::query(
        r#"
        INSERT INTO inventory_pools (product_id, mode) VALUES ($1, $2)
        ON CONFLICT (product_id) DO UPDATE SET mode = excluded.mode
        "#,
    )
    .bind(product_id)
    .bind(mode)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn pool_mode(
    product_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<InventoryMode>, InventoryError> {
    let mode = sqlx::query_scalar("SELECT mode FROM inventory_pools WHERE product_id = $1")
        .bind(product_id)
        .fetch_optional(conn)
        .await?;
    Ok(mode)
}

pub async fn add_codes(
    product_id: &str,
    codes: &[String],
    conn: &mut SqliteConnection,
) -> Result<u32, InventoryError> {
    let mut added = 0u32;
    for code in codes {
        let result = sqlx::query("INSERT INTO activation_codes (product_id, code) VALUES ($1, $2)")
            .bind(product_id)
            .bind(code)
            .execute(&mut *conn)
            .await;
        match result {
            Ok(_) => added += 1,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(InventoryError::DuplicateCode {
                    product_id: product_id.to_string(),
                    code: code.clone(),
                })
            },
            Err(e) => return Err(e.into()),
        }
    }
    Ok(added)
}

/// The available quantity is always derived from the unused-code rows; there is no separate counter to drift.
pub async fn available_count(product_id: &str, conn: &mut SqliteConnection) -> Result<i64, InventoryError> {
    let count =
        sqlx::query_scalar("SELECT COUNT(*) FROM activation_codes WHERE product_id = $1 AND is_used = 0")
            .bind(product_id)
            .fetch_one(conn)
            .await?;
    Ok(count)
}

/// Atomically claim `count` unused codes for an order.
///
/// The selection and the mark-used happen in one conditional UPDATE, so concurrent claims on the same product can
/// never be handed the same code: SQLite serializes the writes, and each UPDATE only touches rows that are still
/// unused when it runs. If fewer than `count` rows are affected the pool was short; the caller must be inside a
/// transaction and roll back, leaving nothing claimed.
pub async fn claim_codes(
    product_id: &str,
    order_id: i64,
    count: u32,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<ActivationCode>, InventoryError> {
    let claimed = sqlx::query(
        r#"
        UPDATE activation_codes SET is_used = 1, used_by_order = $1, used_at = $2
        WHERE id IN (
            SELECT id FROM activation_codes WHERE product_id = $3 AND is_used = 0 ORDER BY id LIMIT $4
        )
        "#,
    )
    .bind(order_id)
    .bind(now)
    .bind(product_id)
    .bind(i64::from(count))
    .execute(&mut *conn)
    .await?
    .rows_affected();
    if claimed != u64::from(count) {
        #[allow(clippy::cast_possible_wrap)]
        let available = claimed as i64;
        debug!("🎟️ Claim for {count} codes on {product_id} only found {claimed}. Rolling back.");
        return Err(InventoryError::InsufficientStock {
            product_id: product_id.to_string(),
            requested: count,
            available,
        });
    }
    let codes = sqlx::query_as(
        "SELECT * FROM activation_codes WHERE product_id = $1 AND used_by_order = $2 ORDER BY id",
    )
    .bind(product_id)
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    Ok(codes)
}

/// Return an order's codes for one product to the pool. Affecting zero rows is fine: release is idempotent.
pub async fn release_codes(
    order_id: i64,
    product_id: &str,
    conn: &mut SqliteConnection,
) -> Result<u32, InventoryError> {
    let released = sqlx::query(
        r#"
        UPDATE activation_codes SET is_used = 0, used_by_order = NULL, used_at = NULL
        WHERE used_by_order = $1 AND product_id = $2
        "#,
    )
    .bind(order_id)
    .bind(product_id)
    .execute(conn)
    .await?
    .rows_affected();
    #[allow(clippy::cast_possible_truncation)]
    Ok(released as u32)
}

/// Release every code the order holds, across all products. Used by refund completion.
pub async fn release_all_codes(order_id: i64, conn: &mut SqliteConnection) -> Result<u32, InventoryError> {
    let released = sqlx::query(
        "UPDATE activation_codes SET is_used = 0, used_by_order = NULL, used_at = NULL WHERE used_by_order = $1",
    )
    .bind(order_id)
    .execute(conn)
    .await?
    .rows_affected();
    #[allow(clippy::cast_possible_truncation)]
    Ok(released as u32)
}
