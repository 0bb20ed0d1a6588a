use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{Cart, CartItem, CartOwner, MAX_ITEM_QUANTITY},
    traits::CartError,
};

#[derive(Debug, Clone, FromRow)]
struct CartRow {
    id: i64,
    user_id: Option<String>,
    session_id: Option<String>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CartRow {
    fn into_cart(self, items: Vec<CartItem>) -> Cart {
        let owner = match (self.user_id, self.session_id) {
            (Some(user), _) => CartOwner::User(user),
            (None, Some(session)) => CartOwner::Session(session),
            // The schema CHECK constraint makes this unreachable, but don't panic on a hand-edited row.
            (None, None) => CartOwner::Session(String::new()),
        };
        Cart {
            id: self.id,
            owner,
            items,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// The column a given owner keys on. Static strings only; never interpolate user input into SQL.
fn owner_column(owner: &CartOwner) -> (&'static str, &str) {
    match owner {
        CartOwner::User(id) => ("user_id", id.as_str()),
        CartOwner::Session(token) => ("session_id", token.as_str()),
    }
}

async fn fetch_row(
    owner: &CartOwner,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<CartRow>, CartError> {
    let (column, key) = owner_column(owner);
    let row = sqlx::query_as(&format!("SELECT * FROM carts WHERE {column} = $1 AND expires_at > $2"))
        .bind(key)
        .bind(now)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

async fn fetch_items(cart_id: i64, conn: &mut SqliteConnection) -> Result<Vec<CartItem>, CartError> {
    let items = sqlx::query_as("SELECT product_id, quantity FROM cart_items WHERE cart_id = $1 ORDER BY added_at")
        .bind(cart_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

pub async fn fetch_cart(
    owner: &CartOwner,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Cart>, CartError> {
    let row = match fetch_row(owner, now, conn).await? {
        Some(row) => row,
        None => return Ok(None),
    };
    let items = fetch_items(row.id, conn).await?;
    Ok(Some(row.into_cart(items)))
}

/// Carts are created lazily, on the first add.
pub async fn fetch_or_create_cart_id(
    owner: &CartOwner,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<i64, CartError> {
    if let Some(row) = fetch_row(owner, now, conn).await? {
        return Ok(row.id);
    }
    let (column, key) = owner_column(owner);
    let id = sqlx::query_scalar(&format!(
        "INSERT INTO carts ({column}, expires_at, created_at, updated_at) VALUES ($1, $2, $3, $3) RETURNING id"
    ))
    .bind(key)
    .bind(Cart::expiry_from(now))
    .bind(now)
    .fetch_one(conn)
    .await?;
    trace!("🛒️ Created cart #{id} for {owner}");
    Ok(id)
}

/// Add `quantity` to the product's line, capped at [`MAX_ITEM_QUANTITY`]. The insert and the cap are one
/// statement, so two tabs adding the same product concurrently still land under the cap.
pub async fn add_item_capped(
    cart_id: i64,
    product_id: &str,
    quantity: u32,
    conn: &mut SqliteConnection,
) -> Result<(), CartError> {
    if quantity == 0 || quantity > MAX_ITEM_QUANTITY {
        return Err(CartError::QuantityOutOfRange { max: MAX_ITEM_QUANTITY });
    }
    sqlx::query(
        r#"
        INSERT INTO cart_items (cart_id, product_id, quantity) VALUES ($1, $2, $3)
        ON CONFLICT (cart_id, product_id)
        DO UPDATE SET quantity = MIN($4, cart_items.quantity + excluded.quantity)
        "#,
    )
    .bind(cart_id)
    .bind(product_id)
    .bind(i64::from(quantity))
    .bind(i64::from(MAX_ITEM_QUANTITY))
    .execute(conn)
    .await?;
    Ok(())
}

/// Set a line's exact quantity. Zero removes the line.
pub async fn set_quantity(
    cart_id: i64,
    product_id: &str,
    quantity: u32,
    conn: &mut SqliteConnection,
) -> Result<(), CartError> {
    if quantity == 0 {
        return remove_item(cart_id, product_id, conn).await;
    }
    if quantity > MAX_ITEM_QUANTITY {
        return Err(CartError::QuantityOutOfRange { max: MAX_ITEM_QUANTITY });
    }
    sqlx::query(
        r#"
        INSERT INTO cart_items (cart_id, product_id, quantity) VALUES ($1, $2, $3)
        ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = excluded.quantity
        "#,
    )
    .bind(cart_id)
    .bind(product_id)
    .bind(i64::from(quantity))
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn remove_item(cart_id: i64, product_id: &str, conn: &mut SqliteConnection) -> Result<(), CartError> {
    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
        .bind(cart_id)
        .bind(product_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn clear_items(cart_id: i64, conn: &mut SqliteConnection) -> Result<(), CartError> {
    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1").bind(cart_id).execute(conn).await?;
    Ok(())
}

/// Refresh `updated_at` and push the expiry window out from `now`.
pub async fn touch(cart_id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), CartError> {
    sqlx::query("UPDATE carts SET updated_at = $1, expires_at = $2 WHERE id = $3")
        .bind(now)
        .bind(Cart::expiry_from(now))
        .bind(cart_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn delete_cart_by_id(cart_id: i64, conn: &mut SqliteConnection) -> Result<(), CartError> {
    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1").bind(cart_id).execute(&mut *conn).await?;
    sqlx::query("DELETE FROM carts WHERE id = $1").bind(cart_id).execute(conn).await?;
    Ok(())
}

pub async fn delete_cart(owner: &CartOwner, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), CartError> {
    if let Some(row) = fetch_row(owner, now, conn).await? {
        delete_cart_by_id(row.id, conn).await?;
    }
    Ok(())
}

pub async fn purge_expired(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<u32, CartError> {
    sqlx::query("DELETE FROM cart_items WHERE cart_id IN (SELECT id FROM carts WHERE expires_at <= $1)")
        .bind(now)
        .execute(&mut *conn)
        .await?;
    let purged = sqlx::query("DELETE FROM carts WHERE expires_at <= $1").bind(now).execute(conn).await?.rows_affected();
    #[allow(clippy::cast_possible_truncation)]
    Ok(purged as u32)
}
