use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{Cart, CartOwner};

#[derive(Debug, Clone, Error)]
pub enum CartError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Quantity must be between 1 and {max}")]
    QuantityOutOfRange { max: u32 },
    #[error("No cart exists for {0}")]
    UnknownCart(String),
}

impl From<sqlx::Error> for CartError {
    fn from(e: sqlx::Error) -> Self {
        CartError::DatabaseError(e.to_string())
    }
}

/// The cart store. Carts are keyed by exactly one of user id or session token; operations on two different carts
/// never contend, while operations on the *same* cart serialize through a read-modify-write transaction in the
/// backend.
#[allow(async_fn_in_trait)]
pub trait CartManagement {
    /// Fetch the owner's cart, if one exists. Expired carts are reported as absent.
    async fn fetch_cart(&self, owner: &CartOwner) -> Result<Option<Cart>, CartError>;

    /// Add `quantity` of a product to the owner's cart, creating the cart lazily on first add. An existing line for
    /// the product has the quantity summed, capped at [`crate::db_types::MAX_ITEM_QUANTITY`]. Returns the updated
    /// cart.
    async fn add_item(&self, owner: &CartOwner, product_id: &str, quantity: u32) -> Result<Cart, CartError>;

    /// Set the exact quantity for a product line. A quantity of 0 removes the line.
    async fn update_quantity(&self, owner: &CartOwner, product_id: &str, quantity: u32) -> Result<Cart, CartError>;

    /// Remove the product's line from the cart entirely.
    async fn remove_item(&self, owner: &CartOwner, product_id: &str) -> Result<Cart, CartError>;

    /// Remove every item but keep the cart record.
    async fn clear_cart(&self, owner: &CartOwner) -> Result<(), CartError>;

    /// Destroy the cart record. Used after successful checkout. Idempotent.
    async fn delete_cart(&self, owner: &CartOwner) -> Result<(), CartError>;

    /// Merge the anonymous session cart into the user's cart: quantities for shared products are summed (capped at
    /// 10), other lines move over, and the session cart is deleted only once the user cart write has succeeded —
    /// all inside a single transaction on the user's cart. Idempotent: an absent or empty session cart is a no-op.
    /// Returns the user's cart after the merge.
    async fn merge_carts(&self, session_token: &str, user_id: &str) -> Result<Cart, CartError>;

    /// Delete carts whose TTL has lapsed. Returns the number of carts removed.
    async fn purge_expired_carts(&self, now: DateTime<Utc>) -> Result<u32, CartError>;
}
