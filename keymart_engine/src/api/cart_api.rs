use std::fmt::Debug;

use chrono::{DateTime, Utc};

use crate::{
    api::errors::CartApiError,
    db_types::{Cart, CartOwner, InventoryMode, ProductSnapshot},
    traits::{CartManagement, Catalog},
};

/// `CartApi` layers catalog pre-checks over the raw cart store: a product must be purchasable and, for finite
/// pools, have enough stock to cover the line being built. The checks are advisory (the atomic claim at checkout
/// is the real guarantee) but they catch the common case early.
pub struct CartApi<B, C> {
    db: B,
    catalog: C,
}

impl<B, C> Debug for CartApi<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CartApi")
    }
}

impl<B, C> CartApi<B, C> {
    pub fn new(db: B, catalog: C) -> Self {
        Self { db, catalog }
    }
}

impl<B, C> CartApi<B, C>
where
    B: CartManagement,
    C: Catalog,
{
    pub async fn fetch_cart(&self, owner: &CartOwner) -> Result<Option<Cart>, CartApiError> {
        Ok(self.db.fetch_cart(owner).await?)
    }

    /// Add `quantity` of a product, creating the cart lazily. The stock check covers the quantity already in the
    /// cart plus the addition.
    pub async fn add_item(&self, owner: &CartOwner, product_id: &str, quantity: u32) -> Result<Cart, CartApiError> {
        let snapshot = self.checked_snapshot(product_id).await?;
        let in_cart = match self.db.fetch_cart(owner).await? {
            Some(cart) => {
                cart.items.iter().find(|i| i.product_id == product_id).map(|i| i.quantity).unwrap_or(0)
            },
            None => 0,
        };
        self.check_stock(&snapshot, in_cart + quantity)?;
        Ok(self.db.add_item(owner, product_id, quantity).await?)
    }

    /// Set a line's exact quantity. Zero removes the line and skips the catalog checks.
    pub async fn update_quantity(
        &self,
        owner: &CartOwner,
        product_id: &str,
        quantity: u32,
    ) -> Result<Cart, CartApiError> {
        if quantity > 0 {
            let snapshot = self.checked_snapshot(product_id).await?;
            self.check_stock(&snapshot, quantity)?;
        }
        Ok(self.db.update_quantity(owner, product_id, quantity).await?)
    }

    pub async fn remove_item(&self, owner: &CartOwner, product_id: &str) -> Result<Cart, CartApiError> {
        Ok(self.db.remove_item(owner, product_id).await?)
    }

    pub async fn clear_cart(&self, owner: &CartOwner) -> Result<(), CartApiError> {
        Ok(self.db.clear_cart(owner).await?)
    }

    pub async fn delete_cart(&self, owner: &CartOwner) -> Result<(), CartApiError> {
        Ok(self.db.delete_cart(owner).await?)
    }

    /// Fold the anonymous session cart into the user's cart at login.
    pub async fn merge_carts(&self, session_token: &str, user_id: &str) -> Result<Cart, CartApiError> {
        Ok(self.db.merge_carts(session_token, user_id).await?)
    }

    pub async fn purge_expired_carts(&self, now: DateTime<Utc>) -> Result<u32, CartApiError> {
        Ok(self.db.purge_expired_carts(now).await?)
    }

    async fn checked_snapshot(&self, product_id: &str) -> Result<ProductSnapshot, CartApiError> {
        let snapshot = self
            .catalog
            .product_snapshot(product_id)
            .await?
            .ok_or_else(|| CartApiError::ProductUnavailable(product_id.to_string()))?;
        if !snapshot.is_purchasable() {
            return Err(CartApiError::ProductUnavailable(product_id.to_string()));
        }
        Ok(snapshot)
    }

    fn check_stock(&self, snapshot: &ProductSnapshot, wanted: u32) -> Result<(), CartApiError> {
        if snapshot.mode == InventoryMode::Limited && snapshot.available < i64::from(wanted) {
            return Err(CartApiError::InsufficientStock {
                product_id: snapshot.product_id.clone(),
                requested: wanted,
                available: snapshot.available,
            });
        }
        Ok(())
    }
}
