//! `SqliteDatabase` is a concrete implementation of a marketplace fulfilment backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module. Every multi-step write opens one transaction on the pool, so a failure in any step leaves all the
//! ledgers untouched.
use std::fmt::Debug;

use chrono::Utc;
use log::*;
use sqlx::SqlitePool;

use super::db::{carts, db_url, inventory, new_pool, orders, promotions};
use crate::{
    api::order_objects::{OrderQueryFilter, OrderStats},
    db_types::{
        ActivationCode,
        Actor,
        Cart,
        CartOwner,
        DeliveredCode,
        InventoryMode,
        NewOrder,
        Order,
        OrderNumber,
        OrderStatus,
        PaymentStatus,
        Promotion,
        RefundStatus,
        TimelineEntry,
    },
    traits::{
        CartError,
        CartManagement,
        InventoryError,
        InventoryManagement,
        MarketplaceDatabase,
        OrderError,
        OrderManagement,
        PromotionError,
        PromotionManagement,
    },
};
use km_common::Money;

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, connecting to the URL in the `KM_DATABASE_URL` environment variable.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl CartManagement for SqliteDatabase {
    async fn fetch_cart(&self, owner: &CartOwner) -> Result<Option<Cart>, CartError> {
        let mut conn = self.pool.acquire().await?;
        carts::fetch_cart(owner, Utc::now(), &mut conn).await
    }

    async fn add_item(&self, owner: &CartOwner, product_id: &str, quantity: u32) -> Result<Cart, CartError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let cart_id = carts::fetch_or_create_cart_id(owner, now, &mut tx).await?;
        carts::add_item_capped(cart_id, product_id, quantity, &mut tx).await?;
        carts::touch(cart_id, now, &mut tx).await?;
        let cart = carts::fetch_cart(owner, now, &mut tx)
            .await?
            .ok_or_else(|| CartError::UnknownCart(owner.to_string()))?;
        tx.commit().await?;
        debug!("🛒️ {quantity} x {product_id} added to cart #{cart_id}");
        Ok(cart)
    }

    async fn update_quantity(&self, owner: &CartOwner, product_id: &str, quantity: u32) -> Result<Cart, CartError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let existing = carts::fetch_cart(owner, now, &mut tx)
            .await?
            .ok_or_else(|| CartError::UnknownCart(owner.to_string()))?;
        carts::set_quantity(existing.id, product_id, quantity, &mut tx).await?;
        carts::touch(existing.id, now, &mut tx).await?;
        let cart = carts::fetch_cart(owner, now, &mut tx)
            .await?
            .ok_or_else(|| CartError::UnknownCart(owner.to_string()))?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn remove_item(&self, owner: &CartOwner, product_id: &str) -> Result<Cart, CartError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let existing = carts::fetch_cart(owner, now, &mut tx)
            .await?
            .ok_or_else(|| CartError::UnknownCart(owner.to_string()))?;
        carts::remove_item(existing.id, product_id, &mut tx).await?;
        carts::touch(existing.id, now, &mut tx).await?;
        let cart = carts::fetch_cart(owner, now, &mut tx)
            .await?
            .ok_or_else(|| CartError::UnknownCart(owner.to_string()))?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn clear_cart(&self, owner: &CartOwner) -> Result<(), CartError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        if let Some(cart) = carts::fetch_cart(owner, now, &mut tx).await? {
            carts::clear_items(cart.id, &mut tx).await?;
            carts::touch(cart.id, now, &mut tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_cart(&self, owner: &CartOwner) -> Result<(), CartError> {
        let mut conn = self.pool.acquire().await?;
        carts::delete_cart(owner, Utc::now(), &mut conn).await
    }

    async fn merge_carts(&self, session_token: &str, user_id: &str) -> Result<Cart, CartError> {
        let now = Utc::now();
        let session_owner = CartOwner::Session(session_token.to_string());
        let user_owner = CartOwner::User(user_id.to_string());
        let mut tx = self.pool.begin().await?;
        let user_cart_id = carts::fetch_or_create_cart_id(&user_owner, now, &mut tx).await?;
        if let Some(session_cart) = carts::fetch_cart(&session_owner, now, &mut tx).await? {
            for item in &session_cart.items {
                carts::add_item_capped(user_cart_id, &item.product_id, item.quantity, &mut tx).await?;
            }
            carts::delete_cart_by_id(session_cart.id, &mut tx).await?;
            debug!(
                "🛒️ Merged {} line(s) from session cart #{} into user cart #{user_cart_id}",
                session_cart.items.len(),
                session_cart.id
            );
        }
        carts::touch(user_cart_id, now, &mut tx).await?;
        let cart = carts::fetch_cart(&user_owner, now, &mut tx)
            .await?
            .ok_or_else(|| CartError::UnknownCart(user_owner.to_string()))?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn purge_expired_carts(&self, now: chrono::DateTime<Utc>) -> Result<u32, CartError> {
        let mut tx = self.pool.begin().await?;
        let purged = carts::purge_expired(now, &mut tx).await?;
        tx.commit().await?;
        if purged > 0 {
            info!("🛒️ Purged {purged} expired cart(s)");
        }
        Ok(purged)
    }
}

impl InventoryManagement for SqliteDatabase {
    async fn register_pool(&self, product_id: &str, mode: InventoryMode) -> Result<(), InventoryError> {
        let mut conn = self.pool.acquire().await?;
        inventory::register_pool(product_id, mode, &mut conn).await
    }

    async fn pool_mode(&self, product_id: &str) -> Result<Option<InventoryMode>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        inventory::pool_mode(product_id, &mut conn).await
    }

    async fn add_codes(&self, product_id: &str, codes: &[String]) -> Result<u32, InventoryError> {
        let mut tx = self.pool.begin().await?;
        if inventory::pool_mode(product_id, &mut tx).await?.is_none() {
            return Err(InventoryError::UnknownPool(product_id.to_string()));
        }
        let added = inventory::add_codes(product_id, codes, &mut tx).await?;
        tx.commit().await?;
        debug!("🎟️ {added} code(s) added to the pool for {product_id}");
        Ok(added)
    }

    async fn available_count(&self, product_id: &str) -> Result<i64, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        if inventory::pool_mode(product_id, &mut conn).await?.is_none() {
            return Err(InventoryError::UnknownPool(product_id.to_string()));
        }
        inventory::available_count(product_id, &mut conn).await
    }

    async fn claim_codes(
        &self,
        product_id: &str,
        order_id: i64,
        count: u32,
    ) -> Result<Vec<ActivationCode>, InventoryError> {
        {
            let mut conn = self.pool.acquire().await?;
            if inventory::pool_mode(product_id, &mut conn).await?.is_none() {
                return Err(InventoryError::UnknownPool(product_id.to_string()));
            }
        }
        // The claim UPDATE is the transaction's first statement, so it takes the write lock up front and a failed
        // claim drops the transaction, rolling back the partial UPDATE.
        let mut tx = self.pool.begin().await?;
        let codes = inventory::claim_codes(product_id, order_id, count, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        debug!("🎟️ Claimed {count} code(s) on {product_id} for order #{order_id}");
        Ok(codes)
    }

    async fn release_codes(&self, order_id: i64, product_id: &str) -> Result<u32, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        let released = inventory::release_codes(order_id, product_id, &mut conn).await?;
        debug!("🎟️ Released {released} code(s) on {product_id} from order #{order_id}");
        Ok(released)
    }
}

impl OrderManagement for SqliteDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), OrderError> {
        let mut tx = self.pool.begin().await?;
        let (order, inserted) = orders::idempotent_insert(order, &mut tx).await?;
        tx.commit().await?;
        Ok((order, inserted))
    }

    async fn fetch_order_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>, OrderError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_number(order_number, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_orders_for_customer(&self, customer_id: &str) -> Result<Vec<Order>, OrderError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_orders_for_customer(customer_id, &mut conn).await?;
        Ok(orders)
    }

    async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, OrderError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(filter, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_timeline(&self, order_number: &OrderNumber) -> Result<Vec<TimelineEntry>, OrderError> {
        let mut conn = self.pool.acquire().await?;
        let order_id = orders::order_id_for_number(order_number, &mut conn)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_number.clone()))?;
        let timeline = orders::fetch_timeline(order_id, &mut conn).await?;
        Ok(timeline)
    }

    async fn update_status(
        &self,
        order_number: &OrderNumber,
        new_status: OrderStatus,
        note: Option<&str>,
        actor: &Actor,
    ) -> Result<Order, OrderError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_number(order_number, &mut tx)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_number.clone()))?;
        if !order.status.can_transition_to(new_status) {
            return Err(OrderError::InvalidStatusTransition { from: order.status, to: new_status });
        }
        orders::update_order_status(order.id, new_status, &mut tx).await?;
        orders::append_timeline(order.id, &new_status.to_string(), note, actor, &mut tx).await?;
        let order = orders::fetch_order_by_id(order.id, &mut tx)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_number.clone()))?;
        tx.commit().await?;
        info!("📦️ Order [{order_number}] moved to {new_status} by {actor}");
        Ok(order)
    }

    async fn confirm_order_payment(
        &self,
        order_number: &OrderNumber,
        transaction_id: &str,
    ) -> Result<Order, OrderError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_number(order_number, &mut tx)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_number.clone()))?;
        if order.payment.status == PaymentStatus::Completed {
            trace!("📦️ Payment for [{order_number}] is already completed. Ignoring.");
            return Ok(order);
        }
        let now = Utc::now();
        orders::set_payment_completed(order.id, transaction_id, now, &mut tx).await?;
        if order.status.can_transition_to(OrderStatus::Confirmed) {
            orders::update_order_status(order.id, OrderStatus::Confirmed, &mut tx).await?;
            orders::append_timeline(
                order.id,
                &OrderStatus::Confirmed.to_string(),
                Some("Payment completed"),
                &Actor::System,
                &mut tx,
            )
            .await?;
        }
        let order = orders::fetch_order_by_id(order.id, &mut tx)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_number.clone()))?;
        tx.commit().await?;
        info!("📦️ Payment for order [{order_number}] confirmed with transaction {transaction_id}");
        Ok(order)
    }

    async fn request_refund(
        &self,
        order_number: &OrderNumber,
        customer_id: Option<&str>,
        amount: Money,
        reason: &str,
    ) -> Result<Order, OrderError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_number(order_number, &mut tx)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_number.clone()))?;
        if let Some(cid) = customer_id {
            if order.customer_id.as_deref() != Some(cid) {
                return Err(OrderError::NotOrderOwner);
            }
        }
        if !order.can_be_refunded() {
            return Err(OrderError::RefundNotEligible);
        }
        if amount > order.total {
            return Err(OrderError::RefundAmountExceedsTotal { requested: amount, total: order.total });
        }
        let now = Utc::now();
        orders::set_refund_requested(order.id, amount, reason, now, &mut tx).await?;
        let actor = customer_id.map(|cid| Actor::Customer(cid.to_string())).unwrap_or(Actor::System);
        orders::append_timeline(order.id, "refund_requested", Some(reason), &actor, &mut tx).await?;
        let order = orders::fetch_order_by_id(order.id, &mut tx)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_number.clone()))?;
        tx.commit().await?;
        info!("📦️ Refund of {amount} requested on order [{order_number}]");
        Ok(order)
    }

    async fn decide_refund(
        &self,
        order_number: &OrderNumber,
        approve: bool,
        actor: &Actor,
    ) -> Result<Order, OrderError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_number(order_number, &mut tx)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_number.clone()))?;
        if order.refund.status != RefundStatus::Requested {
            return Err(OrderError::RefundNotEligible);
        }
        let now = Utc::now();
        let (status, label) = if approve {
            (RefundStatus::Approved, "refund_approved")
        } else {
            (RefundStatus::Denied, "refund_denied")
        };
        let processed_at = if approve { None } else { Some(now) };
        orders::set_refund_status(order.id, status, processed_at, &mut tx).await?;
        orders::append_timeline(order.id, label, None, actor, &mut tx).await?;
        let order = orders::fetch_order_by_id(order.id, &mut tx)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_number.clone()))?;
        tx.commit().await?;
        info!("📦️ Refund on order [{order_number}] {label} by {actor}");
        Ok(order)
    }

    async fn order_stats(&self, filter: OrderQueryFilter) -> Result<OrderStats, OrderError> {
        let mut conn = self.pool.acquire().await?;
        let stats = orders::order_stats(filter, &mut conn).await?;
        Ok(stats)
    }
}

impl PromotionManagement for SqliteDatabase {
    async fn upsert_promotion(&self, promotion: Promotion) -> Result<(), PromotionError> {
        let mut conn = self.pool.acquire().await?;
        promotions::upsert_promotion(promotion, &mut conn).await?;
        Ok(())
    }

    async fn fetch_promotion(&self, code: &str) -> Result<Option<Promotion>, PromotionError> {
        let mut conn = self.pool.acquire().await?;
        let promo = promotions::fetch_promotion(code, &mut conn).await?;
        Ok(promo)
    }

    async fn usage_count_for(&self, code: &str, customer_id: &str) -> Result<i64, PromotionError> {
        let mut conn = self.pool.acquire().await?;
        let count = promotions::usage_count_for(code, customer_id, &mut conn).await?;
        Ok(count)
    }

    async fn record_usage(
        &self,
        code: &str,
        customer_id: Option<&str>,
        order_id: i64,
        amount: Money,
    ) -> Result<(), PromotionError> {
        let mut tx = self.pool.begin().await?;
        if promotions::fetch_promotion(code, &mut tx).await?.is_none() {
            return Err(PromotionError::UnknownCode(code.to_string()));
        }
        promotions::record_usage(code, customer_id, order_id, amount, &mut tx).await?;
        tx.commit().await?;
        debug!("🏷️ Usage of promotion [{code}] recorded against order #{order_id}");
        Ok(())
    }

    async fn deactivate_promotion(&self, code: &str) -> Result<(), PromotionError> {
        let mut conn = self.pool.acquire().await?;
        let affected = promotions::deactivate_promotion(code, &mut conn).await?;
        if affected == 0 {
            return Err(PromotionError::UnknownCode(code.to_string()));
        }
        Ok(())
    }
}

impl MarketplaceDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn deliver_codes_for_item(
        &self,
        order_id: i64,
        order_item_id: i64,
        product_id: &str,
        quantity: u32,
    ) -> Result<Vec<DeliveredCode>, InventoryError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let claimed = inventory::claim_codes(product_id, order_id, quantity, now, &mut tx).await?;
        let codes = claimed.into_iter().map(|c| c.code).collect::<Vec<String>>();
        let delivered = orders::record_item_codes(order_item_id, &codes, now, &mut tx).await?;
        tx.commit().await?;
        debug!("🎟️ Delivered {quantity} code(s) of {product_id} to order item #{order_item_id}");
        Ok(delivered)
    }

    async fn complete_refund(&self, order_number: &OrderNumber, actor: &Actor) -> Result<Order, OrderError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_number(order_number, &mut tx)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_number.clone()))?;
        if order.status == OrderStatus::Refunded {
            trace!("📦️ Order [{order_number}] is already refunded. Ignoring.");
            return Ok(order);
        }
        match order.refund.status {
            RefundStatus::Requested | RefundStatus::Approved | RefundStatus::Processing => {},
            _ => return Err(OrderError::RefundNotEligible),
        }
        if !order.status.can_transition_to(OrderStatus::Refunded) {
            return Err(OrderError::InvalidStatusTransition { from: order.status, to: OrderStatus::Refunded });
        }
        let released = inventory::release_all_codes(order.id, &mut tx)
            .await
            .map_err(|e| OrderError::DatabaseError(e.to_string()))?;
        let now = Utc::now();
        orders::set_refund_status(order.id, RefundStatus::Completed, Some(now), &mut tx).await?;
        orders::set_payment_refunded(order.id, &mut tx).await?;
        orders::update_order_status(order.id, OrderStatus::Refunded, &mut tx).await?;
        orders::append_timeline(
            order.id,
            &OrderStatus::Refunded.to_string(),
            Some("Refund completed"),
            actor,
            &mut tx,
        )
        .await?;
        let order = orders::fetch_order_by_id(order.id, &mut tx)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_number.clone()))?;
        tx.commit().await?;
        info!("📦️ Refund on order [{order_number}] completed. {released} code(s) returned to the pool.");
        Ok(order)
    }
}
