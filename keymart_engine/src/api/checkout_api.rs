use std::fmt::Debug;

use chrono::Utc;
use log::*;
use tokio::time::timeout;

use crate::{
    api::{
        checkout_objects::{CheckoutConfig, CheckoutRequest, CheckoutSummary},
        errors::CheckoutError,
    },
    db_types::{
        InventoryMode,
        NewOrder,
        NewOrderItem,
        Order,
        OrderNumber,
        OrderStatus,
        PaymentMethod,
        PaymentStatus,
        ProductSnapshot,
        Promotion,
    },
    events::{EventProducers, OrderConfirmedEvent},
    helpers::new_order_number,
    pricing::{price_cart, PriceBreakdown},
    traits::{Catalog, MarketplaceDatabase, PaymentGateway, Settlement},
};

/// `CheckoutApi` is the primary API for turning a cart into a committed order: pricing, settlement, order commit,
/// code delivery and the post-commit bookkeeping.
///
/// The payment gateway is called with *no* database lock or transaction held; only after a successful settlement
/// does the commit phase start. Everything after the order insert is independently retryable: a shortfall or
/// cleanup failure is logged against the committed order rather than unwinding the payment.
pub struct CheckoutApi<B, C, G> {
    db: B,
    catalog: C,
    gateway: G,
    config: CheckoutConfig,
    producers: EventProducers,
}

impl<B, C, G> Debug for CheckoutApi<B, C, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi")
    }
}

impl<B, C, G> CheckoutApi<B, C, G> {
    pub fn new(db: B, catalog: C, gateway: G, config: CheckoutConfig, producers: EventProducers) -> Self {
        Self { db, catalog, gateway, config, producers }
    }
}

impl<B, C, G> CheckoutApi<B, C, G>
where
    B: MarketplaceDatabase,
    C: Catalog,
    G: PaymentGateway,
{
    /// Run the full checkout flow for the owner's cart.
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutSummary, CheckoutError> {
        let cart = self.db.fetch_cart(&request.owner).await?.ok_or(CheckoutError::EmptyCart)?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let snapshots = self.resolve_snapshots(&cart.items).await?;
        let (promotion, prior_uses) = self.resolve_promotion(&request).await?;
        let breakdown = price_cart(
            &snapshots,
            request.is_plus_member(),
            promotion.as_ref(),
            prior_uses,
            Utc::now(),
            self.config.tax_rate_bps,
        )?;
        let settlement = self.settle(&request, &breakdown).await?;
        let order_number = new_order_number();
        debug!(
            "🚀️ Payment of {} for order [{order_number}] settled with transaction {}",
            breakdown.total, settlement.transaction_id
        );
        let order = self.commit_order(&request, &order_number, &snapshots, &breakdown, &settlement).await?;
        let order = self.deliver_codes(order).await?;
        if let Some(promo) = &promotion {
            if let Err(e) =
                self.db.record_usage(&promo.code, request.customer_id(), order.id, breakdown.discount).await
            {
                error!("🚀️ Could not record usage of promotion [{}] on order [{order_number}]: {e}", promo.code);
            }
        }
        if let Err(e) = self.db.delete_cart(&request.owner).await {
            warn!("🚀️ Could not clear the cart after checkout of order [{order_number}]: {e}");
        }
        let all_codes_delivered = order.items.iter().all(|i| !i.code_gated || i.code_delivered);
        self.call_order_confirmed_hook(&order, &request).await;
        info!("🚀️ Checkout of order [{order_number}] complete. Total: {}", order.total);
        Ok(CheckoutSummary { order, pricing: breakdown, all_codes_delivered })
    }

    /// Webhook entry point: a gateway reports a settlement for an order that may or may not have committed yet.
    /// Unknown order numbers are reported as `None` rather than an error, so a webhook racing order creation can
    /// simply be redelivered.
    pub async fn confirm_payment(
        &self,
        order_number: &OrderNumber,
        transaction_id: &str,
    ) -> Result<Option<Order>, CheckoutError> {
        if self.db.fetch_order_by_number(order_number).await?.is_none() {
            info!("🚀️ Webhook for unknown order [{order_number}]. Nothing to confirm yet.");
            return Ok(None);
        }
        let order = self.db.confirm_order_payment(order_number, transaction_id).await?;
        Ok(Some(order))
    }

    async fn resolve_snapshots(
        &self,
        items: &[crate::db_types::CartItem],
    ) -> Result<Vec<(ProductSnapshot, u32)>, CheckoutError> {
        let mut snapshots = Vec::with_capacity(items.len());
        for item in items {
            let snapshot = self
                .catalog
                .product_snapshot(&item.product_id)
                .await?
                .ok_or_else(|| CheckoutError::ProductUnavailable(item.product_id.clone()))?;
            if !snapshot.is_purchasable() {
                return Err(CheckoutError::ProductUnavailable(item.product_id.clone()));
            }
            if snapshot.mode == InventoryMode::Limited && snapshot.available < i64::from(item.quantity) {
                return Err(CheckoutError::InsufficientStock {
                    product_id: item.product_id.clone(),
                    requested: item.quantity,
                    available: snapshot.available,
                });
            }
            snapshots.push((snapshot, item.quantity));
        }
        Ok(snapshots)
    }

    async fn resolve_promotion(
        &self,
        request: &CheckoutRequest,
    ) -> Result<(Option<Promotion>, i64), CheckoutError> {
        let code = match &request.promotion_code {
            Some(code) => code,
            None => return Ok((None, 0)),
        };
        let promotion = self
            .db
            .fetch_promotion(code)
            .await?
            .ok_or_else(|| CheckoutError::UnknownPromotion(code.clone()))?;
        let prior_uses = match request.customer_id() {
            Some(cid) => self.db.usage_count_for(&promotion.code, cid).await?,
            None => 0,
        };
        Ok((Some(promotion), prior_uses))
    }

    /// Capture the funds. `PaymentMethod::Mock` settles locally without touching the gateway; everything else goes
    /// through [`PaymentGateway::settle`] under the configured timeout. No engine state has changed yet when this
    /// returns an error.
    async fn settle(
        &self,
        request: &CheckoutRequest,
        breakdown: &PriceBreakdown,
    ) -> Result<Settlement, CheckoutError> {
        if request.payment_method == PaymentMethod::Mock {
            return Ok(Settlement::succeeded(format!("pi_mock_{}", Utc::now().timestamp_millis())));
        }
        let attempt = self.gateway.settle(breakdown.total, &self.config.currency, &request.payment_method);
        let settlement = match timeout(self.config.gateway_timeout, attempt).await {
            Ok(result) => result?,
            Err(_) => return Err(CheckoutError::PaymentFailed("The payment gateway timed out".to_string())),
        };
        if !settlement.succeeded {
            let reason = settlement.failure_reason.unwrap_or_else(|| "Payment declined".to_string());
            return Err(CheckoutError::PaymentFailed(reason));
        }
        Ok(settlement)
    }

    async fn commit_order(
        &self,
        request: &CheckoutRequest,
        order_number: &OrderNumber,
        snapshots: &[(ProductSnapshot, u32)],
        breakdown: &PriceBreakdown,
        settlement: &Settlement,
    ) -> Result<Order, CheckoutError> {
        let items = snapshots
            .iter()
            .zip(breakdown.lines.iter())
            .map(|((snapshot, quantity), line)| NewOrderItem {
                product_id: snapshot.product_id.clone(),
                title: snapshot.title.clone(),
                quantity: *quantity,
                price: line.unit_price,
                final_price: line.user_price,
                mode: snapshot.mode,
            })
            .collect();
        let new_order = NewOrder {
            order_number: order_number.clone(),
            customer_id: request.customer_id().map(String::from),
            items,
            subtotal: breakdown.subtotal,
            discount: breakdown.discount,
            tax: breakdown.tax,
            total: breakdown.total,
            currency: self.config.currency.clone(),
            payment_method: request.payment_method.label().to_string(),
            payment_status: PaymentStatus::Completed,
            transaction_id: Some(settlement.transaction_id.clone()),
            paid_at: Some(Utc::now()),
            status: OrderStatus::Confirmed,
            coupon_code: request.promotion_code.as_ref().map(|c| c.to_uppercase()),
            is_plus_member: request.is_plus_member(),
        };
        let (order, inserted) = self.db.insert_order(new_order).await?;
        if !inserted {
            warn!("🚀️ Order [{order_number}] was already committed. Continuing with the existing record.");
        }
        Ok(order)
    }

    /// Allocate codes for every code-gated item. A pool shortfall on one item does not unwind the order: the item
    /// stays `code_delivered = false` and the order is picked up by the reconciliation query.
    async fn deliver_codes(&self, order: Order) -> Result<Order, CheckoutError> {
        let mut shortfall = false;
        for item in order.items.iter().filter(|i| i.code_gated && !i.code_delivered) {
            match self.db.deliver_codes_for_item(order.id, item.id, &item.product_id, item.quantity).await {
                Ok(codes) => {
                    debug!("🚀️ {} code(s) of {} delivered to order [{}]", codes.len(), item.product_id, order.order_number)
                },
                Err(e) => {
                    shortfall = true;
                    warn!(
                        "🚀️ Could not deliver codes for {} on order [{}]: {e}. The order is committed and flagged \
                         for reconciliation.",
                        item.product_id, order.order_number
                    );
                },
            }
        }
        if !shortfall && order.items.iter().all(|i| !i.code_gated) {
            return Ok(order);
        }
        // Reload so the returned order carries the freshly attached codes.
        let order_number = order.order_number.clone();
        let reloaded = self
            .db
            .fetch_order_by_number(&order_number)
            .await?
            .ok_or_else(|| CheckoutError::DatabaseError(format!("Order {order_number} vanished after commit")))?;
        Ok(reloaded)
    }

    async fn call_order_confirmed_hook(&self, order: &Order, request: &CheckoutRequest) {
        for producer in &self.producers.order_confirmed_producer {
            debug!("🚀️📬️ Notifying order confirmed hook subscribers");
            let event = OrderConfirmedEvent::new(order.clone(), request.customer.clone());
            producer.publish_event(event).await;
        }
    }
}
