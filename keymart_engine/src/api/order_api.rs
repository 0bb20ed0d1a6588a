use std::fmt::Debug;

use km_common::Money;
use log::*;

use crate::{
    api::order_objects::{OrderQueryFilter, OrderStats},
    db_types::{Actor, Order, OrderNumber, OrderStatus, TimelineEntry},
    events::{EventProducers, OrderRefundedEvent},
    traits::{MarketplaceDatabase, OrderError},
};

/// `OrderApi` wraps the order ledger with the actor-permission rules: who may drive which edge of the status
/// graph, and the customer-facing cancel/refund entry points.
pub struct OrderApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderApi")
    }
}

impl<B> OrderApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> OrderApi<B>
where B: MarketplaceDatabase
{
    pub async fn fetch_order(&self, order_number: &OrderNumber) -> Result<Option<Order>, OrderError> {
        self.db.fetch_order_by_number(order_number).await
    }

    pub async fn orders_for_customer(&self, customer_id: &str) -> Result<Vec<Order>, OrderError> {
        self.db.fetch_orders_for_customer(customer_id).await
    }

    pub async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, OrderError> {
        self.db.search_orders(filter).await
    }

    pub async fn timeline(&self, order_number: &OrderNumber) -> Result<Vec<TimelineEntry>, OrderError> {
        self.db.fetch_timeline(order_number).await
    }

    pub async fn order_stats(&self, filter: OrderQueryFilter) -> Result<OrderStats, OrderError> {
        self.db.order_stats(filter).await
    }

    /// Drive an order along the status graph. Administrators may take any legal edge; the system itself only
    /// confirms (payment webhooks); customers go through [`Self::cancel_order`] and [`Self::request_refund`]
    /// instead.
    pub async fn update_status(
        &self,
        order_number: &OrderNumber,
        new_status: OrderStatus,
        note: Option<&str>,
        actor: &Actor,
    ) -> Result<Order, OrderError> {
        match actor {
            Actor::Admin(_) => {},
            Actor::System if new_status == OrderStatus::Confirmed => {},
            _ => return Err(OrderError::TransitionNotPermitted(new_status)),
        }
        self.db.update_status(order_number, new_status, note, actor).await
    }

    /// Cancel an order that has not started fulfilment. Customers may only cancel their own orders.
    pub async fn cancel_order(
        &self,
        order_number: &OrderNumber,
        reason: Option<&str>,
        actor: &Actor,
    ) -> Result<Order, OrderError> {
        let order = self
            .db
            .fetch_order_by_number(order_number)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_number.clone()))?;
        if let Actor::Customer(cid) = actor {
            if order.customer_id.as_deref() != Some(cid.as_str()) {
                return Err(OrderError::NotOrderOwner);
            }
        }
        if !order.can_be_cancelled() {
            return Err(OrderError::NotCancellable(order_number.clone()));
        }
        let order = self.db.update_status(order_number, OrderStatus::Cancelled, reason, actor).await?;
        info!("📦️ Order [{order_number}] cancelled by {actor}");
        Ok(order)
    }

    /// Open a refund request on a paid order. Customers may only file against their own orders; administrators and
    /// the system pass no ownership constraint.
    pub async fn request_refund(
        &self,
        order_number: &OrderNumber,
        amount: Money,
        reason: &str,
        actor: &Actor,
    ) -> Result<Order, OrderError> {
        let customer_id = match actor {
            Actor::Customer(cid) => Some(cid.as_str()),
            _ => None,
        };
        self.db.request_refund(order_number, customer_id, amount, reason).await
    }

    /// Approve a requested refund and carry it through to completion: codes released, payment and order marked
    /// refunded, and the refunded hook fired. Administrator only.
    pub async fn approve_refund(&self, order_number: &OrderNumber, actor: &Actor) -> Result<Order, OrderError> {
        if !matches!(actor, Actor::Admin(_)) {
            return Err(OrderError::TransitionNotPermitted(OrderStatus::Refunded));
        }
        self.db.decide_refund(order_number, true, actor).await?;
        let order = self.db.complete_refund(order_number, actor).await?;
        self.call_order_refunded_hook(&order).await;
        Ok(order)
    }

    /// Deny a requested refund. Administrator only. The order keeps its current status.
    pub async fn deny_refund(&self, order_number: &OrderNumber, actor: &Actor) -> Result<Order, OrderError> {
        if !matches!(actor, Actor::Admin(_)) {
            return Err(OrderError::TransitionNotPermitted(OrderStatus::Refunded));
        }
        self.db.decide_refund(order_number, false, actor).await
    }

    async fn call_order_refunded_hook(&self, order: &Order) {
        for producer in &self.producers.order_refunded_producer {
            debug!("📦️📬️ Notifying order refunded hook subscribers");
            producer.publish_event(OrderRefundedEvent::new(order.clone())).await;
        }
    }
}
