use km_common::Money;
use thiserror::Error;

use crate::{
    api::order_objects::{OrderQueryFilter, OrderStats},
    db_types::{Actor, NewOrder, Order, OrderNumber, OrderStatus, TimelineEntry},
};

#[derive(Debug, Clone, Error)]
pub enum OrderError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderNumber),
    #[error("An order with this order number already exists")]
    DuplicateOrderNumber,
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },
    #[error("Only administrators may move an order to {0}")]
    TransitionNotPermitted(OrderStatus),
    #[error("Order {0} can no longer be cancelled")]
    NotCancellable(OrderNumber),
    #[error("This order cannot be refunded")]
    RefundNotEligible,
    #[error("Refund of {requested} exceeds the order total of {total}")]
    RefundAmountExceedsTotal { requested: Money, total: Money },
    #[error("The order does not belong to this customer")]
    NotOrderOwner,
}

impl From<sqlx::Error> for OrderError {
    fn from(e: sqlx::Error) -> Self {
        OrderError::DatabaseError(e.to_string())
    }
}

/// The order ledger: the authoritative record of an order's items, locked-in pricing, payment outcome and lifecycle
/// status, with an append-only timeline.
///
/// The ledger exclusively owns `status` and the timeline. Item lists and pricing are immutable after commit. Every
/// status write validates the transition graph and appends its timeline entry in the same transaction, so a
/// rejected transition leaves both untouched.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    /// Persist a new order with its items, pricing snapshot and initial timeline entry, in one transaction.
    /// Idempotent on the order number: the second element is `false` when the order already existed.
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), OrderError>;

    /// Fetch an order (items and delivered codes included) by its externally visible number.
    async fn fetch_order_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>, OrderError>;

    /// All orders for a customer, newest first.
    async fn fetch_orders_for_customer(&self, customer_id: &str) -> Result<Vec<Order>, OrderError>;

    /// Administrator search across all orders.
    async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, OrderError>;

    /// The order's full audit trail, oldest first.
    async fn fetch_timeline(&self, order_number: &OrderNumber) -> Result<Vec<TimelineEntry>, OrderError>;

    /// Move the order along the status graph. Illegal transitions are rejected with
    /// [`OrderError::InvalidStatusTransition`] and change nothing.
    async fn update_status(
        &self,
        order_number: &OrderNumber,
        new_status: OrderStatus,
        note: Option<&str>,
        actor: &Actor,
    ) -> Result<Order, OrderError>;

    /// Record a successful settlement on an order that is still pending/processing: payment becomes `Completed`,
    /// the order `Confirmed`. Already-confirmed orders are a no-op (idempotent webhook semantics).
    async fn confirm_order_payment(
        &self,
        order_number: &OrderNumber,
        transaction_id: &str,
    ) -> Result<Order, OrderError>;

    /// Open a refund request. Permitted iff payment is completed and no refund exists yet; `customer_id`, when
    /// given, must own the order.
    async fn request_refund(
        &self,
        order_number: &OrderNumber,
        customer_id: Option<&str>,
        amount: Money,
        reason: &str,
    ) -> Result<Order, OrderError>;

    /// Administrator decision on a requested refund: approve or deny.
    async fn decide_refund(
        &self,
        order_number: &OrderNumber,
        approve: bool,
        actor: &Actor,
    ) -> Result<Order, OrderError>;

    /// Aggregate figures over committed orders, computed from the stored pricing fields only.
    async fn order_stats(&self, filter: OrderQueryFilter) -> Result<OrderStats, OrderError>;
}
