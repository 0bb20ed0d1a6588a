use serde::{Deserialize, Serialize};

use crate::db_types::{CustomerIdentity, Order};

/// Fired once per order, after checkout has committed the order with a completed payment. Carries the full order,
/// delivered codes included, so subscribers (mailers, analytics) need no further reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfirmedEvent {
    pub order: Order,
    pub customer: Option<CustomerIdentity>,
}

impl OrderConfirmedEvent {
    pub fn new(order: Order, customer: Option<CustomerIdentity>) -> Self {
        Self { order, customer }
    }
}

/// Fired when a refund completes and the order's codes have returned to their pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRefundedEvent {
    pub order: Order,
}

impl OrderRefundedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}
