use chrono::{DateTime, Utc};
use km_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::{OrderStatus, PaymentStatus, RefundStatus};

/// Search criteria for the administrator order listing. An empty filter matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub customer_id: Option<String>,
    pub status: Option<Vec<OrderStatus>>,
    pub payment_status: Option<PaymentStatus>,
    pub refund_status: Option<RefundStatus>,
    pub coupon_code: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Select orders with a paid, code-gated item that never received its codes — the manual reconciliation queue.
    pub undelivered_codes: bool,
}

impl OrderQueryFilter {
    pub fn is_empty(&self) -> bool {
        self.customer_id.is_none()
            && self.status.is_none()
            && self.payment_status.is_none()
            && self.refund_status.is_none()
            && self.coupon_code.is_none()
            && self.since.is_none()
            && self.until.is_none()
            && !self.undelivered_codes
    }

    pub fn with_customer_id(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn with_payment_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status = Some(status);
        self
    }

    pub fn with_refund_status(mut self, status: RefundStatus) -> Self {
        self.refund_status = Some(status);
        self
    }

    pub fn with_coupon_code(mut self, code: impl Into<String>) -> Self {
        self.coupon_code = Some(code.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_undelivered_codes(mut self) -> Self {
        self.undelivered_codes = true;
        self
    }
}

/// Aggregates over committed orders, computed from stored pricing fields only so they reproduce exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStats {
    pub total_orders: i64,
    pub total_revenue: Money,
    pub pending_orders: i64,
    pub confirmed_orders: i64,
    pub delivered_orders: i64,
    pub cancelled_orders: i64,
    pub refunded_orders: i64,
}
