use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    db_types::{CartOwner, CustomerIdentity, Order, PaymentMethod},
    pricing::{PriceBreakdown, DEFAULT_TAX_RATE_BPS},
};
use km_common::DEFAULT_CURRENCY;

/// Everything checkout needs from the caller. The cart itself is looked up by owner; identity comes from the
/// external auth layer and is absent for anonymous (session) checkouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub owner: CartOwner,
    pub customer: Option<CustomerIdentity>,
    pub payment_method: PaymentMethod,
    pub promotion_code: Option<String>,
}

impl CheckoutRequest {
    pub fn customer_id(&self) -> Option<&str> {
        self.customer.as_ref().map(|c| c.customer_id.as_str())
    }

    pub fn is_plus_member(&self) -> bool {
        self.customer.as_ref().map(|c| c.is_plus_member).unwrap_or(false)
    }
}

/// The outcome of a successful checkout. `all_codes_delivered` is `false` when some code-gated item hit a pool
/// shortfall after payment; the order is committed regardless and flagged for reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSummary {
    pub order: Order,
    pub pricing: PriceBreakdown,
    pub all_codes_delivered: bool,
}

#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub tax_rate_bps: u32,
    pub currency: String,
    /// Upper bound on a single gateway settlement call. A timeout is a payment failure with no side effects.
    pub gateway_timeout: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            tax_rate_bps: DEFAULT_TAX_RATE_BPS,
            currency: DEFAULT_CURRENCY.to_string(),
            gateway_timeout: Duration::from_secs(30),
        }
    }
}
