use chrono::Utc;
use km_common::Money;
use thiserror::Error;

use crate::db_types::PaymentMethod;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("The payment was declined: {0}")]
    Declined(String),
    #[error("The payment gateway did not respond in time")]
    Timeout,
    #[error("Could not reach the payment gateway: {0}")]
    Transport(String),
}

/// The gateway's answer to a settlement attempt. `succeeded == false` with a reason is a normal business outcome,
/// not a transport error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub transaction_id: String,
    pub succeeded: bool,
    pub failure_reason: Option<String>,
}

impl Settlement {
    pub fn succeeded(transaction_id: String) -> Self {
        Self { transaction_id, succeeded: true, failure_reason: None }
    }

    pub fn refused(transaction_id: String, reason: impl Into<String>) -> Self {
        Self { transaction_id, succeeded: false, failure_reason: Some(reason.into()) }
    }
}

/// The external payment gateway, reduced to the one capability the checkout flow needs: capture funds. Retry and
/// 3-D-Secure logic live behind this interface, on the gateway's side.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    async fn settle(&self, amount: Money, currency: &str, method: &PaymentMethod) -> Result<Settlement, GatewayError>;
}

/// A gateway that always settles successfully and never leaves the process. The deterministic test/dev path.
#[derive(Debug, Clone, Default)]
pub struct MockGateway;

impl PaymentGateway for MockGateway {
    async fn settle(
        &self,
        _amount: Money,
        _currency: &str,
        _method: &PaymentMethod,
    ) -> Result<Settlement, GatewayError> {
        Ok(Settlement::succeeded(format!("pi_mock_{}", Utc::now().timestamp_millis())))
    }
}
