use km_common::Money;
use thiserror::Error;

use crate::db_types::Promotion;

#[derive(Debug, Clone, Error)]
pub enum PromotionError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("No promotion exists with code {0}")]
    UnknownCode(String),
}

impl From<sqlx::Error> for PromotionError {
    fn from(e: sqlx::Error) -> Self {
        PromotionError::DatabaseError(e.to_string())
    }
}

/// Storage for promotions and their usage history. Validity checking itself is pure
/// ([`Promotion::is_valid`]); this trait only loads promotions and records usage at order commit.
#[allow(async_fn_in_trait)]
pub trait PromotionManagement {
    /// Create or replace a promotion. The code is stored upper-cased.
    async fn upsert_promotion(&self, promotion: Promotion) -> Result<(), PromotionError>;

    /// Case-insensitive lookup.
    async fn fetch_promotion(&self, code: &str) -> Result<Option<Promotion>, PromotionError>;

    /// How many orders this customer has already committed with this code.
    async fn usage_count_for(&self, code: &str, customer_id: &str) -> Result<i64, PromotionError>;

    /// Record that a committed order used the code: appends to the usage history and bumps the global usage
    /// counter, in one transaction. Never called at preview/pricing time.
    async fn record_usage(
        &self,
        code: &str,
        customer_id: Option<&str>,
        order_id: i64,
        amount: Money,
    ) -> Result<(), PromotionError>;

    async fn deactivate_promotion(&self, code: &str) -> Result<(), PromotionError>;
}
