use thiserror::Error;

use crate::db_types::{ActivationCode, InventoryMode};

#[derive(Debug, Clone, Error)]
pub enum InventoryError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("No inventory pool is registered for product {0}")]
    UnknownPool(String),
    #[error("Not enough stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: String,
        requested: u32,
        available: i64,
    },
    #[error("Code {code} already exists in the pool for product {product_id}")]
    DuplicateCode { product_id: String, code: String },
}

impl From<sqlx::Error> for InventoryError {
    fn from(e: sqlx::Error) -> Self {
        InventoryError::DatabaseError(e.to_string())
    }
}

/// The inventory ledger: the finite pool of activation codes per product, and the atomic claim/release operations
/// over it.
///
/// The ledger exclusively owns the `is_used` state of every code. The core contract is that a claim selects and
/// marks its codes in a single indivisible step, so that under arbitrary concurrent callers no code is ever handed
/// to two orders and the number of codes ever marked used never exceeds the pool size.
#[allow(async_fn_in_trait)]
pub trait InventoryManagement {
    /// Register a product's inventory pool. Idempotent; re-registering updates the mode.
    async fn register_pool(&self, product_id: &str, mode: InventoryMode) -> Result<(), InventoryError>;

    /// The pool's fulfilment mode, or `None` when no pool is registered.
    async fn pool_mode(&self, product_id: &str) -> Result<Option<InventoryMode>, InventoryError>;

    /// Add codes to a product's pool. Duplicate codes within a product are rejected.
    async fn add_codes(&self, product_id: &str, codes: &[String]) -> Result<u32, InventoryError>;

    /// The number of currently unused codes. This is *derived* from the code rows, never a separately maintained
    /// counter, so it cannot drift from the claim operation.
    async fn available_count(&self, product_id: &str) -> Result<i64, InventoryError>;

    /// Atomically claim `count` unused codes for the given order.
    ///
    /// Either exactly `count` codes flip to used, attributed to `order_id`, and are returned — or nothing changes
    /// and [`InventoryError::InsufficientStock`] is reported. There is no intermediate state a concurrent caller
    /// can observe.
    async fn claim_codes(
        &self,
        product_id: &str,
        order_id: i64,
        count: u32,
    ) -> Result<Vec<ActivationCode>, InventoryError>;

    /// Release the codes previously claimed by `order_id` for `product_id` back into the pool. Used by the refund
    /// workflow only. Idempotent: releasing codes that are already free is a no-op, and the number of codes
    /// actually released is returned.
    async fn release_codes(&self, order_id: i64, product_id: &str) -> Result<u32, InventoryError>;
}
