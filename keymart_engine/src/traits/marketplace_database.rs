use crate::{
    db_types::{Actor, DeliveredCode, Order, OrderNumber},
    traits::{CartManagement, InventoryManagement, InventoryError, OrderError, OrderManagement, PromotionManagement},
};

/// The umbrella contract a storage backend must satisfy to power the fulfilment engine.
///
/// Most operations live on the per-concern traits; this trait adds the two flows that have to touch more than one
/// ledger inside a single transaction.
#[allow(async_fn_in_trait)]
pub trait MarketplaceDatabase:
    Clone + CartManagement + InventoryManagement + OrderManagement + PromotionManagement
{
    /// The URL of the database.
    fn url(&self) -> &str;

    /// Claim `quantity` codes for an order item and attach them to it, flipping the item's `code_delivered` flag —
    /// the claim, the attachment and the flag update are one transaction. On
    /// [`InventoryError::InsufficientStock`] nothing changes and the item stays undelivered.
    async fn deliver_codes_for_item(
        &self,
        order_id: i64,
        order_item_id: i64,
        product_id: &str,
        quantity: u32,
    ) -> Result<Vec<DeliveredCode>, InventoryError>;

    /// Complete an approved (or directly requested) refund: release every code the order had claimed back into its
    /// pool, mark the payment refunded, move the order to `Refunded` and append the timeline entry — all in one
    /// transaction. Idempotent: completing an already-refunded order is a no-op returning the order as-is.
    async fn complete_refund(&self, order_number: &OrderNumber, actor: &Actor) -> Result<Order, OrderError>;
}
