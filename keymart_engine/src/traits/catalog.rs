use thiserror::Error;

use crate::db_types::ProductSnapshot;

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("The catalog could not be reached: {0}")]
    Unavailable(String),
}

/// The product catalog collaborator. The engine asks for a snapshot of a product as of call time and treats the
/// answer as frozen: prices locked into an order never track later catalog changes.
#[allow(async_fn_in_trait)]
pub trait Catalog {
    async fn product_snapshot(&self, product_id: &str) -> Result<Option<ProductSnapshot>, CatalogError>;
}
