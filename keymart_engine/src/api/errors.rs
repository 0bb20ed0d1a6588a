use thiserror::Error;

use crate::{
    db_types::PromotionRejection,
    pricing::PricingError,
    traits::{CartError, CatalogError, GatewayError, InventoryError, OrderError, PromotionError},
};

/// Everything that can stop a checkout before the order commits. Once the order row exists, later stage failures
/// (code delivery, cart cleanup) are logged and left for reconciliation instead of surfacing here.
#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    #[error("The cart is empty")]
    EmptyCart,
    #[error("Product {0} is not available for purchase")]
    ProductUnavailable(String),
    #[error("Not enough stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: String,
        requested: u32,
        available: i64,
    },
    #[error("No promotion exists with code {0}")]
    UnknownPromotion(String),
    #[error("The promotion cannot be applied: {0}")]
    InvalidPromotion(#[from] PromotionRejection),
    #[error("The payment could not be completed: {0}")]
    PaymentFailed(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<PricingError> for CheckoutError {
    fn from(e: PricingError) -> Self {
        match e {
            PricingError::InvalidPromotion(rejection) => CheckoutError::InvalidPromotion(rejection),
            e @ PricingError::QuantityOutOfRange { .. } => CheckoutError::DatabaseError(e.to_string()),
        }
    }
}

impl From<CartError> for CheckoutError {
    fn from(e: CartError) -> Self {
        CheckoutError::DatabaseError(e.to_string())
    }
}

impl From<OrderError> for CheckoutError {
    fn from(e: OrderError) -> Self {
        CheckoutError::DatabaseError(e.to_string())
    }
}

impl From<PromotionError> for CheckoutError {
    fn from(e: PromotionError) -> Self {
        CheckoutError::DatabaseError(e.to_string())
    }
}

impl From<InventoryError> for CheckoutError {
    fn from(e: InventoryError) -> Self {
        match e {
            InventoryError::InsufficientStock { product_id, requested, available } => {
                CheckoutError::InsufficientStock { product_id, requested, available }
            },
            e => CheckoutError::DatabaseError(e.to_string()),
        }
    }
}

impl From<CatalogError> for CheckoutError {
    fn from(e: CatalogError) -> Self {
        CheckoutError::ProductUnavailable(e.to_string())
    }
}

impl From<GatewayError> for CheckoutError {
    fn from(e: GatewayError) -> Self {
        CheckoutError::PaymentFailed(e.to_string())
    }
}

/// Errors from the cart API, which layers catalog pre-checks over the plain cart store.
#[derive(Debug, Clone, Error)]
pub enum CartApiError {
    #[error(transparent)]
    Cart(#[from] CartError),
    #[error("Product {0} is not available for purchase")]
    ProductUnavailable(String),
    #[error("Not enough stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: String,
        requested: u32,
        available: i64,
    },
    #[error("The catalog could not be reached: {0}")]
    Catalog(String),
}

impl From<CatalogError> for CartApiError {
    fn from(e: CatalogError) -> Self {
        CartApiError::Catalog(e.to_string())
    }
}
