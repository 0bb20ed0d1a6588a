//! KeyMart Fulfilment Engine
//!
//! The core logic of a digital-goods marketplace: pricing, activation-code inventory, carts, orders and refunds.
//! This library is storefront-agnostic; the web layer, catalog service and payment providers all sit behind narrow
//! traits.
//!
//! The library is divided into three main sections:
//! 1. Storage contracts and backends. The per-concern traits live in [`mod@traits`] and the shipped SQLite backend
//!    in [`mod@sqlite`] (feature `sqlite`, on by default). You should never need to touch the database directly;
//!    the data types it stores are public in [`mod@db_types`].
//! 2. The public API ([`mod@api`]): [`CartApi`], [`CheckoutApi`] and [`OrderApi`], each generic over a backend that
//!    implements the required traits.
//! 3. Events ([`mod@events`]): fulfilment milestones (order confirmed, order refunded) published over a small
//!    async pub-sub layer, so mailers and analytics can react without coupling to the commit path.

pub mod api;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod pricing;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use api::{
    CartApi,
    CartApiError,
    CheckoutApi,
    CheckoutConfig,
    CheckoutError,
    CheckoutRequest,
    CheckoutSummary,
    OrderApi,
    OrderQueryFilter,
    OrderStats,
};
pub use traits::{
    CartManagement,
    Catalog,
    InventoryManagement,
    MarketplaceDatabase,
    OrderManagement,
    PaymentGateway,
    PromotionManagement,
};
