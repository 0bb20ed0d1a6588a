//! Interface contracts for the fulfilment engine.
//!
//! ## Ledgers
//! Storage backends implement one trait per concern:
//!
//! * [`InventoryManagement`] — the finite pool of activation codes per product and the atomic claim/release over it.
//! * [`CartManagement`] — carts keyed by user or anonymous session, including the login-time merge.
//! * [`OrderManagement`] — the authoritative order record: pricing snapshot, payment outcome, status graph and
//!   append-only timeline.
//! * [`PromotionManagement`] — coupon storage and per-customer usage history.
//! * [`MarketplaceDatabase`] — the umbrella trait tying the above together plus the two cross-ledger transactions
//!   (code delivery, refund completion).
//!
//! ## Collaborators
//! The surrounding system is reduced to narrow traits: [`Catalog`] supplies product snapshots and
//! [`PaymentGateway`] settles payments. Both are owned by external services; the engine only consumes them.

mod cart_management;
mod catalog;
mod inventory_management;
mod marketplace_database;
mod order_management;
mod payment_gateway;
mod promotion_management;

pub use cart_management::{CartError, CartManagement};
pub use catalog::{Catalog, CatalogError};
pub use inventory_management::{InventoryError, InventoryManagement};
pub use marketplace_database::MarketplaceDatabase;
pub use order_management::{OrderError, OrderManagement};
pub use payment_gateway::{GatewayError, MockGateway, PaymentGateway, Settlement};
pub use promotion_management::{PromotionError, PromotionManagement};
