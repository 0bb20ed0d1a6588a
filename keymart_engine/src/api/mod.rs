//! # Fulfilment engine public API
//!
//! The `api` module exposes the programmatic surface of the engine. It is modular: each API wraps a database
//! backend implementing the relevant traits, so clients pick only the pieces they need (a storefront process might
//! carry `CartApi` and `CheckoutApi`, an admin service `OrderApi` alone).
//!
//! * [`cart_api`] — cart reads and writes, with catalog pre-checks layered on top of the store.
//! * [`checkout_api`] — the orchestrated cart-to-order flow: pricing, settlement, commit, code delivery.
//! * [`order_api`] — order queries, the status state machine with actor permissions, and the refund workflow.
//!
//! The pattern is the same throughout: construct the API with a backend instance (and, where relevant, the catalog
//! and gateway collaborators plus event producers), for example:
//!
//! ```rust,ignore
//! use keymart_engine::{CheckoutApi, CheckoutConfig, SqliteDatabase, traits::MockGateway};
//! let db = SqliteDatabase::new_with_url("sqlite://data/keymart.db", 25).await?;
//! let api = CheckoutApi::new(db, catalog, MockGateway, CheckoutConfig::default(), producers);
//! let summary = api.checkout(request).await?;
//! ```

pub mod cart_api;
pub mod checkout_api;
pub mod checkout_objects;
pub mod errors;
pub mod order_api;
pub mod order_objects;

pub use cart_api::CartApi;
pub use checkout_api::CheckoutApi;
pub use checkout_objects::{CheckoutConfig, CheckoutRequest, CheckoutSummary};
pub use errors::{CartApiError, CheckoutError};
pub use order_api::OrderApi;
pub use order_objects::{OrderQueryFilter, OrderStats};
