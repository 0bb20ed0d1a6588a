//! Shared scaffolding for the integration tests: a throwaway SQLite database per test, an in-memory catalog, and a
//! few object builders.
#![allow(dead_code)]

use std::{collections::HashMap, env, sync::Arc};

use chrono::{Duration, Utc};
use keymart_engine::{
    db_types::{
        CartOwner,
        CustomerIdentity,
        InventoryMode,
        PaymentMethod,
        ProductSnapshot,
        ProductStatus,
        Promotion,
        PromotionKind,
    },
    sqlite::MIGRATOR,
    traits::{Catalog, CatalogError, InventoryManagement, PromotionManagement},
    CheckoutRequest,
    SqliteDatabase,
};
use km_common::Money;
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    std::fs::create_dir_all("../data").ok();
    create_database(url).await;
    run_migrations(url).await;
}

pub fn random_db_path(name: &str) -> String {
    format!("sqlite://../data/test_{name}_{}.db", rand::random::<u64>())
}

/// Set `KM_KEEP_TEST_DB=1` (or `true`/`yes`) to inspect a test database after the run.
pub fn keep_test_db() -> bool {
    env::var("KM_KEEP_TEST_DB")
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

async fn run_migrations(url: &str) {
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    MIGRATOR.run(db.pool()).await.expect("Error running DB migrations");
    info!("🚀️ Migrations complete");
}

async fn create_database(url: &str) {
    if let Err(e) = Sqlite::drop_database(url).await {
        warn!("Error dropping database {url}: {e:?}");
    }
    Sqlite::create_database(url).await.expect("Error creating database");
    info!("Created Sqlite database {url}");
}

/// A fixed in-memory catalog. Tests construct it with whatever snapshots they need; lookups never fail, missing
/// products are simply absent.
#[derive(Clone, Default)]
pub struct TestCatalog {
    products: Arc<HashMap<String, ProductSnapshot>>,
}

impl TestCatalog {
    pub fn with_products(products: Vec<ProductSnapshot>) -> Self {
        let map = products.into_iter().map(|p| (p.product_id.clone(), p)).collect();
        Self { products: Arc::new(map) }
    }
}

impl Catalog for TestCatalog {
    async fn product_snapshot(&self, product_id: &str) -> Result<Option<ProductSnapshot>, CatalogError> {
        Ok(self.products.get(product_id).cloned())
    }
}

pub fn snapshot(product_id: &str, price_cents: i64, mode: InventoryMode, available: i64) -> ProductSnapshot {
    ProductSnapshot {
        product_id: product_id.to_string(),
        title: format!("{product_id} (digital)"),
        status: ProductStatus::Active,
        base_price: Money::from_cents(price_cents),
        sale_price: None,
        plus_discount_pct: 10,
        mode,
        available,
    }
}

/// Register a limited pool for the product and fill it with `count` generated codes.
pub async fn seed_codes(db: &SqliteDatabase, product_id: &str, count: u32) {
    db.register_pool(product_id, InventoryMode::Limited).await.expect("Error registering pool");
    let codes = (0..count).map(|i| format!("{}-KEY-{i:04}", product_id.to_uppercase())).collect::<Vec<String>>();
    let added = db.add_codes(product_id, &codes).await.expect("Error adding codes");
    assert_eq!(added, count);
}

pub async fn seed_promotion(db: &SqliteDatabase, code: &str, percent_off: i64, per_user: i64) {
    let now = Utc::now();
    let promo = Promotion {
        code: code.to_string(),
        kind: PromotionKind::Percentage,
        value: percent_off,
        min_purchase: Money::from_cents(0),
        max_discount: None,
        usage_limit: None,
        usage_per_user: per_user,
        starts_at: now - Duration::days(1),
        ends_at: now + Duration::days(30),
        is_active: true,
        times_used: 0,
    };
    db.upsert_promotion(promo).await.expect("Error seeding promotion");
}

pub fn customer(id: &str, is_plus_member: bool) -> CustomerIdentity {
    CustomerIdentity { customer_id: id.to_string(), is_plus_member }
}

pub fn checkout_request_for(user_id: &str, is_plus_member: bool) -> CheckoutRequest {
    CheckoutRequest {
        owner: CartOwner::User(user_id.to_string()),
        customer: Some(customer(user_id, is_plus_member)),
        payment_method: PaymentMethod::Mock,
        promotion_code: None,
    }
}
