//! Concurrency tests for the inventory ledger: many simultaneous claims against one finite pool must never issue
//! the same code twice, and must never issue more codes than the pool holds.
mod support;

use std::collections::HashSet;

use futures_util::future::join_all;
use keymart_engine::{
    db_types::{CartOwner, InventoryMode},
    events::EventProducers,
    traits::{CartManagement, InventoryError, InventoryManagement, MockGateway},
    CheckoutApi,
    CheckoutConfig,
    SqliteDatabase,
};
use log::*;
use support::{checkout_request_for, prepare_test_env, random_db_path, seed_codes, snapshot, TestCatalog};

const POOL_SIZE: u32 = 8;
const NUM_BUYERS: u32 = 12;

#[tokio::test]
async fn concurrent_claims_never_hand_out_the_same_code() {
    let url = random_db_path("burst_claims");
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    seed_codes(&db, "hot-game", POOL_SIZE).await;

    info!("🚀️ Injecting {NUM_BUYERS} concurrent claims");
    let claims = (0..NUM_BUYERS).map(|i| {
        let db = db.clone();
        async move { db.claim_codes("hot-game", i64::from(i) + 1, 1).await }
    });
    let results = join_all(claims).await;

    let mut issued = HashSet::new();
    let mut winners = 0u32;
    let mut losers = 0u32;
    for result in results {
        match result {
            Ok(codes) => {
                winners += 1;
                assert_eq!(codes.len(), 1);
                assert!(issued.insert(codes[0].code.clone()), "Code {} issued twice", codes[0].code);
            },
            Err(InventoryError::InsufficientStock { available, .. }) => {
                losers += 1;
                assert_eq!(available, 0);
            },
            Err(e) => panic!("Unexpected claim error: {e}"),
        }
    }
    assert_eq!(winners, POOL_SIZE);
    assert_eq!(losers, NUM_BUYERS - POOL_SIZE);
    assert_eq!(db.available_count("hot-game").await.unwrap(), 0);
}

#[tokio::test]
async fn burst_checkouts_deliver_each_code_at_most_once() {
    let url = random_db_path("burst_checkouts");
    prepare_test_env(&url).await;
    // The catalog deliberately over-reports availability so every buyer reaches the claim.
    let catalog = TestCatalog::with_products(vec![snapshot("hot-game", 2500, InventoryMode::Limited, 1000)]);
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    seed_codes(&db, "hot-game", POOL_SIZE).await;

    for i in 0..NUM_BUYERS {
        let owner = CartOwner::User(format!("buyer-{i}"));
        db.add_item(&owner, "hot-game", 1).await.expect("Error filling cart");
    }

    info!("🚀️ Running {NUM_BUYERS} concurrent checkouts against a pool of {POOL_SIZE}");
    let checkouts = (0..NUM_BUYERS).map(|i| {
        let api = CheckoutApi::new(
            db.clone(),
            catalog.clone(),
            MockGateway,
            CheckoutConfig::default(),
            EventProducers::default(),
        );
        async move { api.checkout(checkout_request_for(&format!("buyer-{i}"), false)).await }
    });
    let results = join_all(checkouts).await;

    let mut issued = HashSet::new();
    let mut delivered = 0u32;
    let mut flagged = 0u32;
    for result in results {
        let summary = result.expect("Checkout should commit even on a pool shortfall");
        if summary.all_codes_delivered {
            delivered += 1;
            for code in &summary.order.items[0].codes {
                assert!(issued.insert(code.code.clone()), "Code {} issued twice", code.code);
            }
        } else {
            flagged += 1;
        }
    }
    assert_eq!(delivered, POOL_SIZE);
    assert_eq!(flagged, NUM_BUYERS - POOL_SIZE);
    assert_eq!(issued.len(), POOL_SIZE as usize);
    assert_eq!(db.available_count("hot-game").await.unwrap(), 0);
}
