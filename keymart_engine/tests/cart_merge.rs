mod support;

use chrono::{Duration, Utc};
use keymart_engine::{
    db_types::{CartOwner, MAX_ITEM_QUANTITY},
    traits::{CartError, CartManagement},
    SqliteDatabase,
};
use support::{prepare_test_env, random_db_path};

fn quantity_of(cart: &keymart_engine::db_types::Cart, product_id: &str) -> u32 {
    cart.items.iter().find(|i| i.product_id == product_id).map(|i| i.quantity).unwrap_or(0)
}

#[tokio::test]
async fn login_merge_sums_shared_lines_and_moves_the_rest() {
    let url = random_db_path("cart_merge");
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.unwrap();

    let session = CartOwner::Session("sess-123".to_string());
    let user = CartOwner::User("frank".to_string());
    db.add_item(&session, "game-a", 3).await.unwrap();
    db.add_item(&session, "game-b", 2).await.unwrap();
    db.add_item(&user, "game-a", 4).await.unwrap();

    let merged = db.merge_carts("sess-123", "frank").await.unwrap();
    assert_eq!(quantity_of(&merged, "game-a"), 7);
    assert_eq!(quantity_of(&merged, "game-b"), 2);

    // The session cart is gone, and replaying the merge changes nothing.
    assert!(db.fetch_cart(&session).await.unwrap().is_none());
    let again = db.merge_carts("sess-123", "frank").await.unwrap();
    assert_eq!(quantity_of(&again, "game-a"), 7);
    assert_eq!(quantity_of(&again, "game-b"), 2);
}

#[tokio::test]
async fn merge_caps_summed_quantities() {
    let url = random_db_path("cart_merge_cap");
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.unwrap();

    let session = CartOwner::Session("sess-456".to_string());
    let user = CartOwner::User("grace".to_string());
    db.add_item(&session, "game-a", 8).await.unwrap();
    db.add_item(&user, "game-a", 7).await.unwrap();

    let merged = db.merge_carts("sess-456", "grace").await.unwrap();
    assert_eq!(quantity_of(&merged, "game-a"), MAX_ITEM_QUANTITY);
}

#[tokio::test]
async fn quantities_are_validated_and_zero_removes_the_line() {
    let url = random_db_path("cart_quantities");
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.unwrap();
    let owner = CartOwner::User("heidi".to_string());

    let err = db.add_item(&owner, "game-a", 11).await.unwrap_err();
    assert!(matches!(err, CartError::QuantityOutOfRange { max: MAX_ITEM_QUANTITY }));

    db.add_item(&owner, "game-a", 9).await.unwrap();
    // Summing past the cap clamps instead of erroring.
    let cart = db.add_item(&owner, "game-a", 5).await.unwrap();
    assert_eq!(quantity_of(&cart, "game-a"), MAX_ITEM_QUANTITY);

    let cart = db.update_quantity(&owner, "game-a", 0).await.unwrap();
    assert!(cart.is_empty());
}

#[tokio::test]
async fn expired_carts_are_invisible_and_purgeable() {
    let url = random_db_path("cart_expiry");
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.unwrap();
    let owner = CartOwner::User("ivan".to_string());
    db.add_item(&owner, "game-a", 1).await.unwrap();

    // Within the TTL the cart is visible and untouched by the purge.
    assert!(db.fetch_cart(&owner).await.unwrap().is_some());
    assert_eq!(db.purge_expired_carts(Utc::now()).await.unwrap(), 0);

    // Once the TTL lapses the purge removes it.
    let after_ttl = Utc::now() + Duration::days(8);
    assert_eq!(db.purge_expired_carts(after_ttl).await.unwrap(), 1);
    assert!(db.fetch_cart(&owner).await.unwrap().is_none());
}
