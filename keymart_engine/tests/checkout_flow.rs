mod support;

use keymart_engine::{
    db_types::{CartOwner, InventoryMode, NewOrder, NewOrderItem, OrderStatus, PaymentStatus, RefundStatus},
    events::EventProducers,
    helpers::new_order_number,
    traits::{CartManagement, MockGateway, OrderManagement},
    CheckoutApi,
    CheckoutConfig,
    CheckoutError,
    OrderQueryFilter,
    SqliteDatabase,
};
use km_common::Money;
use support::{checkout_request_for, prepare_test_env, random_db_path, seed_codes, seed_promotion, snapshot, TestCatalog};

async fn new_checkout_api(
    url: &str,
    catalog: TestCatalog,
) -> (SqliteDatabase, CheckoutApi<SqliteDatabase, TestCatalog, MockGateway>) {
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating database");
    let api = CheckoutApi::new(db.clone(), catalog, MockGateway, CheckoutConfig::default(), EventProducers::default());
    (db, api)
}

#[tokio::test]
async fn happy_path_delivers_codes_and_clears_cart() {
    let url = random_db_path("checkout_happy");
    prepare_test_env(&url).await;
    let catalog = TestCatalog::with_products(vec![snapshot("game-a", 1000, InventoryMode::Limited, 5)]);
    let (db, api) = new_checkout_api(&url, catalog).await;
    seed_codes(&db, "game-a", 5).await;

    let owner = CartOwner::User("alice".to_string());
    db.add_item(&owner, "game-a", 2).await.expect("Error adding to cart");

    let summary = api.checkout(checkout_request_for("alice", true)).await.expect("Checkout failed");
    // 2 × €10.00, 10% plus discount, 20% tax
    assert_eq!(summary.order.subtotal, Money::from_cents(1800));
    assert_eq!(summary.order.tax, Money::from_cents(360));
    assert_eq!(summary.order.total, Money::from_cents(2160));
    assert_eq!(summary.order.status, OrderStatus::Confirmed);
    assert_eq!(summary.order.payment.status, PaymentStatus::Completed);
    assert!(summary.all_codes_delivered);
    let item = &summary.order.items[0];
    assert!(item.code_gated);
    assert!(item.code_delivered);
    assert_eq!(item.codes.len(), 2);

    // The cart is gone and the timeline opens with the commit entry.
    assert!(db.fetch_cart(&owner).await.unwrap().is_none());
    let timeline = db.fetch_timeline(&summary.order.order_number).await.unwrap();
    assert!(!timeline.is_empty());
}

#[tokio::test]
async fn checkout_of_an_empty_cart_is_rejected() {
    let url = random_db_path("checkout_empty");
    prepare_test_env(&url).await;
    let (_db, api) = new_checkout_api(&url, TestCatalog::default()).await;
    let err = api.checkout(checkout_request_for("nobody", false)).await.unwrap_err();
    assert!(matches!(err, CheckoutError::EmptyCart));
}

#[tokio::test]
async fn unknown_product_stops_checkout_before_payment() {
    let url = random_db_path("checkout_unknown_product");
    prepare_test_env(&url).await;
    let (db, api) = new_checkout_api(&url, TestCatalog::default()).await;
    let owner = CartOwner::User("bob".to_string());
    db.add_item(&owner, "ghost-product", 1).await.unwrap();
    let err = api.checkout(checkout_request_for("bob", false)).await.unwrap_err();
    assert!(matches!(err, CheckoutError::ProductUnavailable(p) if p == "ghost-product"));
    // Nothing committed: the cart is still there.
    assert!(db.fetch_cart(&owner).await.unwrap().is_some());
}

#[tokio::test]
async fn pool_shortfall_commits_the_order_for_reconciliation() {
    let url = random_db_path("checkout_shortfall");
    prepare_test_env(&url).await;
    // Catalog view is stale: it reports 5 available but the pool only holds 1.
    let catalog = TestCatalog::with_products(vec![snapshot("game-b", 500, InventoryMode::Limited, 5)]);
    let (db, api) = new_checkout_api(&url, catalog).await;
    seed_codes(&db, "game-b", 1).await;

    let owner = CartOwner::User("carol".to_string());
    db.add_item(&owner, "game-b", 2).await.unwrap();
    let summary = api.checkout(checkout_request_for("carol", false)).await.expect("Checkout failed");

    assert_eq!(summary.order.status, OrderStatus::Confirmed);
    assert!(!summary.all_codes_delivered);
    let item = &summary.order.items[0];
    assert!(item.code_gated);
    assert!(!item.code_delivered);
    assert!(item.codes.is_empty());

    // The all-or-nothing claim left the single code unclaimed.
    let flagged = db.search_orders(OrderQueryFilter::default().with_undelivered_codes()).await.unwrap();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].order_number, summary.order.order_number);
}

#[tokio::test]
async fn preorders_commit_without_stock_or_codes() {
    let url = random_db_path("checkout_preorder");
    prepare_test_env(&url).await;
    // Nothing is in stock yet. Preorders sell anyway and are fulfilled later, outside the code ledger.
    let catalog = TestCatalog::with_products(vec![snapshot("upcoming-game", 2500, InventoryMode::Preorder, 0)]);
    let (db, api) = new_checkout_api(&url, catalog).await;

    let owner = CartOwner::User("frida".to_string());
    db.add_item(&owner, "upcoming-game", 1).await.unwrap();
    let summary = api.checkout(checkout_request_for("frida", false)).await.expect("Checkout failed");

    assert_eq!(summary.order.status, OrderStatus::Confirmed);
    assert_eq!(summary.order.payment.status, PaymentStatus::Completed);
    assert!(summary.all_codes_delivered);
    let item = &summary.order.items[0];
    assert!(!item.code_gated);
    assert!(!item.code_delivered);
    assert!(item.codes.is_empty());

    // A preorder is not a shortfall: the reconciliation query ignores it.
    let flagged = db.search_orders(OrderQueryFilter::default().with_undelivered_codes()).await.unwrap();
    assert!(flagged.is_empty());
}

#[tokio::test]
async fn promotion_per_user_limit_holds_across_orders() {
    let url = random_db_path("checkout_promo_limit");
    prepare_test_env(&url).await;
    let catalog = TestCatalog::with_products(vec![snapshot("album-a", 800, InventoryMode::Unlimited, 0)]);
    let (db, api) = new_checkout_api(&url, catalog).await;
    seed_promotion(&db, "SAVE10", 10, 1).await;

    let owner = CartOwner::User("dave".to_string());
    let mut request = checkout_request_for("dave", false);
    request.promotion_code = Some("save10".to_string());

    db.add_item(&owner, "album-a", 1).await.unwrap();
    let first = api.checkout(request.clone()).await.expect("First checkout failed");
    assert_eq!(first.order.discount, Money::from_cents(80));
    assert_eq!(first.order.coupon_code.as_deref(), Some("SAVE10"));

    db.add_item(&owner, "album-a", 1).await.unwrap();
    let err = api.checkout(request).await.unwrap_err();
    assert!(matches!(err, CheckoutError::InvalidPromotion(_)));
}

#[tokio::test]
async fn webhook_confirmation_is_idempotent_and_tolerates_unknown_orders() {
    let url = random_db_path("checkout_webhook");
    prepare_test_env(&url).await;
    let (db, api) = new_checkout_api(&url, TestCatalog::default()).await;

    let unknown = new_order_number();
    assert!(api.confirm_payment(&unknown, "pi_webhook_1").await.unwrap().is_none());

    // An order that settled out of band and is still pending.
    let order_number = new_order_number();
    let new_order = NewOrder {
        order_number: order_number.clone(),
        customer_id: Some("erin".to_string()),
        items: vec![NewOrderItem {
            product_id: "album-a".to_string(),
            title: "Album A".to_string(),
            quantity: 1,
            price: Money::from_cents(800),
            final_price: Money::from_cents(800),
            mode: InventoryMode::Unlimited,
        }],
        subtotal: Money::from_cents(800),
        discount: Money::from_cents(0),
        tax: Money::from_cents(160),
        total: Money::from_cents(960),
        currency: "EUR".to_string(),
        payment_method: "stripe".to_string(),
        payment_status: PaymentStatus::Pending,
        transaction_id: None,
        paid_at: None,
        status: OrderStatus::Pending,
        coupon_code: None,
        is_plus_member: false,
    };
    let (order, inserted) = db.insert_order(new_order).await.unwrap();
    assert!(inserted);
    assert_eq!(order.refund.status, RefundStatus::None);

    let confirmed = api.confirm_payment(&order_number, "pi_webhook_2").await.unwrap().expect("Order should exist");
    assert_eq!(confirmed.status, OrderStatus::Confirmed);
    assert_eq!(confirmed.payment.status, PaymentStatus::Completed);
    assert_eq!(confirmed.payment.transaction_id.as_deref(), Some("pi_webhook_2"));

    // Redelivery of the same webhook changes nothing.
    let again = api.confirm_payment(&order_number, "pi_webhook_3").await.unwrap().unwrap();
    assert_eq!(again.payment.transaction_id.as_deref(), Some("pi_webhook_2"));
    assert_eq!(again.status, OrderStatus::Confirmed);
}
