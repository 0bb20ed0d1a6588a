//! Data types for the KeyMart fulfilment engine.
//!
//! Everything that crosses the database boundary or the public API lives here: order and cart records, the status
//! enums with their transition rules, activation codes, and promotions. The types are backend-agnostic; the sqlite
//! module maps them onto its schema via the `sqlx` derives.

use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use km_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

/// Hard cap on the quantity of a single product in a cart.
pub const MAX_ITEM_QUANTITY: u32 = 10;

/// Abandoned carts expire this long after their last write.
pub const CART_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------     OrderNumber     ---------------------------------------------------------
/// The externally visible, human-shareable order identifier. Distinct from the internal primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderNumber(pub String);

impl FromStr for OrderNumber {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl OrderNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------    InventoryMode    ---------------------------------------------------------
/// How a product's stock is fulfilled.
///
/// Only `Limited` products are code-gated: their fulfilment draws from a finite pool of activation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InventoryMode {
    Limited,
    Unlimited,
    Preorder,
}

impl Display for InventoryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InventoryMode::Limited => write!(f, "limited"),
            InventoryMode::Unlimited => write!(f, "unlimited"),
            InventoryMode::Preorder => write!(f, "preorder"),
        }
    }
}

impl FromStr for InventoryMode {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "limited" => Ok(Self::Limited),
            "unlimited" => Ok(Self::Unlimited),
            "preorder" => Ok(Self::Preorder),
            s => Err(ConversionError(format!("Invalid inventory mode: {s}"))),
        }
    }
}

//--------------------------------------    ProductStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Draft,
    Active,
    Inactive,
    Discontinued,
}

//--------------------------------------   ProductSnapshot   ---------------------------------------------------------
/// What the catalog collaborator reports for a product, as of call time.
///
/// The engine never subscribes to catalog changes; a snapshot is resolved once per operation, and an order's prices
/// are locked in from the snapshot used at commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: String,
    pub title: String,
    pub status: ProductStatus,
    pub base_price: Money,
    pub sale_price: Option<Money>,
    /// Additional discount percentage for plus members, 0-100.
    pub plus_discount_pct: u32,
    pub mode: InventoryMode,
    /// Currently available units. Derived from the unused-code count for limited pools.
    pub available: i64,
}

impl ProductSnapshot {
    /// The advertised price: sale price when set, base price otherwise.
    pub fn list_price(&self) -> Money {
        self.sale_price.unwrap_or(self.base_price)
    }

    /// The price a particular user pays, with the plus-member discount applied and rounded half-up to the cent.
    pub fn price_for(&self, is_plus_member: bool) -> Money {
        let price = self.list_price();
        if is_plus_member && self.plus_discount_pct > 0 {
            price.percent(100 - self.plus_discount_pct.min(100))
        } else {
            price
        }
    }

    pub fn is_purchasable(&self) -> bool {
        self.status == ProductStatus::Active
    }
}

//--------------------------------------   ActivationCode    ---------------------------------------------------------
/// A single-use redeemable code tied to one unit of a limited product.
///
/// `is_used` transitions false → true exactly once, via the atomic claim in the inventory ledger. The reverse
/// transition happens only through an explicit release on refund.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ActivationCode {
    pub id: i64,
    pub product_id: String,
    pub code: String,
    pub is_used: bool,
    pub used_by_order: Option<i64>,
    pub used_at: Option<DateTime<Utc>>,
}

//--------------------------------------      CartOwner      ---------------------------------------------------------
/// A cart belongs to exactly one identity: an authenticated user, or an anonymous session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CartOwner {
    User(String),
    Session(String),
}

impl Display for CartOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CartOwner::User(id) => write!(f, "user:{id}"),
            CartOwner::Session(token) => write!(f, "session:{token}"),
        }
    }
}

//--------------------------------------        Cart         ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub id: i64,
    pub owner: CartOwner,
    pub items: Vec<CartItem>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_items(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    pub fn expiry_from(now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::days(CART_TTL_DAYS)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub quantity: u32,
}

//--------------------------------------     OrderStatus     ---------------------------------------------------------
/// Order lifecycle status. Transitions are restricted to the graph encoded in [`OrderStatus::can_transition_to`];
/// `Cancelled` and `Refunded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Confirmed,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, Processing | Confirmed | Cancelled)
                | (Processing, Confirmed | Cancelled)
                | (Confirmed, Shipped | Delivered | Cancelled | Refunded)
                | (Shipped, Delivered | Refunded)
                | (Delivered, Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "confirmed" => Ok(Self::Confirmed),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------    PaymentStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------     RefundStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    None,
    Requested,
    Approved,
    Processing,
    Completed,
    Denied,
}

impl Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RefundStatus::None => "none",
            RefundStatus::Requested => "requested",
            RefundStatus::Approved => "approved",
            RefundStatus::Processing => "processing",
            RefundStatus::Completed => "completed",
            RefundStatus::Denied => "denied",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------    PaymentMethod    ---------------------------------------------------------
/// How the customer pays. `Mock` always settles successfully without contacting any gateway and exists for
/// deterministic testing and development.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Mock,
    Stripe { method_ref: String },
    Paypal { method_ref: String },
    BankTransfer { reference: String },
}

impl PaymentMethod {
    /// Stable label stored on the order record.
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Mock => "mock",
            PaymentMethod::Stripe { .. } => "stripe",
            PaymentMethod::Paypal { .. } => "paypal",
            PaymentMethod::BankTransfer { .. } => "bank-transfer",
        }
    }

    /// The opaque reference handed to the gateway.
    pub fn method_ref(&self) -> &str {
        match self {
            PaymentMethod::Mock => "mock_payment",
            PaymentMethod::Stripe { method_ref } | PaymentMethod::Paypal { method_ref } => method_ref,
            PaymentMethod::BankTransfer { reference } => reference,
        }
    }
}

//--------------------------------------      PaymentInfo    ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentInfo {
    #[sqlx(rename = "payment_method")]
    pub method: String,
    #[sqlx(rename = "payment_status")]
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    #[sqlx(rename = "payment_failure_reason")]
    pub failure_reason: Option<String>,
}

//--------------------------------------      RefundInfo     ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RefundInfo {
    #[sqlx(rename = "refund_status")]
    pub status: RefundStatus,
    #[sqlx(rename = "refund_amount")]
    pub amount: Option<Money>,
    #[sqlx(rename = "refund_reason")]
    pub reason: Option<String>,
    #[sqlx(rename = "refund_requested_at")]
    pub requested_at: Option<DateTime<Utc>>,
    #[sqlx(rename = "refund_processed_at")]
    pub processed_at: Option<DateTime<Utc>>,
}

//--------------------------------------      OrderItem      ---------------------------------------------------------
/// One line of a committed order. `price` and `final_price` are locked in at commit time and never recomputed from
/// the live catalog.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub product_id: String,
    pub title: String,
    pub quantity: u32,
    /// Catalog list price per unit at commit time.
    pub price: Money,
    /// Per-unit price actually charged, after the plus-member discount.
    pub final_price: Money,
    /// True when fulfilment draws on a finite code pool. An undelivered code-gated item after a successful payment
    /// is the durable signal for manual reconciliation.
    pub code_gated: bool,
    pub code_delivered: bool,
    #[sqlx(skip)]
    pub codes: Vec<DeliveredCode>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeliveredCode {
    pub code: String,
    pub delivered_at: DateTime<Utc>,
}

//--------------------------------------        Order        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_number: OrderNumber,
    pub customer_id: Option<String>,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
    pub currency: String,
    #[sqlx(flatten)]
    pub payment: PaymentInfo,
    #[sqlx(flatten)]
    pub refund: RefundInfo,
    pub status: OrderStatus,
    pub coupon_code: Option<String>,
    pub is_plus_member: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Derived predicate, never stored: cancellation is allowed before fulfilment starts.
    pub fn can_be_cancelled(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Pending | OrderStatus::Processing | OrderStatus::Confirmed
        )
    }

    /// Derived predicate: a refund may be requested once, on a settled order.
    pub fn can_be_refunded(&self) -> bool {
        self.payment.status == PaymentStatus::Completed && self.refund.status == RefundStatus::None
    }
}

//--------------------------------------       NewOrder      ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: OrderNumber,
    pub customer_id: Option<String>,
    pub items: Vec<NewOrderItem>,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
    pub currency: String,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub status: OrderStatus,
    pub coupon_code: Option<String>,
    pub is_plus_member: bool,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: String,
    pub title: String,
    pub quantity: u32,
    pub price: Money,
    pub final_price: Money,
    pub mode: InventoryMode,
}

//--------------------------------------     TimelineEntry   ---------------------------------------------------------
/// One entry in an order's append-only audit trail. The timeline is never edited or truncated.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub id: i64,
    pub order_id: i64,
    /// A status label, e.g. `confirmed`, `payment_completed`, `refund_requested`.
    pub status: String,
    pub note: Option<String>,
    /// Display form of the [`Actor`] that caused the entry.
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------        Actor        ---------------------------------------------------------
/// Who caused a state change. Stored in the timeline in its display form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Actor {
    System,
    Admin(String),
    Customer(String),
}

impl Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::System => write!(f, "system"),
            Actor::Admin(id) => write!(f, "admin:{id}"),
            Actor::Customer(id) => write!(f, "customer:{id}"),
        }
    }
}

impl FromStr for Actor {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "system" {
            return Ok(Actor::System);
        }
        if let Some(id) = s.strip_prefix("admin:") {
            return Ok(Actor::Admin(id.to_string()));
        }
        if let Some(id) = s.strip_prefix("customer:") {
            return Ok(Actor::Customer(id.to_string()));
        }
        Err(ConversionError(format!("Invalid actor: {s}")))
    }
}

//--------------------------------------  CustomerIdentity   ---------------------------------------------------------
/// The authenticated identity supplied by the (external) auth collaborator. The engine never issues or validates
/// credentials itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerIdentity {
    pub customer_id: String,
    pub is_plus_member: bool,
}

//--------------------------------------     Promotion       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PromotionKind {
    Percentage,
    Fixed,
}

/// A coupon. Validity is a pure predicate over the clock, the user's prior usage count and the cart subtotal;
/// checking it never mutates anything. Usage is recorded only as part of a successful order commit.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Promotion {
    /// Stored upper-cased; lookups are case-insensitive.
    pub code: String,
    pub kind: PromotionKind,
    /// Percentage points for [`PromotionKind::Percentage`], minor units for [`PromotionKind::Fixed`].
    pub value: i64,
    pub min_purchase: Money,
    pub max_discount: Option<Money>,
    pub usage_limit: Option<i64>,
    pub usage_per_user: i64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_active: bool,
    pub times_used: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromotionRejection {
    #[error("The promotion is not active")]
    Inactive,
    #[error("The promotion is not valid yet")]
    NotStarted,
    #[error("The promotion has expired")]
    Expired,
    #[error("The promotion's usage limit has been reached")]
    Exhausted,
    #[error("A minimum purchase of {required} is needed for this promotion")]
    BelowMinimumPurchase { required: Money },
    #[error("You have already used this promotion the maximum number of times")]
    PerUserLimitReached,
}

impl Promotion {
    /// Pure eligibility check. `prior_user_uses` is the number of orders this customer has already committed with
    /// this code; pass 0 for anonymous checkouts.
    pub fn is_valid(
        &self,
        now: DateTime<Utc>,
        prior_user_uses: i64,
        cart_subtotal: Money,
    ) -> Result<(), PromotionRejection> {
        if !self.is_active {
            return Err(PromotionRejection::Inactive);
        }
        if now < self.starts_at {
            return Err(PromotionRejection::NotStarted);
        }
        if now > self.ends_at {
            return Err(PromotionRejection::Expired);
        }
        if let Some(limit) = self.usage_limit {
            if self.times_used >= limit {
                return Err(PromotionRejection::Exhausted);
            }
        }
        if cart_subtotal < self.min_purchase {
            return Err(PromotionRejection::BelowMinimumPurchase { required: self.min_purchase });
        }
        if prior_user_uses >= self.usage_per_user {
            return Err(PromotionRejection::PerUserLimitReached);
        }
        Ok(())
    }

    /// The discount this promotion grants on `subtotal`, clipped to `max_discount` and to `[0, subtotal]`.
    pub fn discount_for(&self, subtotal: Money) -> Money {
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let mut discount = match self.kind {
            PromotionKind::Percentage => subtotal.percent(self.value.clamp(0, 100) as u32),
            PromotionKind::Fixed => Money::from_cents(self.value),
        };
        if let Some(cap) = self.max_discount {
            if discount > cap {
                discount = cap;
            }
        }
        discount.clamp_non_negative().min(subtotal)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn allowed(from: OrderStatus) -> Vec<OrderStatus> {
        use OrderStatus::*;
        match from {
            Pending => vec![Processing, Confirmed, Cancelled],
            Processing => vec![Confirmed, Cancelled],
            Confirmed => vec![Shipped, Delivered, Cancelled, Refunded],
            Shipped => vec![Delivered, Refunded],
            Delivered => vec![Refunded],
            Cancelled | Refunded => vec![],
        }
    }

    #[test]
    fn transition_closure() {
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                let expected = allowed(from).contains(&to);
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "transition {from} -> {to} should be {expected}"
                );
            }
        }
    }

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Refunded.is_terminal());
        assert!(!OrderStatus::Confirmed.is_terminal());
    }

    fn snapshot(base: i64, sale: Option<i64>, plus_pct: u32) -> ProductSnapshot {
        ProductSnapshot {
            product_id: "p1".to_string(),
            title: "Test Game".to_string(),
            status: ProductStatus::Active,
            base_price: Money::from_cents(base),
            sale_price: sale.map(Money::from_cents),
            plus_discount_pct: plus_pct,
            mode: InventoryMode::Limited,
            available: 5,
        }
    }

    #[test]
    fn plus_member_price_rounds_half_up() {
        let p = snapshot(1000, None, 10);
        assert_eq!(p.price_for(false), Money::from_cents(1000));
        assert_eq!(p.price_for(true), Money::from_cents(900));
        // 9.99 with 15% off = 8.4915 -> 8.49
        let p = snapshot(999, None, 15);
        assert_eq!(p.price_for(true), Money::from_cents(849));
        // 0.05 with 50% off = 0.025 -> 0.03 (half-up)
        let p = snapshot(5, None, 50);
        assert_eq!(p.price_for(true), Money::from_cents(3));
    }

    #[test]
    fn sale_price_wins() {
        let p = snapshot(1000, Some(750), 0);
        assert_eq!(p.list_price(), Money::from_cents(750));
        assert_eq!(p.price_for(true), Money::from_cents(750));
    }

    fn promo(kind: PromotionKind, value: i64) -> Promotion {
        Promotion {
            code: "SAVE10".to_string(),
            kind,
            value,
            min_purchase: Money::from_cents(0),
            max_discount: None,
            usage_limit: None,
            usage_per_user: 1,
            starts_at: Utc::now() - Duration::days(1),
            ends_at: Utc::now() + Duration::days(1),
            is_active: true,
            times_used: 0,
        }
    }

    #[test]
    fn promotion_validity_window() {
        let p = promo(PromotionKind::Percentage, 10);
        let now = Utc::now();
        assert!(p.is_valid(now, 0, Money::from_major(50)).is_ok());
        assert_eq!(
            p.is_valid(now - Duration::days(2), 0, Money::from_major(50)),
            Err(PromotionRejection::NotStarted)
        );
        assert_eq!(
            p.is_valid(now + Duration::days(2), 0, Money::from_major(50)),
            Err(PromotionRejection::Expired)
        );
    }

    #[test]
    fn promotion_per_user_limit() {
        let p = promo(PromotionKind::Fixed, 500);
        let now = Utc::now();
        assert!(p.is_valid(now, 0, Money::from_major(50)).is_ok());
        assert_eq!(p.is_valid(now, 1, Money::from_major(50)), Err(PromotionRejection::PerUserLimitReached));
    }

    #[test]
    fn promotion_exhaustion_and_minimum() {
        let mut p = promo(PromotionKind::Percentage, 10);
        p.usage_limit = Some(3);
        p.times_used = 3;
        let now = Utc::now();
        assert_eq!(p.is_valid(now, 0, Money::from_major(50)), Err(PromotionRejection::Exhausted));
        p.times_used = 2;
        p.min_purchase = Money::from_major(20);
        assert_eq!(
            p.is_valid(now, 0, Money::from_major(10)),
            Err(PromotionRejection::BelowMinimumPurchase { required: Money::from_major(20) })
        );
    }

    #[test]
    fn discount_clipping() {
        let mut p = promo(PromotionKind::Percentage, 50);
        p.max_discount = Some(Money::from_major(5));
        // 50% of 20.00 is 10.00, capped at 5.00
        assert_eq!(p.discount_for(Money::from_major(20)), Money::from_major(5));

        let p = promo(PromotionKind::Fixed, 5000);
        // Fixed 50.00 against a 20.00 subtotal clips to the subtotal
        assert_eq!(p.discount_for(Money::from_major(20)), Money::from_major(20));
    }

    #[test]
    fn actor_round_trip() {
        for actor in [Actor::System, Actor::Admin("7".into()), Actor::Customer("c42".into())] {
            let s = actor.to_string();
            assert_eq!(s.parse::<Actor>().unwrap(), actor);
        }
        assert!("gremlin:9".parse::<Actor>().is_err());
    }
}
