//! The pricing calculator.
//!
//! A pure function from (catalog snapshots, membership flag, optional promotion) to a fully rounded price breakdown.
//! Nothing in here touches a clock, a random source or storage: `now` is passed in for the promotion validity
//! window, and every rounding step happens on [`Money`] at the cent boundary. Pricing the same inputs twice yields
//! byte-identical output, which is what makes stored order pricing reproducible for audits and refunds.

use chrono::{DateTime, Utc};
use km_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{Promotion, PromotionRejection, ProductSnapshot};

/// Flat tax rate applied to the discounted subtotal, in basis points.
pub const DEFAULT_TAX_RATE_BPS: u32 = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("Quantity for product {product_id} must be between 1 and {max}")]
    QuantityOutOfRange { product_id: String, max: u32 },
    #[error("The promotion cannot be applied: {0}")]
    InvalidPromotion(#[from] PromotionRejection),
}

/// One priced cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: String,
    pub title: String,
    pub quantity: u32,
    /// Catalog list price (sale price when on sale).
    pub unit_price: Money,
    /// Per-unit price after the plus-member discount, rounded half-up.
    pub user_price: Money,
    pub line_total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub lines: Vec<PricedLine>,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
}

/// Price a cart against a set of catalog snapshots.
///
/// `prior_promo_uses` is the number of orders the customer has already committed with the supplied promotion code;
/// it feeds the per-user limit check and is 0 for anonymous checkouts. An invalid promotion is an error, never a
/// silent no-op.
pub fn price_cart(
    lines: &[(ProductSnapshot, u32)],
    is_plus_member: bool,
    promotion: Option<&Promotion>,
    prior_promo_uses: i64,
    now: DateTime<Utc>,
    tax_rate_bps: u32,
) -> Result<PriceBreakdown, PricingError> {
    let mut priced = Vec::with_capacity(lines.len());
    for (snapshot, quantity) in lines {
        if *quantity == 0 || *quantity > crate::db_types::MAX_ITEM_QUANTITY {
            return Err(PricingError::QuantityOutOfRange {
                product_id: snapshot.product_id.clone(),
                max: crate::db_types::MAX_ITEM_QUANTITY,
            });
        }
        let unit_price = snapshot.list_price();
        let user_price = snapshot.price_for(is_plus_member);
        priced.push(PricedLine {
            product_id: snapshot.product_id.clone(),
            title: snapshot.title.clone(),
            quantity: *quantity,
            unit_price,
            user_price,
            line_total: user_price * i64::from(*quantity),
        });
    }
    let subtotal: Money = priced.iter().map(|l| l.line_total).sum();

    let discount = match promotion {
        Some(promo) => {
            promo.is_valid(now, prior_promo_uses, subtotal)?;
            promo.discount_for(subtotal)
        },
        None => Money::from_cents(0),
    };

    let tax = (subtotal - discount).basis_points(tax_rate_bps);
    let total = subtotal - discount + tax;
    Ok(PriceBreakdown { lines: priced, subtotal, discount, tax, total })
}

#[cfg(test)]
mod test {
    use chrono::Duration;
    use km_common::Money;

    use super::*;
    use crate::db_types::{InventoryMode, ProductStatus, PromotionKind};

    fn product(id: &str, base_cents: i64, plus_pct: u32) -> ProductSnapshot {
        ProductSnapshot {
            product_id: id.to_string(),
            title: format!("Product {id}"),
            status: ProductStatus::Active,
            base_price: Money::from_cents(base_cents),
            sale_price: None,
            plus_discount_pct: plus_pct,
            mode: InventoryMode::Limited,
            available: 10,
        }
    }

    #[test]
    fn plus_member_scenario() {
        // 2x 10.00 product with a 10% plus discount, 20% tax:
        // user price 9.00, subtotal 18.00, tax 3.60, total 21.60
        let lines = vec![(product("a", 1000, 10), 2)];
        let breakdown = price_cart(&lines, true, None, 0, Utc::now(), DEFAULT_TAX_RATE_BPS).unwrap();
        assert_eq!(breakdown.lines[0].user_price, Money::from_cents(900));
        assert_eq!(breakdown.subtotal, Money::from_cents(1800));
        assert_eq!(breakdown.discount, Money::from_cents(0));
        assert_eq!(breakdown.tax, Money::from_cents(360));
        assert_eq!(breakdown.total, Money::from_cents(2160));
    }

    #[test]
    fn non_member_pays_list_price() {
        let lines = vec![(product("a", 1000, 10), 2)];
        let breakdown = price_cart(&lines, false, None, 0, Utc::now(), DEFAULT_TAX_RATE_BPS).unwrap();
        assert_eq!(breakdown.subtotal, Money::from_cents(2000));
        assert_eq!(breakdown.total, Money::from_cents(2400));
    }

    #[test]
    fn deterministic_and_idempotent() {
        let now = Utc::now();
        let lines = vec![(product("a", 999, 15), 3), (product("b", 2499, 0), 1)];
        let promo = Promotion {
            code: "TEN".to_string(),
            kind: PromotionKind::Percentage,
            value: 10,
            min_purchase: Money::from_cents(0),
            max_discount: None,
            usage_limit: None,
            usage_per_user: 1,
            starts_at: now - Duration::hours(1),
            ends_at: now + Duration::hours(1),
            is_active: true,
            times_used: 0,
        };
        let first = price_cart(&lines, true, Some(&promo), 0, now, DEFAULT_TAX_RATE_BPS).unwrap();
        let second = price_cart(&lines, true, Some(&promo), 0, now, DEFAULT_TAX_RATE_BPS).unwrap();
        assert_eq!(first, second);
        // Totals recompose exactly from the stored fields
        assert_eq!(first.total, first.subtotal - first.discount + first.tax);
    }

    #[test]
    fn invalid_promotion_is_an_error() {
        let now = Utc::now();
        let lines = vec![(product("a", 1000, 0), 1)];
        let promo = Promotion {
            code: "OLD".to_string(),
            kind: PromotionKind::Fixed,
            value: 100,
            min_purchase: Money::from_cents(0),
            max_discount: None,
            usage_limit: None,
            usage_per_user: 1,
            starts_at: now - Duration::days(10),
            ends_at: now - Duration::days(5),
            is_active: true,
            times_used: 0,
        };
        let err = price_cart(&lines, false, Some(&promo), 0, now, DEFAULT_TAX_RATE_BPS).unwrap_err();
        assert_eq!(err, PricingError::InvalidPromotion(PromotionRejection::Expired));
    }

    #[test]
    fn discount_never_exceeds_subtotal() {
        let now = Utc::now();
        let lines = vec![(product("a", 500, 0), 1)];
        let promo = Promotion {
            code: "BIG".to_string(),
            kind: PromotionKind::Fixed,
            value: 10_000,
            min_purchase: Money::from_cents(0),
            max_discount: None,
            usage_limit: None,
            usage_per_user: 1,
            starts_at: now - Duration::hours(1),
            ends_at: now + Duration::hours(1),
            is_active: true,
            times_used: 0,
        };
        let breakdown = price_cart(&lines, false, Some(&promo), 0, now, DEFAULT_TAX_RATE_BPS).unwrap();
        assert_eq!(breakdown.discount, Money::from_cents(500));
        assert_eq!(breakdown.total, Money::from_cents(0));
    }

    #[test]
    fn zero_quantity_rejected() {
        let lines = vec![(product("a", 500, 0), 0)];
        let err = price_cart(&lines, false, None, 0, Utc::now(), DEFAULT_TAX_RATE_BPS).unwrap_err();
        assert!(matches!(err, PricingError::QuantityOutOfRange { .. }));
    }
}
