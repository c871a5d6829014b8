//! Order pricing.
//!
//! Everything here is pure: callers load products, offers and the coupon,
//! then [`price_order`] turns them into a [`PriceBreakdown`] that is stored
//! verbatim on the order. Amounts are integer minor currency units.

use chrono::{DateTime, Utc};
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "value")]
    Value,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum OfferKind {
    /// Applied automatically to every covered product while live.
    #[sea_orm(string_value = "discount")]
    Discount,
    /// Applied only when the order carries the offer's coupon code.
    #[sea_orm(string_value = "coupon")]
    Coupon,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("Order has no items")]
    EmptyOrder,
    #[error("Invalid quantity for product {0}")]
    InvalidQuantity(Uuid),
    #[error("Order amount overflow")]
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DiscountTerms {
    pub discount_type: DiscountType,
    pub discount_value: i64,
}

impl DiscountTerms {
    pub fn new(discount_type: DiscountType, discount_value: i64) -> Self {
        Self {
            discount_type,
            discount_value,
        }
    }

    /// Discount for one unit priced at `price`, clamped to `[0, price]`.
    pub fn unit_discount(&self, price: i64) -> i64 {
        if price <= 0 || self.discount_value <= 0 {
            return 0;
        }
        let raw = match self.discount_type {
            DiscountType::Percentage => {
                let pct = i128::from(self.discount_value.min(100));
                // round half up
                ((i128::from(price) * pct + 50) / 100) as i64
            }
            DiscountType::Value => self.discount_value,
        };
        raw.clamp(0, price)
    }

    /// Checks the value against the type: percentages are 1..=100, values are positive.
    pub fn validate(&self) -> Result<(), String> {
        match self.discount_type {
            DiscountType::Percentage if !(1..=100).contains(&self.discount_value) => {
                Err("percentage discount must be between 1 and 100".into())
            }
            DiscountType::Value if self.discount_value <= 0 => {
                Err("value discount must be greater than 0".into())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OfferTerms {
    pub offer_id: Uuid,
    pub kind: OfferKind,
    pub terms: DiscountTerms,
    pub coupon_code: Option<String>,
    pub product_ids: Vec<Uuid>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl OfferTerms {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && now <= self.end_date
    }

    pub fn covers(&self, product_id: Uuid) -> bool {
        self.product_ids.contains(&product_id)
    }

    fn unlocked_by(&self, entered_code: Option<&str>) -> bool {
        match self.kind {
            OfferKind::Discount => true,
            OfferKind::Coupon => match (entered_code, self.coupon_code.as_deref()) {
                (Some(entered), Some(own)) => normalize_code(entered) == normalize_code(own),
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponTerms {
    pub code: String,
    pub terms: DiscountTerms,
}

#[derive(Debug, Clone)]
pub struct PricingLine {
    pub product_id: Uuid,
    pub title: String,
    pub unit_price: i64,
    pub purchase_price: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub title: String,
    pub quantity: i32,
    pub unit_price: i64,
    #[serde(skip)]
    pub purchase_price: i64,
    pub offer_id: Option<Uuid>,
    pub offer_terms: Option<DiscountTerms>,
    /// Per-unit discount from the offer and any percentage coupon.
    pub discount_applied: i64,
    /// Per-unit price after discounts.
    pub final_price: i64,
    pub line_total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PriceBreakdown {
    pub lines: Vec<PricedLine>,
    pub items_subtotal: i64,
    pub discount_total: i64,
    pub subtotal: i64,
    pub coupon_code: Option<String>,
    pub coupon_discount: i64,
    pub delivery_fee: i64,
    pub total: i64,
}

pub struct PricingRequest<'a> {
    pub lines: &'a [PricingLine],
    pub offers: &'a [OfferTerms],
    /// Code as entered by the customer; unlocks coupon-kind offers.
    pub entered_code: Option<&'a str>,
    /// Resolved coupon record, if the entered code names a valid one.
    pub coupon: Option<&'a CouponTerms>,
    pub delivery_fee: i64,
    pub now: DateTime<Utc>,
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Best live offer for `product_id` at `price`, as `(offer, unit discount)`.
pub fn best_offer<'a>(
    offers: &'a [OfferTerms],
    product_id: Uuid,
    price: i64,
    entered_code: Option<&str>,
    now: DateTime<Utc>,
) -> Option<(&'a OfferTerms, i64)> {
    offers
        .iter()
        .filter(|o| o.is_live(now) && o.covers(product_id) && o.unlocked_by(entered_code))
        .map(|o| (o, o.terms.unit_discount(price)))
        .filter(|(_, discount)| *discount > 0)
        .fold(None, |best, (o, discount)| match best {
            Some((_, best_discount)) if best_discount >= discount => best,
            _ => Some((o, discount)),
        })
}

pub fn price_order(req: &PricingRequest<'_>) -> Result<PriceBreakdown, PricingError> {
    if req.lines.is_empty() {
        return Err(PricingError::EmptyOrder);
    }

    let entered_code = req
        .entered_code
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let mut lines = Vec::with_capacity(req.lines.len());
    let mut items_subtotal: i64 = 0;
    let mut discount_total: i64 = 0;
    let mut subtotal: i64 = 0;

    for line in req.lines {
        if line.quantity <= 0 {
            return Err(PricingError::InvalidQuantity(line.product_id));
        }
        let qty = i64::from(line.quantity);

        let offer = best_offer(
            req.offers,
            line.product_id,
            line.unit_price,
            entered_code,
            req.now,
        );
        let mut discount = offer.map(|(_, d)| d).unwrap_or(0);

        if let Some(coupon) = req.coupon
            && coupon.terms.discount_type == DiscountType::Percentage
        {
            discount += coupon.terms.unit_discount(line.unit_price - discount);
        }

        let final_price = line.unit_price - discount;
        let line_total = final_price.checked_mul(qty).ok_or(PricingError::Overflow)?;

        items_subtotal = line
            .unit_price
            .checked_mul(qty)
            .and_then(|v| items_subtotal.checked_add(v))
            .ok_or(PricingError::Overflow)?;
        discount_total = discount
            .checked_mul(qty)
            .and_then(|v| discount_total.checked_add(v))
            .ok_or(PricingError::Overflow)?;
        subtotal = subtotal
            .checked_add(line_total)
            .ok_or(PricingError::Overflow)?;

        lines.push(PricedLine {
            product_id: line.product_id,
            title: line.title.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            purchase_price: line.purchase_price,
            offer_id: offer.map(|(o, _)| o.offer_id),
            offer_terms: offer.map(|(o, _)| o.terms),
            discount_applied: discount,
            final_price,
            line_total,
        });
    }

    let coupon_discount = match req.coupon {
        Some(coupon) if coupon.terms.discount_type == DiscountType::Value => {
            coupon.terms.unit_discount(subtotal)
        }
        _ => 0,
    };

    let total = (subtotal - coupon_discount)
        .checked_add(req.delivery_fee)
        .ok_or(PricingError::Overflow)?;

    Ok(PriceBreakdown {
        lines,
        items_subtotal,
        discount_total,
        subtotal,
        coupon_code: req
            .coupon
            .map(|c| c.code.clone())
            .or_else(|| entered_code.map(normalize_code)),
        coupon_discount,
        delivery_fee: req.delivery_fee,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn line(product_id: Uuid, price: i64, qty: i32) -> PricingLine {
        PricingLine {
            product_id,
            title: "Item".into(),
            unit_price: price,
            purchase_price: price / 2,
            quantity: qty,
        }
    }

    fn offer(product_id: Uuid, kind: OfferKind, terms: DiscountTerms) -> OfferTerms {
        let now = Utc::now();
        OfferTerms {
            offer_id: Uuid::new_v4(),
            kind,
            terms,
            coupon_code: match kind {
                OfferKind::Coupon => Some("SPRING".into()),
                OfferKind::Discount => None,
            },
            product_ids: vec![product_id],
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(1),
        }
    }

    fn request<'a>(
        lines: &'a [PricingLine],
        offers: &'a [OfferTerms],
        coupon: Option<&'a CouponTerms>,
    ) -> PricingRequest<'a> {
        PricingRequest {
            lines,
            offers,
            entered_code: coupon.map(|c| c.code.as_str()),
            coupon,
            delivery_fee: 500,
            now: Utc::now(),
        }
    }

    #[test]
    fn percentage_rounds_half_up() {
        let terms = DiscountTerms::new(DiscountType::Percentage, 10);
        assert_eq!(terms.unit_discount(1000), 100);
        assert_eq!(terms.unit_discount(995), 100);
        assert_eq!(terms.unit_discount(994), 99);
    }

    #[test]
    fn value_discount_never_exceeds_price() {
        let terms = DiscountTerms::new(DiscountType::Value, 5000);
        assert_eq!(terms.unit_discount(1200), 1200);
        assert_eq!(terms.unit_discount(0), 0);
    }

    #[test]
    fn validate_rejects_out_of_range_percentages() {
        assert!(DiscountTerms::new(DiscountType::Percentage, 0).validate().is_err());
        assert!(DiscountTerms::new(DiscountType::Percentage, 101).validate().is_err());
        assert!(DiscountTerms::new(DiscountType::Percentage, 100).validate().is_ok());
        assert!(DiscountTerms::new(DiscountType::Value, 0).validate().is_err());
    }

    #[test]
    fn plain_lines_sum_with_delivery_fee() {
        let lines = [line(Uuid::new_v4(), 1000, 2), line(Uuid::new_v4(), 250, 4)];
        let breakdown = price_order(&request(&lines, &[], None)).unwrap();
        assert_eq!(breakdown.items_subtotal, 3000);
        assert_eq!(breakdown.discount_total, 0);
        assert_eq!(breakdown.subtotal, 3000);
        assert_eq!(breakdown.total, 3500);
    }

    #[test]
    fn best_discount_offer_wins() {
        let id = Uuid::new_v4();
        let offers = [
            offer(id, OfferKind::Discount, DiscountTerms::new(DiscountType::Percentage, 10)),
            offer(id, OfferKind::Discount, DiscountTerms::new(DiscountType::Value, 300)),
        ];
        let lines = [line(id, 2000, 1)];
        let breakdown = price_order(&request(&lines, &offers, None)).unwrap();
        let priced = &breakdown.lines[0];
        assert_eq!(priced.discount_applied, 300);
        assert_eq!(priced.offer_id, Some(offers[1].offer_id));
        assert_eq!(priced.final_price, 1700);
    }

    #[test]
    fn expired_offer_is_ignored() {
        let id = Uuid::new_v4();
        let mut expired = offer(id, OfferKind::Discount, DiscountTerms::new(DiscountType::Value, 100));
        expired.end_date = Utc::now() - Duration::hours(1);
        let lines = [line(id, 1000, 1)];
        let breakdown = price_order(&request(&lines, &[expired], None)).unwrap();
        assert_eq!(breakdown.lines[0].final_price, 1000);
        assert_eq!(breakdown.lines[0].offer_id, None);
    }

    #[test]
    fn coupon_offer_needs_matching_code() {
        let id = Uuid::new_v4();
        let offers = [offer(id, OfferKind::Coupon, DiscountTerms::new(DiscountType::Percentage, 50))];
        let lines = [line(id, 1000, 1)];

        let without = price_order(&request(&lines, &offers, None)).unwrap();
        assert_eq!(without.lines[0].final_price, 1000);

        let mut req = request(&lines, &offers, None);
        req.entered_code = Some(" spring ");
        let with = price_order(&req).unwrap();
        assert_eq!(with.lines[0].final_price, 500);
        assert_eq!(with.coupon_code.as_deref(), Some("SPRING"));
    }

    #[test]
    fn percentage_coupon_stacks_on_offer_price() {
        let id = Uuid::new_v4();
        let offers = [offer(id, OfferKind::Discount, DiscountTerms::new(DiscountType::Percentage, 20))];
        let coupon = CouponTerms {
            code: "TEN".into(),
            terms: DiscountTerms::new(DiscountType::Percentage, 10),
        };
        let lines = [line(id, 1000, 3)];
        let breakdown = price_order(&request(&lines, &offers, Some(&coupon))).unwrap();
        let priced = &breakdown.lines[0];
        assert_eq!(priced.discount_applied, 280);
        assert_eq!(priced.final_price, 720);
        assert_eq!(priced.line_total, 2160);
        assert_eq!(breakdown.coupon_discount, 0);
        assert_eq!(breakdown.total, 2660);
    }

    #[test]
    fn value_coupon_applies_once_and_is_capped() {
        let lines = [line(Uuid::new_v4(), 300, 1)];
        let coupon = CouponTerms {
            code: "BIG".into(),
            terms: DiscountTerms::new(DiscountType::Value, 1000),
        };
        let breakdown = price_order(&request(&lines, &[], Some(&coupon))).unwrap();
        assert_eq!(breakdown.coupon_discount, 300);
        assert_eq!(breakdown.total, 500);
    }

    #[test]
    fn rejects_empty_and_non_positive_quantity() {
        assert_eq!(
            price_order(&request(&[], &[], None)),
            Err(PricingError::EmptyOrder)
        );
        let id = Uuid::new_v4();
        let lines = [line(id, 100, 0)];
        assert_eq!(
            price_order(&request(&lines, &[], None)),
            Err(PricingError::InvalidQuantity(id))
        );
    }

    #[test]
    fn overflow_is_reported() {
        let lines = [line(Uuid::new_v4(), i64::MAX / 2, 3)];
        assert_eq!(
            price_order(&request(&lines, &[], None)),
            Err(PricingError::Overflow)
        );
    }
}
