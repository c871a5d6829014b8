use chrono::{Duration, Utc};
use storefront_api::{
    order_status::{Actor, OrderStatus, TransitionError},
    pricing::{
        CouponTerms, DiscountTerms, DiscountType, OfferKind, OfferTerms, PricingLine,
        PricingRequest, normalize_code, price_order,
    },
};
use uuid::Uuid;

fn percentage_offer(product_id: Uuid, pct: i64) -> OfferTerms {
    let now = Utc::now();
    OfferTerms {
        offer_id: Uuid::new_v4(),
        kind: OfferKind::Discount,
        terms: DiscountTerms::new(DiscountType::Percentage, pct),
        coupon_code: None,
        product_ids: vec![product_id],
        start_date: now - Duration::hours(1),
        end_date: now + Duration::hours(1),
    }
}

fn single_line(product_id: Uuid, price: i64, quantity: i32) -> PricingLine {
    PricingLine {
        product_id,
        title: "Widget".into(),
        unit_price: price,
        purchase_price: price / 2,
        quantity,
    }
}

#[test]
fn percentage_offer_final_price_is_independent_of_quantity() {
    let product_id = Uuid::new_v4();
    let offers = [percentage_offer(product_id, 20)];
    let now = Utc::now();

    for quantity in [1, 2, 7, 50] {
        let lines = [single_line(product_id, 12_500, quantity)];
        let breakdown = price_order(&PricingRequest {
            lines: &lines,
            offers: &offers,
            entered_code: None,
            coupon: None,
            delivery_fee: 0,
            now,
        })
        .unwrap();

        let line = &breakdown.lines[0];
        assert_eq!(line.final_price, 10_000, "quantity {quantity}");
        assert_eq!(line.line_total, 10_000 * i64::from(quantity));
        assert_eq!(line.offer_terms, Some(DiscountTerms::new(DiscountType::Percentage, 20)));
    }
}

#[test]
fn pricing_is_idempotent() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let offers = [percentage_offer(a, 15)];
    let lines = [single_line(a, 9_999, 3), single_line(b, 4_250, 2)];
    let coupon = CouponTerms {
        code: "SAVE5".into(),
        terms: DiscountTerms::new(DiscountType::Value, 500),
    };
    let request = PricingRequest {
        lines: &lines,
        offers: &offers,
        entered_code: Some("save5"),
        coupon: Some(&coupon),
        delivery_fee: 5_000,
        now: Utc::now(),
    };

    let first = price_order(&request).unwrap();
    let second = price_order(&request).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first.total,
        first.subtotal - first.coupon_discount + first.delivery_fee
    );
    assert_eq!(first.subtotal, first.items_subtotal - first.discount_total);
}

#[test]
fn coupon_codes_are_case_insensitive() {
    assert_eq!(normalize_code("  welcome10 "), "WELCOME10");
    assert_eq!(normalize_code("WeLcOmE10"), normalize_code("welcome10"));
}

#[test]
fn cancellation_guard_matches_the_status_table() {
    for status in OrderStatus::ALL {
        let result = status.transition(OrderStatus::Cancelled, Actor::Customer);
        match status {
            OrderStatus::Pending | OrderStatus::AcceptedProcessed => {
                assert_eq!(result, Ok(OrderStatus::Cancelled));
            }
            _ => assert_eq!(result, Err(TransitionError::NotCancellable { from: status })),
        }
    }
}
