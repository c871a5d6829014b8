use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entity::{coupons, notifications, offers, order_items, orders, products, users},
    order_status::OrderStatus,
    pricing::{DiscountTerms, DiscountType, OfferKind},
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub brand: String,
    pub price: i64,
    pub purchase_price: i64,
    pub stock: i32,
    pub images: Vec<String>,
    /// Price under the best live discount offer, when one applies.
    pub offer_price: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub expiry_date: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Offer {
    pub id: Uuid,
    pub title: String,
    pub kind: OfferKind,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub coupon_code: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub product_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItem {
    pub id: Uuid,
    pub product: Product,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WishItem {
    pub id: Uuid,
    pub product: Product,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddress {
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: Option<String>,
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub tracking_token: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub status: OrderStatus,
    pub status_label: String,
    pub items_subtotal: i64,
    pub discount_total: i64,
    pub coupon_code: Option<String>,
    pub coupon_discount: i64,
    pub delivery_fee: i64,
    pub total_price: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub position: i32,
    pub product_id: Option<Uuid>,
    pub title: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub discount_applied: i64,
    pub final_price: i64,
    pub line_total: i64,
    pub offer_id: Option<Uuid>,
    pub offer_terms: Option<DiscountTerms>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub audience: String,
    pub user_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            role: model.role,
            phone: model.phone,
            address: model.address,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<products::Model> for Product {
    fn from(model: products::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            description: model.description,
            category: model.category,
            brand: model.brand,
            price: model.price,
            purchase_price: model.purchase_price,
            stock: model.stock,
            images: serde_json::from_value(model.images).unwrap_or_default(),
            offer_price: None,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<coupons::Model> for Coupon {
    fn from(model: coupons::Model) -> Self {
        Self {
            id: model.id,
            code: model.code,
            discount_type: model.discount_type,
            discount_value: model.discount_value,
            expiry_date: model.expiry_date.with_timezone(&Utc),
            is_active: model.is_active,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl Offer {
    pub fn from_entity(model: offers::Model, product_ids: Vec<Uuid>) -> Self {
        Self {
            id: model.id,
            title: model.title,
            kind: model.kind,
            discount_type: model.discount_type,
            discount_value: model.discount_value,
            coupon_code: model.coupon_code,
            start_date: model.start_date.with_timezone(&Utc),
            end_date: model.end_date.with_timezone(&Utc),
            product_ids,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl TryFrom<orders::Model> for Order {
    type Error = serde_json::Error;

    fn try_from(model: orders::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            tracking_token: model.tracking_token,
            customer_name: model.customer_name,
            customer_email: model.customer_email,
            customer_phone: model.customer_phone,
            shipping_address: serde_json::from_value(model.shipping_address)?,
            payment_method: model.payment_method,
            status: model.status,
            status_label: model.status.label().to_string(),
            items_subtotal: model.items_subtotal,
            discount_total: model.discount_total,
            coupon_code: model.coupon_code,
            coupon_discount: model.coupon_discount,
            delivery_fee: model.delivery_fee,
            total_price: model.total_price,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        })
    }
}

impl From<order_items::Model> for OrderItem {
    fn from(model: order_items::Model) -> Self {
        let offer_terms = match (model.offer_discount_type, model.offer_discount_value) {
            (Some(discount_type), Some(value)) => Some(DiscountTerms::new(discount_type, value)),
            _ => None,
        };
        Self {
            id: model.id,
            order_id: model.order_id,
            position: model.position,
            product_id: model.product_id,
            title: model.title,
            quantity: model.quantity,
            unit_price: model.unit_price,
            discount_applied: model.discount_applied,
            final_price: model.final_price,
            line_total: model.line_total,
            offer_id: model.offer_id,
            offer_terms,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<notifications::Model> for Notification {
    fn from(model: notifications::Model) -> Self {
        Self {
            id: model.id,
            audience: model.audience,
            user_id: model.user_id,
            order_id: model.order_id,
            message: model.message,
            is_read: model.is_read,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}
