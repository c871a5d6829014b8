use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    models::Offer,
    pricing::{DiscountType, OfferKind},
    routes::params::PageParams,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOfferRequest {
    pub title: String,
    pub kind: OfferKind,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub coupon_code: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub product_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOfferRequest {
    pub title: Option<String>,
    pub kind: Option<OfferKind>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<i64>,
    pub coupon_code: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub product_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OfferQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    /// Only offers live right now.
    pub active: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct OfferList {
    #[schema(value_type = Vec<Offer>)]
    pub items: Vec<Offer>,
}

impl PageParams for OfferQuery {
    fn page_params(&self) -> (Option<i64>, Option<i64>) {
        (self.page, self.per_page)
    }
}
