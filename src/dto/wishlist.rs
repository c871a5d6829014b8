use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::WishItem;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct AddWishRequest {
    pub product_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct WishList {
    #[schema(value_type = Vec<WishItem>)]
    pub items: Vec<WishItem>,
}
