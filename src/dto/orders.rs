use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dto::cart::CartLine,
    models::{Order, OrderItem, ShippingAddress},
    order_status::OrderStatus,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    /// Guest cart lines; registered users may omit them to use the stored cart.
    pub items: Option<Vec<CartLine>>,
    pub coupon_code: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
