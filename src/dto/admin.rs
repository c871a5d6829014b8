use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{order_status::OrderStatus, routes::params::PageParams};

#[derive(Debug, Deserialize, ToSchema)]
pub struct LowStockQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub threshold: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InventoryAdjustRequest {
    pub delta: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardStats {
    pub products: u64,
    pub users: u64,
    pub orders: u64,
    pub orders_by_status: Vec<StatusCount>,
    /// Sum of completed order totals.
    pub revenue: i64,
    /// Sum of (final price - purchase price) x quantity over completed orders.
    pub profit: i64,
    pub low_stock: u64,
}

impl PageParams for LowStockQuery {
    fn page_params(&self) -> (Option<i64>, Option<i64>) {
        (self.page, self.per_page)
    }
}
