use serde::Deserialize;
use utoipa::ToSchema;

use crate::order_status::OrderStatus;

/// Keeps `(page - 1) * per_page` within `i64` for the largest `per_page`.
const MAX_PAGE: i64 = i64::MAX / 100;

#[derive(Debug, Default, Clone, Copy, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl Pagination {
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).clamp(1, MAX_PAGE);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * per_page;
        (page, per_page, offset)
    }
}

/// Query strings that carry `page`/`per_page` next to their own filters.
///
/// The fields are declared inline rather than through `#[serde(flatten)]`,
/// which loses number parsing for url-encoded input.
pub trait PageParams {
    fn page_params(&self) -> (Option<i64>, Option<i64>);

    fn pagination(&self) -> Pagination {
        let (page, per_page) = self.page_params();
        Pagination { page, per_page }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductSortBy {
    CreatedAt,
    Price,
    Title,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProductQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub q: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub in_stock: Option<bool>,
    pub sort_by: Option<ProductSortBy>,
    pub sort_order: Option<SortOrder>,
}

impl PageParams for ProductQuery {
    fn page_params(&self) -> (Option<i64>, Option<i64>) {
        (self.page, self.per_page)
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct OrderListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<OrderStatus>,
    pub sort_order: Option<SortOrder>,
}

impl PageParams for OrderListQuery {
    fn page_params(&self) -> (Option<i64>, Option<i64>) {
        (self.page, self.per_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        assert_eq!(Pagination::default().normalize(), (1, 20, 0));
        let p = Pagination {
            page: Some(0),
            per_page: Some(1000),
        };
        assert_eq!(p.normalize(), (1, 100, 0));
        let p = Pagination {
            page: Some(3),
            per_page: Some(10),
        };
        assert_eq!(p.normalize(), (3, 10, 20));
    }

    #[test]
    fn order_query_parses_status() {
        let query: OrderListQuery =
            serde_json::from_str(r#"{"status":"accepted_processed","page":2}"#).unwrap();
        assert_eq!(query.status, Some(OrderStatus::AcceptedProcessed));
        assert_eq!(query.pagination().normalize(), (2, 20, 20));
    }

    #[test]
    fn huge_page_is_clamped_without_overflow() {
        let query: OrderListQuery =
            serde_json::from_str(r#"{"page":922337203685477580,"per_page":100}"#).unwrap();
        let (page, per_page, offset) = query.pagination().normalize();
        assert_eq!(page, MAX_PAGE);
        assert_eq!(per_page, 100);
        assert!(offset >= 0);

        let p = Pagination {
            page: Some(i64::MAX),
            per_page: Some(i64::MAX),
        };
        assert_eq!(p.normalize().2, (MAX_PAGE - 1) * 100);
    }
}
