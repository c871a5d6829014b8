use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{models::Notification, routes::params::PageParams};

#[derive(Debug, Deserialize, ToSchema)]
pub struct NotificationQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub unread_only: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct NotificationList {
    #[schema(value_type = Vec<Notification>)]
    pub items: Vec<Notification>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkedRead {
    pub updated: u64,
}

impl PageParams for NotificationQuery {
    fn page_params(&self) -> (Option<i64>, Option<i64>) {
        (self.page, self.per_page)
    }
}
