use serde::Deserialize;
use utoipa::ToSchema;

use crate::{models::User, routes::params::PageParams};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub q: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, serde::Serialize, ToSchema)]
#[serde(transparent)]
pub struct UserList {
    #[schema(value_type = Vec<User>)]
    pub items: Vec<User>,
}

impl PageParams for UserListQuery {
    fn page_params(&self) -> (Option<i64>, Option<i64>) {
        (self.page, self.per_page)
    }
}
