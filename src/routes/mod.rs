use axum::Router;

use crate::state::AppState;

pub mod admin;
pub mod cart;
pub mod coupons;
pub mod doc;
pub mod health;
pub mod notifications;
pub mod offers;
pub mod orders;
pub mod params;
pub mod products;
pub mod users;
pub mod wishlist;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/user", users::router())
        .nest("/product", products::router())
        .nest("/offer", offers::router())
        .nest("/coupon", coupons::router())
        .nest("/cart", cart::router())
        .nest("/wish", wishlist::router())
        .nest("/order", orders::route())
        .nest("/admin", admin::router())
        .nest("/notification", notifications::router())
}
