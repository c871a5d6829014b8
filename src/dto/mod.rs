pub mod admin;
pub mod auth;
pub mod cart;
pub mod coupons;
pub mod notifications;
pub mod offers;
pub mod orders;
pub mod products;
pub mod users;
pub mod wishlist;
