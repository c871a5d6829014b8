pub mod cart_items;
pub mod coupons;
pub mod notifications;
pub mod offer_products;
pub mod offers;
pub mod order_items;
pub mod orders;
pub mod products;
pub mod users;
pub mod wish_items;

pub use cart_items::Entity as CartItems;
pub use coupons::Entity as Coupons;
pub use notifications::Entity as Notifications;
pub use offer_products::Entity as OfferProducts;
pub use offers::Entity as Offers;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use products::Entity as Products;
pub use users::Entity as Users;
pub use wish_items::Entity as WishItems;
