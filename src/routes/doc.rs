use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        admin::{DashboardStats, InventoryAdjustRequest, LowStockQuery, StatusCount},
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        cart::{AddToCartRequest, CartLine, CartList, QuoteRequest},
        coupons::{CouponList, CreateCouponRequest, UpdateCouponRequest, ValidateCouponRequest},
        notifications::{MarkedRead, NotificationList, NotificationQuery},
        offers::{CreateOfferRequest, OfferList, OfferQuery, UpdateOfferRequest},
        orders::{CheckoutRequest, OrderList, OrderWithItems, UpdateOrderStatusRequest},
        products::{
            CreateProductRequest, FacetList, ProductList, RemoveImageRequest, UpdateProductRequest,
        },
        users::{UpdateProfileRequest, UpdateRoleRequest, UserList, UserListQuery},
        wishlist::{AddWishRequest, WishList},
    },
    models::{
        CartItem, Coupon, Notification, Offer, Order, OrderItem, Product, ShippingAddress, User,
        WishItem,
    },
    order_status::OrderStatus,
    pricing::{DiscountTerms, DiscountType, OfferKind, PriceBreakdown, PricedLine},
    response::{ApiResponse, Meta},
    routes::{
        admin, cart, coupons, health, notifications, offers, orders, params,
        products as product_routes, users, wishlist,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        users::register,
        users::login,
        users::logout,
        users::me,
        users::update_me,
        users::list_users,
        users::update_role,
        users::delete_user,
        product_routes::list_products,
        product_routes::list_categories,
        product_routes::list_brands,
        product_routes::get_product,
        product_routes::create_product,
        product_routes::update_product,
        product_routes::delete_product,
        product_routes::upload_images,
        product_routes::remove_image,
        offers::list_offers,
        offers::get_offer,
        offers::create_offer,
        offers::update_offer,
        offers::delete_offer,
        coupons::validate_coupon,
        coupons::list_coupons,
        coupons::create_coupon,
        coupons::update_coupon,
        coupons::delete_coupon,
        cart::cart_list,
        cart::add_to_cart,
        cart::remove_from_cart,
        cart::clear_cart,
        cart::quote,
        wishlist::list_wishes,
        wishlist::add_wish,
        wishlist::remove_wish,
        orders::list_order,
        orders::checkout,
        orders::get_order,
        orders::cancel_order,
        orders::track_order,
        orders::cancel_tracked_order,
        admin::dashboard,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::list_low_stock,
        admin::adjust_inventory,
        notifications::list_notifications,
        notifications::mark_read,
        notifications::mark_all_read,
        notifications::delete_notification
    ),
    components(
        schemas(
            User,
            Product,
            Coupon,
            Offer,
            CartItem,
            WishItem,
            ShippingAddress,
            Order,
            OrderItem,
            Notification,
            OrderStatus,
            DiscountType,
            OfferKind,
            DiscountTerms,
            PricedLine,
            PriceBreakdown,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            UpdateProfileRequest,
            UpdateRoleRequest,
            UserListQuery,
            UserList,
            CreateProductRequest,
            UpdateProductRequest,
            RemoveImageRequest,
            ProductList,
            FacetList,
            CreateOfferRequest,
            UpdateOfferRequest,
            OfferQuery,
            OfferList,
            CreateCouponRequest,
            UpdateCouponRequest,
            ValidateCouponRequest,
            CouponList,
            CartLine,
            AddToCartRequest,
            CartList,
            QuoteRequest,
            AddWishRequest,
            WishList,
            CheckoutRequest,
            UpdateOrderStatusRequest,
            OrderList,
            OrderWithItems,
            DashboardStats,
            StatusCount,
            LowStockQuery,
            InventoryAdjustRequest,
            NotificationQuery,
            NotificationList,
            MarkedRead,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<PriceBreakdown>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "User", description = "Accounts, sessions and user administration"),
        (name = "Products", description = "Product catalog"),
        (name = "Offers", description = "Time-boxed discount and coupon offers"),
        (name = "Coupons", description = "Coupon codes"),
        (name = "Cart", description = "Server cart and price quotes"),
        (name = "Wishlist", description = "Wishlist endpoints"),
        (name = "Orders", description = "Checkout, order history and guest tracking"),
        (name = "Admin", description = "Dashboard, order processing and inventory"),
        (name = "Notifications", description = "Order notifications"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
