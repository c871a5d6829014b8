use chrono::{Duration, Utc};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use storefront_api::{
    config::AppConfig,
    db::create_pool,
    dto::{
        auth::RegisterRequest,
        cart::{AddToCartRequest, CartLine, QuoteRequest},
        coupons::CreateCouponRequest,
        notifications::NotificationQuery,
        offers::CreateOfferRequest,
        orders::{CheckoutRequest, UpdateOrderStatusRequest},
        products::{CreateProductRequest, UpdateProductRequest},
    },
    entity::{products::Entity as Products, users::ActiveModel as UserActive},
    error::AppError,
    middleware::auth::{AuthUser, MaybeAuthUser},
    models::ShippingAddress,
    order_status::OrderStatus,
    pricing::{DiscountType, OfferKind},
    routes::params::{OrderListQuery, Pagination},
    services::{
        admin_service, auth_service, cart_service, coupon_service, notification_service,
        offer_service, order_service, product_service,
    },
    state::AppState,
};
use uuid::Uuid;

// Registered checkout with offer + coupon, snapshot immutability, status guards,
// guest tracking and notification fan-out.
#[tokio::test]
async fn checkout_tracking_and_status_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let registered = auth_service::register_user(
        &state,
        RegisterRequest {
            name: "Jane Shopper".into(),
            email: "Jane@Example.com".into(),
            password: "secret123".into(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(registered.email, "jane@example.com");

    let auth_user = AuthUser {
        user_id: registered.id,
        role: "user".into(),
    };
    let auth_admin = AuthUser {
        user_id: create_admin(&state).await?,
        role: "admin".into(),
    };

    let product = product_service::create_product(
        &state,
        &auth_admin,
        CreateProductRequest {
            title: "Trail Runner".into(),
            description: Some("Running shoe".into()),
            category: "Shoes".into(),
            brand: "Stride".into(),
            price: 10_000,
            purchase_price: 6_000,
            stock: 10,
        },
    )
    .await?
    .data
    .unwrap();

    let now = Utc::now();
    offer_service::create_offer(
        &state,
        &auth_admin,
        CreateOfferRequest {
            title: "Spring Sale".into(),
            kind: OfferKind::Discount,
            discount_type: DiscountType::Percentage,
            discount_value: 10,
            coupon_code: None,
            start_date: now - Duration::hours(1),
            end_date: now + Duration::days(1),
            product_ids: vec![product.id],
        },
    )
    .await?;

    coupon_service::create_coupon(
        &state,
        &auth_admin,
        CreateCouponRequest {
            code: "flat10".into(),
            discount_type: DiscountType::Value,
            discount_value: 1_000,
            expiry_date: now + Duration::days(7),
            is_active: None,
        },
    )
    .await?;
    coupon_service::create_coupon(
        &state,
        &auth_admin,
        CreateCouponRequest {
            code: "OLD".into(),
            discount_type: DiscountType::Percentage,
            discount_value: 50,
            expiry_date: now - Duration::days(1),
            is_active: Some(true),
        },
    )
    .await?;

    // An expired coupon is refused even though it is active.
    let expired = order_service::quote(
        &state,
        &MaybeAuthUser(None),
        QuoteRequest {
            items: Some(vec![CartLine {
                product_id: product.id,
                quantity: 1,
            }]),
            coupon_code: Some("old".into()),
        },
    )
    .await;
    assert!(matches!(expired, Err(AppError::BadRequest(_))));

    cart_service::add_to_cart(
        &state,
        &auth_user,
        AddToCartRequest {
            product_id: product.id,
            quantity: 2,
        },
    )
    .await?;

    let quote = order_service::quote(
        &state,
        &MaybeAuthUser(Some(auth_user.clone())),
        QuoteRequest {
            items: None,
            coupon_code: Some("FLAT10".into()),
        },
    )
    .await?
    .data
    .unwrap();

    // 10% off 10_000 = 9_000 per unit, x2, minus 1_000 coupon, plus delivery.
    let checkout = order_service::checkout(
        &state,
        &MaybeAuthUser(Some(auth_user.clone())),
        CheckoutRequest {
            items: None,
            coupon_code: Some("flat10".into()),
            customer_name: None,
            customer_email: None,
            customer_phone: Some("555-0100".into()),
            shipping_address: address(),
            payment_method: "cash_on_delivery".into(),
        },
    )
    .await?
    .data
    .unwrap();
    let order = checkout.order;
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.customer_name, "Jane Shopper");
    assert_eq!(order.tracking_token, None);
    assert_eq!(checkout.items[0].final_price, 9_000);
    assert_eq!(order.coupon_code.as_deref(), Some("FLAT10"));
    assert_eq!(order.total_price, 18_000 - 1_000 + 5_000);
    assert_eq!(order.total_price, quote.total);

    let stock = Products::find_by_id(product.id).one(&state.orm).await?.unwrap().stock;
    assert_eq!(stock, 8);
    let cart = cart_service::list_cart(&state, &auth_user, Pagination::default()).await?;
    assert!(cart.data.unwrap().items.is_empty());

    // Stored totals survive a later price change.
    product_service::update_product(
        &state,
        &auth_admin,
        product.id,
        UpdateProductRequest {
            title: None,
            description: None,
            category: None,
            brand: None,
            price: Some(20_000),
            purchase_price: None,
            stock: None,
        },
    )
    .await?;
    let reread = order_service::get_order(&state, &auth_user, order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(reread.order.total_price, order.total_price);
    assert_eq!(reread.items[0].unit_price, 10_000);
    assert_eq!(reread.items[0].final_price, 9_000);

    // Admin moves the order forward; the customer can no longer cancel.
    for status in [OrderStatus::AcceptedProcessed, OrderStatus::Delivered] {
        admin_service::update_order_status(
            &state,
            &auth_admin,
            order.id,
            UpdateOrderStatusRequest { status },
        )
        .await?;
    }
    let late_cancel = order_service::cancel_order(&state, &auth_user, order.id).await;
    assert!(matches!(late_cancel, Err(AppError::Conflict(_))));
    let skip_back = admin_service::update_order_status(
        &state,
        &auth_admin,
        order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Pending,
        },
    )
    .await;
    assert!(matches!(skip_back, Err(AppError::Conflict(_))));

    admin_service::update_order_status(
        &state,
        &auth_admin,
        order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Completed,
        },
    )
    .await?;

    let stats = admin_service::dashboard(&state, &auth_admin).await?.data.unwrap();
    assert_eq!(stats.revenue, order.total_price);
    assert_eq!(stats.profit, (9_000 - 6_000) * 2);

    // Guest checkout, tracking and cancellation with restock.
    let guest = order_service::checkout(
        &state,
        &MaybeAuthUser(None),
        CheckoutRequest {
            items: Some(vec![CartLine {
                product_id: product.id,
                quantity: 3,
            }]),
            coupon_code: None,
            customer_name: Some("Guest Buyer".into()),
            customer_email: Some("guest@example.com".into()),
            customer_phone: Some("555-0199".into()),
            shipping_address: address(),
            payment_method: "card".into(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(guest.order.user_id, None);
    let token = guest.order.tracking_token.clone().expect("guest token");
    assert_eq!(token.len(), 32);

    let tracked = order_service::track_order(&state, &token).await?.data.unwrap();
    assert_eq!(tracked.order.id, guest.order.id);

    let stock = Products::find_by_id(product.id).one(&state.orm).await?.unwrap().stock;
    assert_eq!(stock, 5);
    let cancelled = order_service::cancel_tracked_order(&state, &token)
        .await?
        .data
        .unwrap();
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    let stock = Products::find_by_id(product.id).one(&state.orm).await?.unwrap().stock;
    assert_eq!(stock, 8);

    let again = order_service::cancel_tracked_order(&state, &token).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    // Placement plus every transition notified the owner; guests only reach admins.
    let mine = notification_service::list_notifications(
        &state,
        &auth_user,
        NotificationQuery {
            page: None,
            per_page: Some(100),
            unread_only: Some(true),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(mine.items.len(), 4);
    assert!(mine.items.iter().all(|n| n.user_id == Some(auth_user.user_id)));

    let admin_feed = notification_service::list_notifications(
        &state,
        &auth_admin,
        NotificationQuery {
            page: None,
            per_page: Some(100),
            unread_only: None,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(admin_feed.items.len(), 6);

    let marked = notification_service::mark_all_read(&state, &auth_user)
        .await?
        .data
        .unwrap();
    assert_eq!(marked.updated, 4);

    let history = order_service::list_orders(
        &state,
        &auth_user,
        OrderListQuery {
            page: None,
            per_page: None,
            status: Some(OrderStatus::Completed),
            sort_order: None,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(history.items.len(), 1);

    // A code with no coupon record works only through a live coupon-kind offer.
    let lamp = product_service::create_product(
        &state,
        &auth_admin,
        CreateProductRequest {
            title: "Pocket Lamp".into(),
            description: None,
            category: "Outdoor".into(),
            brand: "Glow".into(),
            price: 1_000,
            purchase_price: 400,
            stock: 10,
        },
    )
    .await?
    .data
    .unwrap();
    offer_service::create_offer(
        &state,
        &auth_admin,
        CreateOfferRequest {
            title: "Half Off Lamps".into(),
            kind: OfferKind::Coupon,
            discount_type: DiscountType::Percentage,
            discount_value: 50,
            coupon_code: Some("half".into()),
            start_date: now - Duration::hours(1),
            end_date: now + Duration::days(1),
            product_ids: vec![lamp.id],
        },
    )
    .await?;

    let lamp_quote = |code: Option<&str>| QuoteRequest {
        items: Some(vec![CartLine {
            product_id: lamp.id,
            quantity: 2,
        }]),
        coupon_code: code.map(str::to_string),
    };
    let with_code = order_service::quote(&state, &MaybeAuthUser(None), lamp_quote(Some("HALF")))
        .await?
        .data
        .unwrap();
    assert_eq!(with_code.lines[0].final_price, 500);
    assert_eq!(with_code.subtotal, 1_000);

    let without_code = order_service::quote(&state, &MaybeAuthUser(None), lamp_quote(None))
        .await?
        .data
        .unwrap();
    assert_eq!(without_code.lines[0].final_price, 1_000);

    let unknown = order_service::quote(&state, &MaybeAuthUser(None), lamp_quote(Some("NOPE"))).await;
    assert!(matches!(unknown, Err(AppError::BadRequest(_))));

    // Items keep request order; rejecting a delivered order returns its stock.
    let mixed = order_service::checkout(
        &state,
        &MaybeAuthUser(None),
        CheckoutRequest {
            items: Some(vec![
                CartLine {
                    product_id: lamp.id,
                    quantity: 4,
                },
                CartLine {
                    product_id: product.id,
                    quantity: 1,
                },
            ]),
            coupon_code: None,
            customer_name: Some("Guest Buyer".into()),
            customer_email: Some("guest@example.com".into()),
            customer_phone: Some("555-0199".into()),
            shipping_address: address(),
            payment_method: "bank_transfer".into(),
        },
    )
    .await?
    .data
    .unwrap();
    let positions: Vec<_> = mixed
        .items
        .iter()
        .map(|i| (i.position, i.product_id))
        .collect();
    assert_eq!(positions, vec![(0, Some(lamp.id)), (1, Some(product.id))]);

    let reread = order_service::track_order(&state, mixed.order.tracking_token.as_deref().unwrap())
        .await?
        .data
        .unwrap();
    let reread_ids: Vec<_> = reread.items.iter().map(|i| i.product_id).collect();
    assert_eq!(reread_ids, vec![Some(lamp.id), Some(product.id)]);

    let stock_of = |id: Uuid| {
        let orm = state.orm.clone();
        async move {
            anyhow::Ok(Products::find_by_id(id).one(&orm).await?.unwrap().stock)
        }
    };
    assert_eq!(stock_of(lamp.id).await?, 6);
    assert_eq!(stock_of(product.id).await?, 7);

    for status in [
        OrderStatus::AcceptedProcessed,
        OrderStatus::Delivered,
        OrderStatus::Rejected,
    ] {
        admin_service::update_order_status(
            &state,
            &auth_admin,
            mixed.order.id,
            UpdateOrderStatusRequest { status },
        )
        .await?;
    }
    assert_eq!(stock_of(lamp.id).await?, 10);
    assert_eq!(stock_of(product.id).await?, 8);

    Ok(())
}

fn address() -> ShippingAddress {
    ShippingAddress {
        line1: "1 Market Street".into(),
        line2: None,
        city: "Springfield".into(),
        postal_code: Some("12345".into()),
        country: "US".into(),
    }
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Clean tables between runs
    sqlx::query(
        "TRUNCATE TABLE notifications, order_items, orders, cart_items, wish_items, offer_products, offers, coupons, audit_logs, products, users CASCADE",
    )
    .execute(&pool)
    .await?;

    let upload_dir = std::env::temp_dir().join("storefront-api-tests");
    let config = AppConfig::from_vars(|key| match key {
        "DATABASE_URL" => Some(database_url.to_string()),
        "JWT_SECRET" => Some("test-secret".to_string()),
        "DELIVERY_FEE" => Some("5000".to_string()),
        "UPLOAD_DIR" => Some(upload_dir.display().to_string()),
        _ => None,
    })?;

    Ok(AppState::new(pool, config))
}

async fn create_admin(state: &AppState) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set("Store Admin".into()),
        email: Set("admin@example.com".into()),
        password_hash: Set("dummy".into()),
        role: Set("admin".into()),
        phone: Set(None),
        address: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}
