use chrono::{Duration, Utc};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use storefront_api::{
    config::AppConfig,
    db::create_pool,
    dto::{
        auth::RegisterRequest,
        cart::AddToCartRequest,
        coupons::CreateCouponRequest,
        products::{CreateProductRequest, RemoveImageRequest},
    },
    entity::{products::Entity as Products, users::ActiveModel as UserActive},
    error::AppError,
    middleware::auth::AuthUser,
    models::Product,
    pricing::DiscountType,
    services::{
        auth_service, cart_service, coupon_service,
        product_service::{self, ImageUpload},
    },
    state::AppState,
};
use uuid::Uuid;

// Image uploads under concurrency, removal auditing, and unique-key races.
#[tokio::test]
async fn catalog_uploads_and_unique_keys() -> anyhow::Result<()> {
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

    let upload_dir = std::env::temp_dir().join(format!("storefront-catalog-{}", Uuid::new_v4().simple()));
    let state = setup_state(&database_url, &upload_dir.display().to_string()).await?;

    let auth_admin = AuthUser {
        user_id: create_admin(&state).await?,
        role: "admin".into(),
    };

    let product = product_service::create_product(
        &state,
        &auth_admin,
        CreateProductRequest {
            title: "Trail Runner".into(),
            description: None,
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

    // Non-admins cannot attach images.
    let shopper = AuthUser {
        user_id: Uuid::new_v4(),
        role: "user".into(),
    };
    let denied = product_service::upload_images(&state, &shopper, product.id, vec![png("x.png")]).await;
    assert!(matches!(denied, Err(AppError::Forbidden)));

    // Two uploads racing on the same product both keep their URL.
    let (first, second) = tokio::join!(
        product_service::upload_images(&state, &auth_admin, product.id, vec![png("a.png")]),
        product_service::upload_images(&state, &auth_admin, product.id, vec![png("b.png")]),
    );
    first?;
    second?;

    let stored = Product::from(Products::find_by_id(product.id).one(&state.orm).await?.unwrap());
    assert_eq!(stored.images.len(), 2);
    assert_eq!(files_in(&upload_dir)?, 2);

    let removed_url = stored.images[0].clone();
    let after_remove = product_service::remove_image(
        &state,
        &auth_admin,
        product.id,
        RemoveImageRequest {
            url: removed_url.clone(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(after_remove.images, vec![stored.images[1].clone()]);
    assert_eq!(files_in(&upload_dir)?, 1);

    let (removals,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM audit_logs WHERE action = 'product_image_remove'")
            .fetch_one(&state.pool)
            .await?;
    assert_eq!(removals, 1);

    let missing = product_service::remove_image(
        &state,
        &auth_admin,
        product.id,
        RemoveImageRequest { url: removed_url },
    )
    .await;
    assert!(matches!(missing, Err(AppError::NotFound)));

    // Concurrent registrations with one email: one account, one 400.
    let register = |name: &str| {
        auth_service::register_user(
            &state,
            RegisterRequest {
                name: name.into(),
                email: "twin@example.com".into(),
                password: "secret123".into(),
            },
        )
    };
    let (a, b) = tokio::join!(register("Twin A"), register("Twin B"));
    let (user, clash) = match (a, b) {
        (Ok(ok), Err(err)) | (Err(err), Ok(ok)) => (ok.data.unwrap(), err),
        _ => anyhow::bail!("expected exactly one registration to succeed"),
    };
    assert!(matches!(clash, AppError::BadRequest(_)));

    // Concurrent cart writes for one line collapse into a single row.
    let auth_user = AuthUser {
        user_id: user.id,
        role: "user".into(),
    };
    let set_qty = |quantity: i32| {
        cart_service::add_to_cart(
            &state,
            &auth_user,
            AddToCartRequest {
                product_id: product.id,
                quantity,
            },
        )
    };
    let (one, two) = tokio::join!(set_qty(2), set_qty(3));
    one?;
    two?;
    let (lines, quantity): (i64, i32) = sqlx::query_as(
        "SELECT COUNT(*), MAX(quantity) FROM cart_items WHERE user_id = $1 AND product_id = $2",
    )
    .bind(user.id)
    .bind(product.id)
    .fetch_one(&state.pool)
    .await?;
    assert_eq!(lines, 1);
    assert!(quantity == 2 || quantity == 3);

    // A duplicate coupon code is a conflict, whatever its case.
    let coupon = |code: &str| CreateCouponRequest {
        code: code.into(),
        discount_type: DiscountType::Percentage,
        discount_value: 10,
        expiry_date: Utc::now() + Duration::days(7),
        is_active: None,
    };
    coupon_service::create_coupon(&state, &auth_admin, coupon("SPRING")).await?;
    let duplicate = coupon_service::create_coupon(&state, &auth_admin, coupon("spring")).await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    let _ = std::fs::remove_dir_all(&upload_dir);
    Ok(())
}

fn png(name: &str) -> ImageUpload {
    ImageUpload {
        file_name: Some(name.into()),
        content_type: Some("image/png".into()),
        bytes: vec![0x89, b'P', b'N', b'G'],
    }
}

fn files_in(dir: &std::path::Path) -> anyhow::Result<usize> {
    Ok(std::fs::read_dir(dir)?.count())
}

async fn setup_state(database_url: &str, upload_dir: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Clean tables between runs
    sqlx::query(
        "TRUNCATE TABLE notifications, order_items, orders, cart_items, wish_items, offer_products, offers, coupons, audit_logs, products, users CASCADE",
    )
    .execute(&pool)
    .await?;

    let config = AppConfig::from_vars(|key| match key {
        "DATABASE_URL" => Some(database_url.to_string()),
        "JWT_SECRET" => Some("test-secret".to_string()),
        "UPLOAD_DIR" => Some(upload_dir.to_string()),
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
