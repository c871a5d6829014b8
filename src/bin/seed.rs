use chrono::{Duration, Utc};
use storefront_api::{config::AppConfig, db::create_pool, services::auth_service::hash_password};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user(&pool, "Store Admin", "admin@example.com", "admin123", "admin").await?;
    let user_id = ensure_user(&pool, "Jane Shopper", "user@example.com", "user123", "user").await?;
    let product_ids = seed_products(&pool).await?;
    seed_coupon(&pool).await?;
    seed_offer(&pool, &product_ids).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    name: &str,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn seed_products(pool: &sqlx::PgPool) -> anyhow::Result<Vec<Uuid>> {
    // title, description, category, brand, price, purchase price, stock
    let products = [
        ("Trail Runner 2", "Lightweight running shoe", "Shoes", "Stride", 89_900, 52_000, 40),
        ("City Backpack", "20L commuter backpack", "Bags", "Urbano", 54_900, 30_500, 25),
        ("Wool Beanie", "Merino wool beanie", "Accessories", "Northknit", 19_900, 8_000, 4),
        ("Rain Shell", "Packable waterproof jacket", "Outerwear", "Stride", 129_900, 74_000, 12),
    ];

    let mut ids = Vec::with_capacity(products.len());
    for (title, desc, category, brand, price, purchase_price, stock) in products {
        sqlx::query(
            r#"
            INSERT INTO products (id, title, description, category, brand, price, purchase_price, stock)
            SELECT $1, $2, $3, $4, $5, $6, $7, $8
            WHERE NOT EXISTS (SELECT 1 FROM products WHERE title = $2)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(title)
        .bind(desc)
        .bind(category)
        .bind(brand)
        .bind(price as i64)
        .bind(purchase_price as i64)
        .bind(stock)
        .execute(pool)
        .await?;

        let (id,): (Uuid,) = sqlx::query_as("SELECT id FROM products WHERE title = $1 LIMIT 1")
            .bind(title)
            .fetch_one(pool)
            .await?;
        ids.push(id);
    }

    println!("Seeded {} products", ids.len());
    Ok(ids)
}

async fn seed_coupon(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO coupons (id, code, discount_type, discount_value, expiry_date, is_active)
        VALUES ($1, 'WELCOME10', 'percentage', 10, $2, TRUE)
        ON CONFLICT (code) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(Utc::now() + Duration::days(90))
    .execute(pool)
    .await?;

    println!("Seeded coupon WELCOME10");
    Ok(())
}

async fn seed_offer(pool: &sqlx::PgPool, product_ids: &[Uuid]) -> anyhow::Result<()> {
    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM offers WHERE title = $1")
        .bind("Spring Sale")
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        println!("Offer already present");
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    let offer_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO offers (id, title, kind, discount_type, discount_value, start_date, end_date)
        VALUES ($1, 'Spring Sale', 'discount', 'percentage', 15, $2, $3)
        "#,
    )
    .bind(offer_id)
    .bind(Utc::now() - Duration::days(1))
    .bind(Utc::now() + Duration::days(30))
    .execute(&mut *tx)
    .await?;

    for product_id in product_ids.iter().take(2) {
        sqlx::query("INSERT INTO offer_products (offer_id, product_id) VALUES ($1, $2)")
            .bind(offer_id)
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    println!("Seeded offer Spring Sale");
    Ok(())
}
