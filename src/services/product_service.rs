use std::path::{Path, PathBuf};

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::sea_query::extension::postgres::PgExpr;
use tokio::fs;
use uuid::Uuid;

use crate::{
    audit,
    dto::products::{
        CreateProductRequest, FacetList, ProductList, RemoveImageRequest, UpdateProductRequest,
    },
    entity::products::{ActiveModel, Column, Entity as Products, Model},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Product,
    pricing::best_offer,
    response::{ApiResponse, Meta},
    routes::params::{PageParams, ProductQuery, ProductSortBy, SortOrder},
    services::offer_service,
    state::AppState,
};

pub const UPLOAD_URL_PREFIX: &str = "/uploads/";

/// One file part from a multipart image upload.
#[derive(Debug)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Fills `offer_price` from live discount offers.
pub async fn attach_offer_prices<C: ConnectionTrait>(
    conn: &C,
    products: &mut [Product],
) -> AppResult<()> {
    let now = Utc::now();
    let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
    let offers = offer_service::load_live_offers(conn, &ids, now).await?;
    if offers.is_empty() {
        return Ok(());
    }
    for product in products.iter_mut() {
        product.offer_price = best_offer(&offers, product.id, product.price, None, now)
            .map(|(_, discount)| product.price - discount);
    }
    Ok(())
}

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    if let Some(search) = query.q.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Title).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern.clone()))
                .add(Expr::col(Column::Brand).ilike(pattern)),
        );
    }

    if let Some(category) = query.category.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(Column::Category.eq(category.clone()));
    }

    if let Some(brand) = query.brand.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(Column::Brand.eq(brand.clone()));
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    if query.in_stock.unwrap_or(false) {
        condition = condition.add(Column::Stock.gt(0));
    }

    let sort_col = match query.sort_by.unwrap_or(ProductSortBy::CreatedAt) {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Title => Column::Title,
    };

    let mut finder = Products::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await?;

    let mut items: Vec<Product> = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();
    attach_offer_prices(&state.orm, &mut items).await?;

    let meta = Meta::paged(page, limit, total);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Product>> {
    let result = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .map(Product::from);
    let mut result = match result {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };
    attach_offer_prices(&state.orm, std::slice::from_mut(&mut result)).await?;
    Ok(ApiResponse::success("Product", result, None))
}

async fn distinct_values(state: &AppState, column: Column) -> AppResult<Vec<String>> {
    let values = Products::find()
        .select_only()
        .column(column)
        .distinct()
        .order_by_asc(column)
        .into_tuple::<String>()
        .all(&state.orm)
        .await?;
    Ok(values)
}

pub async fn list_categories(state: &AppState) -> AppResult<ApiResponse<FacetList>> {
    let values = distinct_values(state, Column::Category).await?;
    Ok(ApiResponse::success("Categories", FacetList { values }, None))
}

pub async fn list_brands(state: &AppState) -> AppResult<ApiResponse<FacetList>> {
    let values = distinct_values(state, Column::Brand).await?;
    Ok(ApiResponse::success("Brands", FacetList { values }, None))
}

fn required(field: &str, value: String) -> AppResult<String> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(value)
}

fn non_negative(field: &str, value: i64) -> AppResult<i64> {
    if value < 0 {
        return Err(AppError::BadRequest(format!("{field} must not be negative")));
    }
    Ok(value)
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let active = ActiveModel {
        id: Set(Uuid::new_v4()),
        title: Set(required("title", payload.title)?),
        description: Set(payload.description.filter(|d| !d.trim().is_empty())),
        category: Set(required("category", payload.category)?),
        brand: Set(required("brand", payload.brand)?),
        price: Set(non_negative("price", payload.price)?),
        purchase_price: Set(non_negative("purchase_price", payload.purchase_price)?),
        stock: Set(non_negative("stock", i64::from(payload.stock))? as i32),
        images: Set(serde_json::json!([])),
        created_at: NotSet,
        updated_at: NotSet,
    };
    let product = active.insert(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product created",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let existing = Products::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let mut active: ActiveModel = existing.into();
    if let Some(title) = payload.title {
        active.title = Set(required("title", title)?);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description).filter(|d| !d.trim().is_empty()));
    }
    if let Some(category) = payload.category {
        active.category = Set(required("category", category)?);
    }
    if let Some(brand) = payload.brand {
        active.brand = Set(required("brand", brand)?);
    }
    if let Some(price) = payload.price {
        active.price = Set(non_negative("price", price)?);
    }
    if let Some(purchase_price) = payload.purchase_price {
        active.purchase_price = Set(non_negative("purchase_price", purchase_price)?);
    }
    if let Some(stock) = payload.stock {
        active.stock = Set(non_negative("stock", i64::from(stock))? as i32);
    }
    active.updated_at = Set(Utc::now().into());

    let product = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "product_update",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let existing = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let images = Product::from(existing).images;

    Products::delete_by_id(id).exec(&state.orm).await?;

    for url in &images {
        remove_stored_file(&state.config.upload_dir, url).await;
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::done("Deleted"))
}

/// File extension for an accepted image, from the content type or file name.
pub fn image_extension(content_type: Option<&str>, file_name: Option<&str>) -> Option<&'static str> {
    let by_type = match content_type {
        Some("image/jpeg") => Some("jpg"),
        Some("image/png") => Some("png"),
        Some("image/webp") => Some("webp"),
        Some("image/gif") => Some("gif"),
        _ => None,
    };
    by_type.or_else(|| {
        let ext = Path::new(file_name?).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some("jpg"),
            "png" => Some("png"),
            "webp" => Some("webp"),
            "gif" => Some("gif"),
            _ => None,
        }
    })
}

/// Stored file name behind an upload URL; `None` for foreign or unsafe URLs.
pub fn stored_file_name(url: &str) -> Option<&str> {
    let name = url.strip_prefix(UPLOAD_URL_PREFIX)?;
    let safe = !name.is_empty() && !name.contains('/') && !name.contains('\\') && !name.contains("..");
    safe.then_some(name)
}

async fn remove_stored_file(upload_dir: &str, url: &str) {
    let Some(name) = stored_file_name(url) else {
        return;
    };
    let path = Path::new(upload_dir).join(name);
    if let Err(err) = fs::remove_file(&path).await
        && err.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(error = %err, path = %path.display(), "failed to remove image");
    }
}

pub async fn upload_images(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    uploads: Vec<ImageUpload>,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    if uploads.is_empty() {
        return Err(AppError::BadRequest("No image uploaded".into()));
    }

    let mut planned = Vec::with_capacity(uploads.len());
    for upload in &uploads {
        if upload.bytes.is_empty() {
            return Err(AppError::BadRequest("Empty image file".into()));
        }
        let ext = image_extension(upload.content_type.as_deref(), upload.file_name.as_deref())
            .ok_or_else(|| AppError::BadRequest("Unsupported image type".into()))?;
        planned.push(format!("{}.{}", Uuid::new_v4().simple(), ext));
    }

    if Products::find_by_id(id).one(&state.orm).await?.is_none() {
        return Err(AppError::NotFound);
    }

    let dir = Path::new(&state.config.upload_dir);
    fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    let mut written = Vec::with_capacity(planned.len());
    for (name, upload) in planned.iter().zip(uploads) {
        let path = dir.join(name);
        if let Err(err) = fs::write(&path, upload.bytes).await {
            discard_files(&written).await;
            return Err(AppError::Internal(err.into()));
        }
        written.push(path);
    }

    let urls: Vec<String> = planned
        .iter()
        .map(|name| format!("{UPLOAD_URL_PREFIX}{name}"))
        .collect();
    let product = match append_images(state, id, &urls).await {
        Ok(product) => product,
        Err(err) => {
            discard_files(&written).await;
            return Err(err);
        }
    };

    audit::record(
        &state.pool,
        Some(user.user_id),
        "product_images_upload",
        "products",
        serde_json::json!({ "product_id": product.id, "files": planned }),
    )
    .await;

    Ok(ApiResponse::success(
        "Images uploaded",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

/// Appends to the image list under a row lock so concurrent uploads keep every URL.
async fn append_images(state: &AppState, id: Uuid, urls: &[String]) -> AppResult<Model> {
    let txn = state.orm.begin().await?;
    let existing = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut images = Product::from(existing.clone()).images;
    images.extend_from_slice(urls);

    let mut active: ActiveModel = existing.into();
    active.images = Set(serde_json::json!(images));
    active.updated_at = Set(Utc::now().into());
    let product = active.update(&txn).await?;
    txn.commit().await?;
    Ok(product)
}

async fn discard_files(paths: &[PathBuf]) {
    for path in paths {
        if let Err(err) = fs::remove_file(path).await {
            tracing::warn!(error = %err, path = %path.display(), "failed to discard upload");
        }
    }
}

pub async fn remove_image(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: RemoveImageRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let txn = state.orm.begin().await?;
    let existing = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut images = Product::from(existing.clone()).images;
    let before = images.len();
    images.retain(|url| *url != payload.url);
    if images.len() == before {
        return Err(AppError::NotFound);
    }

    let mut active: ActiveModel = existing.into();
    active.images = Set(serde_json::json!(images));
    active.updated_at = Set(Utc::now().into());
    let product = active.update(&txn).await?;
    txn.commit().await?;

    remove_stored_file(&state.config.upload_dir, &payload.url).await;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "product_image_remove",
        "products",
        serde_json::json!({ "product_id": product.id, "url": payload.url }),
    )
    .await;

    Ok(ApiResponse::success(
        "Image removed",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_type_from_header_or_name() {
        assert_eq!(image_extension(Some("image/png"), None), Some("png"));
        assert_eq!(
            image_extension(Some("application/octet-stream"), Some("Photo.JPEG")),
            Some("jpg")
        );
        assert_eq!(image_extension(Some("text/plain"), Some("notes.txt")), None);
        assert_eq!(image_extension(None, None), None);
    }

    #[test]
    fn only_local_flat_names_are_deletable() {
        assert_eq!(stored_file_name("/uploads/abc.png"), Some("abc.png"));
        assert_eq!(stored_file_name("/uploads/../etc/passwd"), None);
        assert_eq!(stored_file_name("/uploads/a/b.png"), None);
        assert_eq!(stored_file_name("https://cdn.example.com/x.png"), None);
    }
}
