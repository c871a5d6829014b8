use chrono::Utc;
use sea_orm::{
    ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    sea_query::OnConflict,
};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;

use crate::{
    audit,
    dto::cart::{AddToCartRequest, CartList},
    entity::{
        cart_items::{ActiveModel as CartActive, Column as CartCol, Entity as CartItems},
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{CartItem, Product},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::product_service::attach_offer_prices,
    state::AppState,
};

pub async fn list_cart(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<CartList>> {
    let (page, limit, offset) = pagination.normalize();

    let finder = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .order_by_desc(CartCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await?;

    let rows = finder
        .find_also_related(Products)
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let mut products: Vec<Product> = Vec::with_capacity(rows.len());
    let mut lines = Vec::with_capacity(rows.len());
    for (item, product) in rows {
        // FK cascade removes lines whose product is deleted
        let Some(product) = product else { continue };
        products.push(Product::from(product));
        lines.push(item);
    }
    attach_offer_prices(&state.orm, &mut products).await?;

    let items = lines
        .into_iter()
        .zip(products)
        .map(|(item, product)| CartItem {
            id: item.id,
            product,
            quantity: item.quantity,
            created_at: item.created_at.with_timezone(&Utc),
        })
        .collect();

    Ok(ApiResponse::success(
        "OK",
        CartList { items },
        Some(Meta::paged(page, limit, total)),
    ))
}

/// Sets the quantity of a product in the cart, inserting the line if absent.
pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let product = Products::find_by_id(payload.product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("product not found".to_string()))?;
    if payload.quantity > product.stock {
        return Err(AppError::BadRequest(format!(
            "Only {} of {} in stock",
            product.stock, product.title
        )));
    }

    let line = CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        product_id: Set(payload.product_id),
        quantity: Set(payload.quantity),
        created_at: NotSet,
    };
    let item = CartItems::insert(line)
        .on_conflict(
            OnConflict::columns([CartCol::UserId, CartCol::ProductId])
                .update_column(CartCol::Quantity)
                .to_owned(),
        )
        .exec_with_returning(&state.orm)
        .await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "cart_update",
        "cart_items",
        serde_json::json!({ "product_id": payload.product_id, "quantity": payload.quantity }),
    )
    .await;

    let mut products = [Product::from(product)];
    attach_offer_prices(&state.orm, &mut products).await?;
    let [product] = products;

    Ok(ApiResponse::success(
        "OK",
        CartItem {
            id: item.id,
            product,
            quantity: item.quantity,
            created_at: item.created_at.with_timezone(&Utc),
        },
        None,
    ))
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .filter(CartCol::ProductId.eq(product_id))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "cart_remove",
        "cart_items",
        serde_json::json!({ "product_id": product_id }),
    )
    .await;

    Ok(ApiResponse::done("Removed from cart"))
}

pub async fn clear_cart(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;

    tracing::debug!(user_id = %user.user_id, removed = result.rows_affected, "cart cleared");
    Ok(ApiResponse::done("Cart cleared"))
}
