use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;

use crate::{
    audit,
    dto::wishlist::{AddWishRequest, WishList},
    entity::{
        products::Entity as Products,
        wish_items::{ActiveModel as WishActive, Column as WishCol, Entity as WishItems},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Product, WishItem},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::product_service::attach_offer_prices,
    state::AppState,
};

pub async fn list_wishes(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<WishList>> {
    let (page, limit, offset) = pagination.normalize();

    let finder = WishItems::find()
        .filter(WishCol::UserId.eq(user.user_id))
        .order_by_desc(WishCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await?;

    let rows: Vec<_> = finder
        .find_also_related(Products)
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .filter_map(|(wish, product)| product.map(|p| (wish, Product::from(p))))
        .collect();

    let (wishes, mut products): (Vec<_>, Vec<_>) = rows.into_iter().unzip();
    attach_offer_prices(&state.orm, &mut products).await?;

    let items = wishes
        .into_iter()
        .zip(products)
        .map(|(wish, product)| WishItem {
            id: wish.id,
            product,
            created_at: wish.created_at.with_timezone(&Utc),
        })
        .collect();

    Ok(ApiResponse::success(
        "OK",
        WishList { items },
        Some(Meta::paged(page, limit, total)),
    ))
}

/// Adding a product already on the list returns the existing entry.
pub async fn add_wish(
    state: &AppState,
    user: &AuthUser,
    payload: AddWishRequest,
) -> AppResult<ApiResponse<WishItem>> {
    let product = Products::find_by_id(payload.product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("Product not found".into()))?;

    let existing = WishItems::find()
        .filter(WishCol::UserId.eq(user.user_id))
        .filter(WishCol::ProductId.eq(payload.product_id))
        .one(&state.orm)
        .await?;

    let wish = if let Some(wish) = existing {
        wish
    } else {
        let wish = WishActive {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.user_id),
            product_id: Set(payload.product_id),
            created_at: NotSet,
        }
        .insert(&state.orm)
        .await?;

        audit::record(
            &state.pool,
            Some(user.user_id),
            "wish_add",
            "wish_items",
            serde_json::json!({ "product_id": payload.product_id }),
        )
        .await;
        wish
    };

    let mut products = [Product::from(product)];
    attach_offer_prices(&state.orm, &mut products).await?;
    let [product] = products;

    Ok(ApiResponse::success(
        "Added to wishlist",
        WishItem {
            id: wish.id,
            product,
            created_at: wish.created_at.with_timezone(&Utc),
        },
        Some(Meta::empty()),
    ))
}

pub async fn remove_wish(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = WishItems::delete_many()
        .filter(WishCol::UserId.eq(user.user_id))
        .filter(WishCol::ProductId.eq(product_id))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "wish_remove",
        "wish_items",
        serde_json::json!({ "product_id": product_id }),
    )
    .await;

    Ok(ApiResponse::done("Removed from wishlist"))
}
