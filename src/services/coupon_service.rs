use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;

use crate::{
    audit,
    dto::coupons::{CouponList, CreateCouponRequest, UpdateCouponRequest, ValidateCouponRequest},
    entity::coupons::{ActiveModel as CouponActive, Column as CouponCol, Entity as Coupons, Model as CouponModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Coupon,
    pricing::{CouponTerms, DiscountTerms, normalize_code},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::offer_service,
    state::AppState,
};

pub const INVALID_COUPON: &str = "Invalid or expired coupon";

/// Usable right now: active and not yet expired.
pub fn is_valid(coupon: &CouponModel, now: DateTime<Utc>) -> bool {
    coupon.is_active && now < coupon.expiry_date.with_timezone(&Utc)
}

async fn find_by_code<C: ConnectionTrait>(conn: &C, code: &str) -> AppResult<Option<CouponModel>> {
    Ok(Coupons::find()
        .filter(CouponCol::Code.eq(normalize_code(code)))
        .one(conn)
        .await?)
}

/// Resolves a code entered at checkout.
///
/// A coupon record must be valid. A code with no record is accepted only
/// when a live coupon offer carries it; the offer itself is applied by pricing.
pub async fn resolve_code<C: ConnectionTrait>(
    conn: &C,
    code: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<Option<CouponTerms>> {
    let Some(code) = code.map(normalize_code).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };

    match find_by_code(conn, &code).await? {
        Some(coupon) if is_valid(&coupon, now) => Ok(Some(CouponTerms {
            code: coupon.code,
            terms: DiscountTerms::new(coupon.discount_type, coupon.discount_value),
        })),
        Some(_) => Err(AppError::BadRequest(INVALID_COUPON.into())),
        None if offer_service::coupon_offer_exists(conn, &code, now).await? => Ok(None),
        None => Err(AppError::BadRequest(INVALID_COUPON.into())),
    }
}

pub async fn validate_coupon(
    state: &AppState,
    payload: ValidateCouponRequest,
) -> AppResult<ApiResponse<Coupon>> {
    let coupon = find_by_code(&state.orm, &payload.code)
        .await?
        .filter(|c| is_valid(c, Utc::now()))
        .ok_or_else(|| AppError::BadRequest(INVALID_COUPON.into()))?;
    Ok(ApiResponse::success("Coupon applied", Coupon::from(coupon), None))
}

pub async fn list_coupons(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<CouponList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Coupons::find().order_by_desc(CouponCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await?;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Coupon::from)
        .collect();

    Ok(ApiResponse::success(
        "Coupons",
        CouponList { items },
        Some(Meta::paged(page, limit, total)),
    ))
}

fn code_taken() -> AppError {
    AppError::Conflict("Coupon code already exists".into())
}

async fn ensure_code_free(state: &AppState, code: &str, except: Option<Uuid>) -> AppResult<()> {
    if let Some(existing) = find_by_code(&state.orm, code).await?
        && Some(existing.id) != except
    {
        return Err(code_taken());
    }
    Ok(())
}

pub async fn create_coupon(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCouponRequest,
) -> AppResult<ApiResponse<Coupon>> {
    ensure_admin(user)?;
    let code = normalize_code(&payload.code);
    if code.is_empty() {
        return Err(AppError::BadRequest("Code is required".into()));
    }
    DiscountTerms::new(payload.discount_type, payload.discount_value)
        .validate()
        .map_err(AppError::BadRequest)?;
    ensure_code_free(state, &code, None).await?;

    let coupon = CouponActive {
        id: Set(Uuid::new_v4()),
        code: Set(code),
        discount_type: Set(payload.discount_type),
        discount_value: Set(payload.discount_value),
        expiry_date: Set(payload.expiry_date.into()),
        is_active: Set(payload.is_active.unwrap_or(true)),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|e| AppError::on_unique_violation(e, code_taken()))?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "coupon_create",
        "coupons",
        serde_json::json!({ "coupon_id": coupon.id, "code": coupon.code }),
    )
    .await;

    Ok(ApiResponse::success(
        "Coupon created",
        Coupon::from(coupon),
        Some(Meta::empty()),
    ))
}

pub async fn update_coupon(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCouponRequest,
) -> AppResult<ApiResponse<Coupon>> {
    ensure_admin(user)?;
    let existing = Coupons::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    DiscountTerms::new(
        payload.discount_type.unwrap_or(existing.discount_type),
        payload.discount_value.unwrap_or(existing.discount_value),
    )
    .validate()
    .map_err(AppError::BadRequest)?;

    let mut active: CouponActive = existing.into();
    if let Some(code) = payload.code {
        let code = normalize_code(&code);
        if code.is_empty() {
            return Err(AppError::BadRequest("Code is required".into()));
        }
        ensure_code_free(state, &code, Some(id)).await?;
        active.code = Set(code);
    }
    if let Some(discount_type) = payload.discount_type {
        active.discount_type = Set(discount_type);
    }
    if let Some(discount_value) = payload.discount_value {
        active.discount_value = Set(discount_value);
    }
    if let Some(expiry_date) = payload.expiry_date {
        active.expiry_date = Set(expiry_date.into());
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    let coupon = active
        .update(&state.orm)
        .await
        .map_err(|e| AppError::on_unique_violation(e, code_taken()))?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "coupon_update",
        "coupons",
        serde_json::json!({ "coupon_id": coupon.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Coupon updated",
        Coupon::from(coupon),
        Some(Meta::empty()),
    ))
}

pub async fn delete_coupon(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Coupons::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "coupon_delete",
        "coupons",
        serde_json::json!({ "coupon_id": id }),
    )
    .await;

    Ok(ApiResponse::done("Deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::DiscountType;
    use chrono::Duration;

    fn coupon(is_active: bool, expiry: DateTime<Utc>) -> CouponModel {
        CouponModel {
            id: Uuid::new_v4(),
            code: "SAVE10".into(),
            discount_type: DiscountType::Percentage,
            discount_value: 10,
            expiry_date: expiry.into(),
            is_active,
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn expired_coupon_is_never_valid() {
        let now = Utc::now();
        assert!(!is_valid(&coupon(true, now - Duration::seconds(1)), now));
        assert!(!is_valid(&coupon(true, now), now));
        assert!(!is_valid(&coupon(false, now + Duration::days(1)), now));
        assert!(is_valid(&coupon(true, now + Duration::days(1)), now));
    }
}
