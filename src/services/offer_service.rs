use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;

use crate::{
    audit,
    dto::offers::{CreateOfferRequest, OfferList, OfferQuery, UpdateOfferRequest},
    entity::{
        offer_products::{
            ActiveModel as OfferProductActive, Column as OfferProductCol,
            Entity as OfferProducts,
        },
        offers::{ActiveModel as OfferActive, Column as OfferCol, Entity as Offers, Model as OfferModel},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Offer,
    pricing::{DiscountTerms, OfferKind, OfferTerms, normalize_code},
    response::{ApiResponse, Meta},
    routes::params::PageParams,
    state::AppState,
};

/// Live offers touching any of `product_ids`, ready for pricing.
pub async fn load_live_offers<C: ConnectionTrait>(
    conn: &C,
    product_ids: &[Uuid],
    now: DateTime<Utc>,
) -> AppResult<Vec<OfferTerms>> {
    if product_ids.is_empty() {
        return Ok(Vec::new());
    }

    let links = OfferProducts::find()
        .filter(OfferProductCol::ProductId.is_in(product_ids.iter().copied()))
        .all(conn)
        .await?;
    let mut by_offer: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for link in links {
        by_offer.entry(link.offer_id).or_default().push(link.product_id);
    }
    if by_offer.is_empty() {
        return Ok(Vec::new());
    }

    let offers = Offers::find()
        .filter(OfferCol::Id.is_in(by_offer.keys().copied()))
        .filter(OfferCol::StartDate.lte(now))
        .filter(OfferCol::EndDate.gte(now))
        .all(conn)
        .await?;

    Ok(offers
        .into_iter()
        .map(|offer| {
            let product_ids = by_offer.remove(&offer.id).unwrap_or_default();
            offer_terms(offer, product_ids)
        })
        .collect())
}

/// Live coupon-kind offers carrying `code`.
pub async fn coupon_offer_exists<C: ConnectionTrait>(
    conn: &C,
    code: &str,
    now: DateTime<Utc>,
) -> AppResult<bool> {
    let count = Offers::find()
        .filter(OfferCol::Kind.eq(OfferKind::Coupon))
        .filter(OfferCol::CouponCode.eq(normalize_code(code)))
        .filter(OfferCol::StartDate.lte(now))
        .filter(OfferCol::EndDate.gte(now))
        .count(conn)
        .await?;
    Ok(count > 0)
}

fn offer_terms(offer: OfferModel, product_ids: Vec<Uuid>) -> OfferTerms {
    OfferTerms {
        offer_id: offer.id,
        kind: offer.kind,
        terms: DiscountTerms::new(offer.discount_type, offer.discount_value),
        coupon_code: offer.coupon_code,
        product_ids,
        start_date: offer.start_date.with_timezone(&Utc),
        end_date: offer.end_date.with_timezone(&Utc),
    }
}

async fn product_ids_for<C: ConnectionTrait>(
    conn: &C,
    offer_ids: &[Uuid],
) -> AppResult<HashMap<Uuid, Vec<Uuid>>> {
    let mut map: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    if offer_ids.is_empty() {
        return Ok(map);
    }
    let links = OfferProducts::find()
        .filter(OfferProductCol::OfferId.is_in(offer_ids.iter().copied()))
        .all(conn)
        .await?;
    for link in links {
        map.entry(link.offer_id).or_default().push(link.product_id);
    }
    Ok(map)
}

pub async fn list_offers(
    state: &AppState,
    query: OfferQuery,
) -> AppResult<ApiResponse<OfferList>> {
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if query.active.unwrap_or(false) {
        let now = Utc::now();
        condition = condition
            .add(OfferCol::StartDate.lte(now))
            .add(OfferCol::EndDate.gte(now));
    }

    let finder = Offers::find()
        .filter(condition)
        .order_by_desc(OfferCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await?;
    let offers = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let ids: Vec<Uuid> = offers.iter().map(|o| o.id).collect();
    let mut products = product_ids_for(&state.orm, &ids).await?;
    let items = offers
        .into_iter()
        .map(|offer| {
            let product_ids = products.remove(&offer.id).unwrap_or_default();
            Offer::from_entity(offer, product_ids)
        })
        .collect();

    Ok(ApiResponse::success(
        "Offers",
        OfferList { items },
        Some(Meta::paged(page, limit, total)),
    ))
}

pub async fn get_offer(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Offer>> {
    let offer = Offers::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let product_ids = product_ids_for(&state.orm, &[id])
        .await?
        .remove(&id)
        .unwrap_or_default();
    Ok(ApiResponse::success(
        "Offer",
        Offer::from_entity(offer, product_ids),
        None,
    ))
}

struct OfferInput {
    title: String,
    kind: OfferKind,
    terms: DiscountTerms,
    coupon_code: Option<String>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    product_ids: Vec<Uuid>,
}

impl OfferInput {
    fn validate(mut self) -> AppResult<Self> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return Err(AppError::BadRequest("Title is required".into()));
        }
        self.terms.validate().map_err(AppError::BadRequest)?;
        if self.start_date >= self.end_date {
            return Err(AppError::BadRequest("start_date must be before end_date".into()));
        }
        self.coupon_code = match self.kind {
            OfferKind::Coupon => {
                let code = self
                    .coupon_code
                    .as_deref()
                    .map(normalize_code)
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        AppError::BadRequest("coupon_code is required for coupon offers".into())
                    })?;
                Some(code)
            }
            OfferKind::Discount => None,
        };
        self.product_ids.sort();
        self.product_ids.dedup();
        if self.product_ids.is_empty() {
            return Err(AppError::BadRequest("Offer needs at least one product".into()));
        }
        Ok(self)
    }
}

async fn ensure_products_exist<C: ConnectionTrait>(conn: &C, ids: &[Uuid]) -> AppResult<()> {
    let found = Products::find()
        .filter(ProdCol::Id.is_in(ids.iter().copied()))
        .count(conn)
        .await?;
    if found as usize != ids.len() {
        return Err(AppError::BadRequest("Unknown product in offer".into()));
    }
    Ok(())
}

async fn replace_links<C: ConnectionTrait>(
    conn: &C,
    offer_id: Uuid,
    product_ids: &[Uuid],
) -> AppResult<()> {
    OfferProducts::delete_many()
        .filter(OfferProductCol::OfferId.eq(offer_id))
        .exec(conn)
        .await?;
    for product_id in product_ids {
        OfferProductActive {
            offer_id: Set(offer_id),
            product_id: Set(*product_id),
        }
        .insert(conn)
        .await?;
    }
    Ok(())
}

pub async fn create_offer(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOfferRequest,
) -> AppResult<ApiResponse<Offer>> {
    ensure_admin(user)?;
    let input = OfferInput {
        title: payload.title,
        kind: payload.kind,
        terms: DiscountTerms::new(payload.discount_type, payload.discount_value),
        coupon_code: payload.coupon_code,
        start_date: payload.start_date,
        end_date: payload.end_date,
        product_ids: payload.product_ids,
    }
    .validate()?;

    let txn = state.orm.begin().await?;
    ensure_products_exist(&txn, &input.product_ids).await?;

    let offer = OfferActive {
        id: Set(Uuid::new_v4()),
        title: Set(input.title),
        kind: Set(input.kind),
        discount_type: Set(input.terms.discount_type),
        discount_value: Set(input.terms.discount_value),
        coupon_code: Set(input.coupon_code),
        start_date: Set(input.start_date.into()),
        end_date: Set(input.end_date.into()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;
    replace_links(&txn, offer.id, &input.product_ids).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "offer_create",
        "offers",
        serde_json::json!({ "offer_id": offer.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Offer created",
        Offer::from_entity(offer, input.product_ids),
        Some(Meta::empty()),
    ))
}

pub async fn update_offer(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOfferRequest,
) -> AppResult<ApiResponse<Offer>> {
    ensure_admin(user)?;
    let txn = state.orm.begin().await?;

    let existing = Offers::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    let current_products = product_ids_for(&txn, &[id])
        .await?
        .remove(&id)
        .unwrap_or_default();

    let products_changed = payload.product_ids.is_some();
    let input = OfferInput {
        title: payload.title.unwrap_or_else(|| existing.title.clone()),
        kind: payload.kind.unwrap_or(existing.kind),
        terms: DiscountTerms::new(
            payload.discount_type.unwrap_or(existing.discount_type),
            payload.discount_value.unwrap_or(existing.discount_value),
        ),
        coupon_code: payload.coupon_code.or_else(|| existing.coupon_code.clone()),
        start_date: payload
            .start_date
            .unwrap_or_else(|| existing.start_date.with_timezone(&Utc)),
        end_date: payload
            .end_date
            .unwrap_or_else(|| existing.end_date.with_timezone(&Utc)),
        product_ids: payload.product_ids.unwrap_or(current_products),
    }
    .validate()?;

    if products_changed {
        ensure_products_exist(&txn, &input.product_ids).await?;
        replace_links(&txn, id, &input.product_ids).await?;
    }

    let mut active: OfferActive = existing.into();
    active.title = Set(input.title);
    active.kind = Set(input.kind);
    active.discount_type = Set(input.terms.discount_type);
    active.discount_value = Set(input.terms.discount_value);
    active.coupon_code = Set(input.coupon_code);
    active.start_date = Set(input.start_date.into());
    active.end_date = Set(input.end_date.into());
    active.updated_at = Set(Utc::now().into());
    let offer = active.update(&txn).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "offer_update",
        "offers",
        serde_json::json!({ "offer_id": offer.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Offer updated",
        Offer::from_entity(offer, input.product_ids),
        Some(Meta::empty()),
    ))
}

pub async fn delete_offer(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Offers::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "offer_delete",
        "offers",
        serde_json::json!({ "offer_id": id }),
    )
    .await;

    Ok(ApiResponse::done("Deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::DiscountType;
    use chrono::Duration;

    fn input(kind: OfferKind, code: Option<&str>) -> OfferInput {
        let now = Utc::now();
        let id = Uuid::new_v4();
        OfferInput {
            title: " Spring sale ".into(),
            kind,
            terms: DiscountTerms::new(DiscountType::Percentage, 15),
            coupon_code: code.map(str::to_string),
            start_date: now,
            end_date: now + Duration::days(7),
            product_ids: vec![id, id],
        }
    }

    #[test]
    fn coupon_offer_requires_code_and_normalizes_it() {
        assert!(input(OfferKind::Coupon, None).validate().is_err());
        let valid = input(OfferKind::Coupon, Some("spring15")).validate().unwrap();
        assert_eq!(valid.coupon_code.as_deref(), Some("SPRING15"));
        assert_eq!(valid.title, "Spring sale");
        assert_eq!(valid.product_ids.len(), 1);
    }

    #[test]
    fn discount_offer_drops_stray_code() {
        let valid = input(OfferKind::Discount, Some("IGNORED")).validate().unwrap();
        assert_eq!(valid.coupon_code, None);
    }

    #[test]
    fn window_must_be_ordered() {
        let mut bad = input(OfferKind::Discount, None);
        bad.end_date = bad.start_date;
        assert!(bad.validate().is_err());
    }
}
