use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::offers::{CreateOfferRequest, OfferList, OfferQuery, UpdateOfferRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Offer,
    response::ApiResponse,
    services::offer_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_offers).post(create_offer))
        .route("/{id}", get(get_offer).put(update_offer).delete(delete_offer))
}

#[utoipa::path(
    get,
    path = "/api/offer",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("active" = Option<bool>, Query, description = "Only offers live right now")
    ),
    responses(
        (status = 200, description = "List offers", body = ApiResponse<OfferList>)
    ),
    tag = "Offers"
)]
pub async fn list_offers(
    State(state): State<AppState>,
    Query(query): Query<OfferQuery>,
) -> AppResult<Json<ApiResponse<OfferList>>> {
    Ok(Json(offer_service::list_offers(&state, query).await?))
}

#[utoipa::path(
    get,
    path = "/api/offer/{id}",
    params(("id" = Uuid, Path, description = "Offer ID")),
    responses(
        (status = 200, description = "Get offer", body = ApiResponse<Offer>),
        (status = 404, description = "Offer not found")
    ),
    tag = "Offers"
)]
pub async fn get_offer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Offer>>> {
    Ok(Json(offer_service::get_offer(&state, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/offer",
    request_body = CreateOfferRequest,
    responses(
        (status = 200, description = "Create offer", body = ApiResponse<Offer>),
        (status = 400, description = "Invalid offer"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Offers"
)]
pub async fn create_offer(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateOfferRequest>,
) -> AppResult<Json<ApiResponse<Offer>>> {
    Ok(Json(offer_service::create_offer(&state, &user, payload).await?))
}

#[utoipa::path(
    put,
    path = "/api/offer/{id}",
    params(("id" = Uuid, Path, description = "Offer ID")),
    request_body = UpdateOfferRequest,
    responses(
        (status = 200, description = "Update offer", body = ApiResponse<Offer>),
        (status = 400, description = "Invalid offer"),
        (status = 404, description = "Offer not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Offers"
)]
pub async fn update_offer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOfferRequest>,
) -> AppResult<Json<ApiResponse<Offer>>> {
    Ok(Json(offer_service::update_offer(&state, &user, id, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/api/offer/{id}",
    params(("id" = Uuid, Path, description = "Offer ID")),
    responses(
        (status = 200, description = "Delete offer", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Offer not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Offers"
)]
pub async fn delete_offer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    Ok(Json(offer_service::delete_offer(&state, &user, id).await?))
}
