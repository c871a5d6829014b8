use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use uuid::Uuid;

use crate::{
    dto::notifications::{MarkedRead, NotificationList, NotificationQuery},
    entity::{
        notifications::{ActiveModel as NotificationActive, Column as NotificationCol, Entity as Notifications},
        orders::Model as OrderModel,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Notification,
    response::{ApiResponse, Meta},
    routes::params::PageParams,
    state::AppState,
};

pub const AUDIENCE_ADMIN: &str = "admin";
pub const AUDIENCE_USER: &str = "user";

fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_uppercase()
}

pub fn placed_message(order: &OrderModel) -> String {
    format!(
        "Order #{} placed by {} ({})",
        short_id(order.id),
        order.customer_name,
        order.status
    )
}

pub fn status_message(order: &OrderModel) -> String {
    format!("Order #{} is now {}", short_id(order.id), order.status)
}

/// One record for admins plus one for the owning user, if any.
pub async fn notify_order<C: ConnectionTrait>(
    conn: &C,
    order: &OrderModel,
    message: String,
) -> AppResult<()> {
    let mut recipients = vec![(AUDIENCE_ADMIN, None)];
    if let Some(user_id) = order.user_id {
        recipients.push((AUDIENCE_USER, Some(user_id)));
    }

    for (audience, user_id) in recipients {
        NotificationActive {
            id: Set(Uuid::new_v4()),
            audience: Set(audience.to_string()),
            user_id: Set(user_id),
            order_id: Set(Some(order.id)),
            message: Set(message.clone()),
            is_read: Set(false),
            created_at: NotSet,
        }
        .insert(conn)
        .await?;
    }
    Ok(())
}

fn scope(user: &AuthUser) -> Condition {
    if user.is_admin() {
        Condition::all().add(NotificationCol::Audience.eq(AUDIENCE_ADMIN))
    } else {
        Condition::all()
            .add(NotificationCol::Audience.eq(AUDIENCE_USER))
            .add(NotificationCol::UserId.eq(user.user_id))
    }
}

pub async fn list_notifications(
    state: &AppState,
    user: &AuthUser,
    query: NotificationQuery,
) -> AppResult<ApiResponse<NotificationList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = scope(user);
    if query.unread_only.unwrap_or(false) {
        condition = condition.add(NotificationCol::IsRead.eq(false));
    }

    let finder = Notifications::find()
        .filter(condition)
        .order_by_desc(NotificationCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await?;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Notification::from)
        .collect();

    Ok(ApiResponse::success(
        "Notifications",
        NotificationList { items },
        Some(Meta::paged(page, limit, total)),
    ))
}

pub async fn mark_read(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Notification>> {
    let existing = Notifications::find_by_id(id)
        .filter(scope(user))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: NotificationActive = existing.into();
    active.is_read = Set(true);
    let updated = active.update(&state.orm).await?;

    Ok(ApiResponse::success("Marked as read", Notification::from(updated), None))
}

pub async fn mark_all_read(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<MarkedRead>> {
    let result = Notifications::update_many()
        .col_expr(NotificationCol::IsRead, Expr::value(true))
        .filter(scope(user))
        .filter(NotificationCol::IsRead.eq(false))
        .exec(&state.orm)
        .await?;

    Ok(ApiResponse::success(
        "Marked as read",
        MarkedRead {
            updated: result.rows_affected,
        },
        None,
    ))
}

pub async fn delete_notification(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = Notifications::delete_many()
        .filter(NotificationCol::Id.eq(id))
        .filter(scope(user))
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(ApiResponse::done("Deleted"))
}
