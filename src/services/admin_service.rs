use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use sea_orm::sea_query::LockType;
use sea_orm::ActiveValue::Set;
use uuid::Uuid;

use crate::{
    audit,
    dto::{
        admin::{DashboardStats, InventoryAdjustRequest, LowStockQuery, StatusCount},
        orders::{OrderList, OrderWithItems, UpdateOrderStatusRequest},
        products::ProductList,
    },
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{Column as OrderCol, Entity as Orders},
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Product,
    order_status::{Actor, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, PageParams, SortOrder},
    services::order_service::{apply_transition, order_view, with_items},
    state::AppState,
};

pub const LOW_STOCK_THRESHOLD: i32 = 5;

/// Revenue and profit over completed orders.
///
/// Profit per item is `(final_price - purchase_price) * quantity`, taken from
/// the order snapshot rather than current product prices.
pub fn completed_totals(totals: &[i64], items: &[(i64, i64, i32)]) -> (i64, i64) {
    let revenue = totals.iter().sum();
    let profit = items
        .iter()
        .map(|&(final_price, purchase_price, quantity)| {
            (final_price - purchase_price) * i64::from(quantity)
        })
        .sum();
    (revenue, profit)
}

pub async fn dashboard(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<DashboardStats>> {
    ensure_admin(user)?;

    let products = Products::find().count(&state.orm).await?;
    let users = Users::find().count(&state.orm).await?;
    let orders = Orders::find().count(&state.orm).await?;
    let low_stock = Products::find()
        .filter(ProdCol::Stock.lte(LOW_STOCK_THRESHOLD))
        .count(&state.orm)
        .await?;

    let mut orders_by_status = Vec::with_capacity(OrderStatus::ALL.len());
    for status in OrderStatus::ALL {
        let count = Orders::find()
            .filter(OrderCol::Status.eq(status))
            .count(&state.orm)
            .await?;
        orders_by_status.push(StatusCount {
            status,
            label: status.label().to_string(),
            count,
        });
    }

    let completed: Vec<(Uuid, i64)> = Orders::find()
        .select_only()
        .column(OrderCol::Id)
        .column(OrderCol::TotalPrice)
        .filter(OrderCol::Status.eq(OrderStatus::Completed))
        .into_tuple()
        .all(&state.orm)
        .await?;
    let (ids, totals): (Vec<Uuid>, Vec<i64>) = completed.into_iter().unzip();

    let items: Vec<(i64, i64, i32)> = if ids.is_empty() {
        Vec::new()
    } else {
        OrderItems::find()
            .select_only()
            .column(OrderItemCol::FinalPrice)
            .column(OrderItemCol::PurchasePrice)
            .column(OrderItemCol::Quantity)
            .filter(OrderItemCol::OrderId.is_in(ids))
            .into_tuple()
            .all(&state.orm)
            .await?
    };
    let (revenue, profit) = completed_totals(&totals, &items);

    Ok(ApiResponse::success(
        "Dashboard",
        DashboardStats {
            products,
            users,
            orders,
            orders_by_status,
            revenue,
            profit,
            low_stock,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let mut finder = Orders::find().filter(condition);

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await?;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_view)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::success(
        "Orders",
        OrderList { items: orders },
        Some(Meta::paged(page, limit, total)),
    ))
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let data = with_items(&state.orm, order).await?;
    Ok(ApiResponse::success("Order found", data, Some(Meta::empty())))
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let existing = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let order = apply_transition(&txn, existing, payload.status, Actor::Admin).await?;
    let data = with_items(&txn, order).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "order_status_update",
        "orders",
        serde_json::json!({ "order_id": data.order.id, "status": data.order.status }),
    )
    .await;

    Ok(ApiResponse::success("Order updated", data, Some(Meta::empty())))
}

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<ProductList>> {
    ensure_admin(user)?;
    let threshold = query.threshold.unwrap_or(LOW_STOCK_THRESHOLD);
    let (page, limit, offset) = query.pagination().normalize();

    let finder = Products::find()
        .filter(ProdCol::Stock.lte(threshold))
        .order_by_asc(ProdCol::Stock)
        .order_by_desc(ProdCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await?;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    Ok(ApiResponse::success(
        "Low stock",
        ProductList { items },
        Some(Meta::paged(page, limit, total)),
    ))
}

pub async fn adjust_inventory(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    if payload.delta == 0 {
        return Err(AppError::BadRequest("delta must not be 0".into()));
    }

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let new_stock = product
        .stock
        .checked_add(payload.delta)
        .filter(|s| *s >= 0)
        .ok_or_else(|| AppError::BadRequest("stock cannot be negative".into()))?;

    let mut active: ProductActive = product.into();
    active.stock = Set(new_stock);
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&txn).await?;

    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "inventory_adjust",
        "products",
        serde_json::json!({ "product_id": updated.id, "delta": payload.delta }),
    )
    .await;

    Ok(ApiResponse::success(
        "Inventory updated",
        Product::from(updated),
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profit_uses_snapshot_prices() {
        let (revenue, profit) =
            completed_totals(&[25_000, 5_000], &[(9_000, 6_000, 2), (4_500, 5_000, 1)]);
        assert_eq!(revenue, 30_000);
        assert_eq!(profit, 3_000 * 2 - 500);
    }

    #[test]
    fn no_completed_orders_means_zero() {
        assert_eq!(completed_totals(&[], &[]), (0, 0));
    }
}
