use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use uuid::Uuid;

use crate::{
    audit,
    dto::{
        cart::{CartLine, QuoteRequest},
        orders::{CheckoutRequest, OrderList, OrderWithItems},
    },
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, MaybeAuthUser},
    models::{Order, OrderItem, ShippingAddress},
    order_status::{Actor, OrderStatus},
    pricing::{PriceBreakdown, PricingLine, PricingRequest, price_order},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, PageParams, SortOrder},
    services::{coupon_service, notification_service, offer_service},
    state::AppState,
};

pub const PAYMENT_METHODS: [&str; 3] = ["cash_on_delivery", "card", "bank_transfer"];

pub(crate) fn order_view(model: OrderModel) -> AppResult<Order> {
    Order::try_from(model).map_err(|e| AppError::Internal(e.into()))
}

pub(crate) async fn load_items<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> AppResult<Vec<OrderItem>> {
    Ok(OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .order_by_asc(OrderItemCol::Position)
        .all(conn)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect())
}

pub(crate) async fn with_items<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
) -> AppResult<OrderWithItems> {
    let items = load_items(conn, order.id).await?;
    Ok(OrderWithItems {
        order: order_view(order)?,
        items,
    })
}

/// Sums quantities of repeated products, keeping first-seen order.
pub fn merge_lines(lines: Vec<CartLine>) -> AppResult<Vec<CartLine>> {
    let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
    let mut index: HashMap<Uuid, usize> = HashMap::new();
    for line in lines {
        if line.quantity <= 0 {
            return Err(AppError::BadRequest("quantity must be greater than 0".into()));
        }
        match index.get(&line.product_id) {
            Some(&i) => {
                merged[i].quantity = merged[i]
                    .quantity
                    .checked_add(line.quantity)
                    .ok_or_else(|| AppError::BadRequest("quantity is too large".into()))?;
            }
            None => {
                index.insert(line.product_id, merged.len());
                merged.push(line);
            }
        }
    }
    Ok(merged)
}

/// Lines from the request, or the caller's stored cart when omitted.
async fn resolve_lines<C: ConnectionTrait>(
    conn: &C,
    user: Option<&AuthUser>,
    items: Option<Vec<CartLine>>,
) -> AppResult<(Vec<CartLine>, bool)> {
    if let Some(items) = items.filter(|i| !i.is_empty()) {
        return Ok((merge_lines(items)?, false));
    }
    let Some(user) = user else {
        return Err(AppError::BadRequest("Cart is empty".into()));
    };
    let lines: Vec<CartLine> = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .order_by_asc(CartCol::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(|item| CartLine {
            product_id: item.product_id,
            quantity: item.quantity,
        })
        .collect();
    if lines.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }
    Ok((lines, true))
}

/// Loads products (row-locked when `lock`), checks stock and prices the lines.
async fn price_lines<C: ConnectionTrait>(
    conn: &C,
    lines: &[CartLine],
    coupon_code: Option<&str>,
    delivery_fee: i64,
    lock: bool,
) -> AppResult<PriceBreakdown> {
    let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
    let mut finder = Products::find().filter(ProdCol::Id.is_in(ids.iter().copied()));
    if lock {
        finder = finder.lock(LockType::Update);
    }
    let products: HashMap<Uuid, ProductModel> = finder
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let mut pricing_lines = Vec::with_capacity(lines.len());
    for line in lines {
        let product = products.get(&line.product_id).ok_or_else(|| {
            AppError::BadRequest(format!("Product {} not found", line.product_id))
        })?;
        if product.stock < line.quantity {
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for {}",
                product.title
            )));
        }
        pricing_lines.push(PricingLine {
            product_id: product.id,
            title: product.title.clone(),
            unit_price: product.price,
            purchase_price: product.purchase_price,
            quantity: line.quantity,
        });
    }

    let now = Utc::now();
    let offers = offer_service::load_live_offers(conn, &ids, now).await?;
    let coupon = coupon_service::resolve_code(conn, coupon_code, now).await?;

    let breakdown = price_order(&PricingRequest {
        lines: &pricing_lines,
        offers: &offers,
        entered_code: coupon_code,
        coupon: coupon.as_ref(),
        delivery_fee,
        now,
    })?;
    Ok(breakdown)
}

pub async fn quote(
    state: &AppState,
    user: &MaybeAuthUser,
    payload: QuoteRequest,
) -> AppResult<ApiResponse<PriceBreakdown>> {
    let (lines, _) = resolve_lines(&state.orm, user.0.as_ref(), payload.items).await?;
    let breakdown = price_lines(
        &state.orm,
        &lines,
        payload.coupon_code.as_deref(),
        state.config.delivery_fee,
        false,
    )
    .await?;
    Ok(ApiResponse::success("Quote", breakdown, Some(Meta::empty())))
}

struct Contact {
    name: String,
    email: String,
    phone: String,
}

fn validate_address(address: &ShippingAddress) -> AppResult<()> {
    if address.line1.trim().is_empty()
        || address.city.trim().is_empty()
        || address.country.trim().is_empty()
    {
        return Err(AppError::BadRequest(
            "Shipping address needs line1, city and country".into(),
        ));
    }
    Ok(())
}

async fn resolve_contact<C: ConnectionTrait>(
    conn: &C,
    user: Option<&AuthUser>,
    payload: &CheckoutRequest,
) -> AppResult<Contact> {
    let profile = match user {
        Some(user) => Users::find_by_id(user.user_id).one(conn).await?,
        None => None,
    };
    let pick = |given: &Option<String>, fallback: Option<&str>| {
        given
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or(fallback.map(str::trim).filter(|v| !v.is_empty()))
            .map(str::to_string)
    };

    let name = pick(&payload.customer_name, profile.as_ref().map(|p| p.name.as_str()))
        .ok_or_else(|| AppError::BadRequest("customer_name is required".into()))?;
    let email = pick(&payload.customer_email, profile.as_ref().map(|p| p.email.as_str()))
        .filter(|e| e.contains('@'))
        .ok_or_else(|| AppError::BadRequest("a valid customer_email is required".into()))?;
    let phone = pick(
        &payload.customer_phone,
        profile.as_ref().and_then(|p| p.phone.as_deref()),
    )
    .ok_or_else(|| AppError::BadRequest("customer_phone is required".into()))?;

    Ok(Contact { name, email, phone })
}

pub async fn checkout(
    state: &AppState,
    user: &MaybeAuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let user = user.0.as_ref();
    if !PAYMENT_METHODS.contains(&payload.payment_method.as_str()) {
        return Err(AppError::BadRequest("Unsupported payment method".into()));
    }
    validate_address(&payload.shipping_address)?;

    let txn = state.orm.begin().await?;

    let contact = resolve_contact(&txn, user, &payload).await?;
    let (lines, from_cart) = resolve_lines(&txn, user, payload.items.clone()).await?;
    let breakdown = price_lines(
        &txn,
        &lines,
        payload.coupon_code.as_deref(),
        state.config.delivery_fee,
        true,
    )
    .await?;

    let order_id = Uuid::new_v4();
    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.map(|u| u.user_id)),
        tracking_token: Set(user.is_none().then(|| Uuid::new_v4().simple().to_string())),
        customer_name: Set(contact.name),
        customer_email: Set(contact.email),
        customer_phone: Set(contact.phone),
        shipping_address: Set(serde_json::to_value(&payload.shipping_address)
            .map_err(|e| AppError::Internal(e.into()))?),
        payment_method: Set(payload.payment_method),
        status: Set(OrderStatus::Pending),
        items_subtotal: Set(breakdown.items_subtotal),
        discount_total: Set(breakdown.discount_total),
        coupon_code: Set(breakdown.coupon_code.clone()),
        coupon_discount: Set(breakdown.coupon_discount),
        delivery_fee: Set(breakdown.delivery_fee),
        total_price: Set(breakdown.total),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items: Vec<OrderItem> = Vec::with_capacity(breakdown.lines.len());
    for (position, line) in (0..).zip(&breakdown.lines) {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            position: Set(position),
            product_id: Set(Some(line.product_id)),
            title: Set(line.title.clone()),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
            purchase_price: Set(line.purchase_price),
            discount_applied: Set(line.discount_applied),
            final_price: Set(line.final_price),
            line_total: Set(line.line_total),
            offer_id: Set(line.offer_id),
            offer_discount_type: Set(line.offer_terms.map(|t| t.discount_type)),
            offer_discount_value: Set(line.offer_terms.map(|t| t.discount_value)),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        items.push(OrderItem::from(item));

        // reserve stock
        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(line.quantity))
            .filter(ProdCol::Id.eq(line.product_id))
            .exec(&txn)
            .await?;
    }

    if from_cart && let Some(user) = user {
        CartItems::delete_many()
            .filter(CartCol::UserId.eq(user.user_id))
            .exec(&txn)
            .await?;
    }

    notification_service::notify_order(&txn, &order, notification_service::placed_message(&order))
        .await?;

    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        guest = user.is_none(),
        total = order.total_price,
        "order placed"
    );
    audit::record(
        &state.pool,
        user.map(|u| u.user_id),
        "checkout",
        "orders",
        serde_json::json!({ "order_id": order.id, "total": order.total_price }),
    )
    .await;

    Ok(ApiResponse::success(
        "Checkout success",
        OrderWithItems {
            order: order_view(order)?,
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Applies a guarded status change to an order row the caller has locked.
///
/// Restocks on cancel/reject and notifies admin and owner.
pub(crate) async fn apply_transition<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
    to: OrderStatus,
    actor: Actor,
) -> AppResult<OrderModel> {
    let from = order.status;
    let next = from.transition(to, actor)?;

    let mut active: OrderActive = order.into();
    active.status = Set(next);
    active.updated_at = Set(Utc::now().into());
    let order = active.update(conn).await?;

    if next.restocks() {
        let items = OrderItems::find()
            .filter(OrderItemCol::OrderId.eq(order.id))
            .all(conn)
            .await?;
        for item in items {
            let Some(product_id) = item.product_id else {
                continue;
            };
            Products::update_many()
                .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(item.quantity))
                .filter(ProdCol::Id.eq(product_id))
                .exec(conn)
                .await?;
        }
    }

    notification_service::notify_order(conn, &order, notification_service::status_message(&order))
        .await?;

    tracing::info!(order_id = %order.id, from = ?from, to = ?next, actor = ?actor, "order status changed");
    Ok(order)
}

/// Customer cancellation; the status is re-read under a row lock before the guard.
async fn cancel_where(
    state: &AppState,
    condition: Condition,
    actor_id: Option<Uuid>,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(condition)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let order = apply_transition(&txn, order, OrderStatus::Cancelled, Actor::Customer).await?;
    let data = with_items(&txn, order).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        actor_id,
        "order_cancel",
        "orders",
        serde_json::json!({ "order_id": data.order.id }),
    )
    .await;

    Ok(ApiResponse::success("Order cancelled", data, Some(Meta::empty())))
}

pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    cancel_where(
        state,
        Condition::all()
            .add(OrderCol::Id.eq(id))
            .add(OrderCol::UserId.eq(user.user_id)),
        Some(user.user_id),
    )
    .await
}

pub async fn cancel_tracked_order(
    state: &AppState,
    token: &str,
) -> AppResult<ApiResponse<OrderWithItems>> {
    cancel_where(
        state,
        Condition::all().add(OrderCol::TrackingToken.eq(token)),
        None,
    )
    .await
}

pub async fn track_order(state: &AppState, token: &str) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(OrderCol::TrackingToken.eq(token))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let data = with_items(&state.orm, order).await?;
    Ok(ApiResponse::success("OK", data, Some(Meta::empty())))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let mut finder = Orders::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
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
        "Ok",
        OrderList { items: orders },
        Some(Meta::paged(page, limit, total)),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let data = with_items(&state.orm, order).await?;
    Ok(ApiResponse::success("OK", data, Some(Meta::empty())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sums_duplicates_in_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let merged = merge_lines(vec![
            CartLine { product_id: a, quantity: 1 },
            CartLine { product_id: b, quantity: 2 },
            CartLine { product_id: a, quantity: 3 },
        ])
        .unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!((merged[0].product_id, merged[0].quantity), (a, 4));
        assert_eq!((merged[1].product_id, merged[1].quantity), (b, 2));
    }

    #[test]
    fn merge_rejects_non_positive_quantity() {
        let err = merge_lines(vec![CartLine {
            product_id: Uuid::new_v4(),
            quantity: 0,
        }]);
        assert!(matches!(err, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn address_requires_core_fields() {
        let mut address = ShippingAddress {
            line1: "1 Main St".into(),
            line2: None,
            city: "Springfield".into(),
            postal_code: None,
            country: "US".into(),
        };
        assert!(validate_address(&address).is_ok());
        address.city = "  ".into();
        assert!(validate_address(&address).is_err());
    }
}
