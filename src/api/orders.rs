use aide::axum::routing::{get_with, post_with, put_with};
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::Json;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::broadcast::{EventBroadcaster, Topic};
use crate::cart::{Cart, CartLine, MAX_LINE_QUANTITY};
use crate::database::{AppState, DatabaseConnection};
use crate::error::{ServiceError, ServiceResult};
use crate::extract::{JsonBody, Path};
use crate::models;
use crate::request_state::RequestState;
use crate::validation::{Validator, MAX_NOTE_LEN};

use super::log_activity;

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/session/:id/orders",
            get_with(list_session_orders, list_session_orders_docs)
                .post_with(create_session_order, create_session_order_docs),
        )
        .api_route(
            "/order-item/:id/status",
            put_with(update_item_status, update_item_status_docs),
        )
        .api_route("/order/:id/cancel", post_with(cancel_order, cancel_order_docs))
        .with_state(app_state)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KitchenStatusDto {
    Waiting,
    Cooking,
    Done,
    Served,
}

impl From<models::KitchenStatus> for KitchenStatusDto {
    fn from(value: models::KitchenStatus) -> Self {
        match value {
            models::KitchenStatus::Waiting => KitchenStatusDto::Waiting,
            models::KitchenStatus::Cooking => KitchenStatusDto::Cooking,
            models::KitchenStatus::Done => KitchenStatusDto::Done,
            models::KitchenStatus::Served => KitchenStatusDto::Served,
        }
    }
}

impl From<KitchenStatusDto> for models::KitchenStatus {
    fn from(value: KitchenStatusDto) -> Self {
        match value {
            KitchenStatusDto::Waiting => models::KitchenStatus::Waiting,
            KitchenStatusDto::Cooking => models::KitchenStatus::Cooking,
            KitchenStatusDto::Done => models::KitchenStatus::Done,
            KitchenStatusDto::Served => models::KitchenStatus::Served,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, JsonSchema)]
pub enum OrderStatusDto {
    Pending,
    Preparing,
    Served,
    Cancelled,
}

impl From<models::OrderStatus> for OrderStatusDto {
    fn from(value: models::OrderStatus) -> Self {
        match value {
            models::OrderStatus::Pending => OrderStatusDto::Pending,
            models::OrderStatus::Preparing => OrderStatusDto::Preparing,
            models::OrderStatus::Served => OrderStatusDto::Served,
            models::OrderStatus::Cancelled => OrderStatusDto::Cancelled,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct OrderItemDto {
    pub id: u64,
    pub order_id: u64,
    pub menu_item_id: Option<u64>,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i32,
    pub note: Option<String>,
    pub included_in_package: bool,
    pub kitchen_status: KitchenStatusDto,
}

impl From<&models::OrderItem> for OrderItemDto {
    fn from(value: &models::OrderItem) -> Self {
        Self {
            id: value.id,
            order_id: value.order_id,
            menu_item_id: value.menu_item_id,
            name: value.name.to_owned(),
            unit_price_cents: value.unit_price_cents,
            quantity: value.quantity,
            note: value.note.to_owned(),
            included_in_package: value.included_in_package,
            kitchen_status: value.kitchen_status.into(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct OrderDto {
    pub id: u64,
    pub session_id: u64,
    pub status: OrderStatusDto,
    pub note: Option<String>,
    pub created_at: String,
    pub items: Vec<OrderItemDto>,
}

impl From<&models::Order> for OrderDto {
    fn from(value: &models::Order) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            status: value.status.into(),
            note: value.note.to_owned(),
            created_at: value.created_at.to_rfc3339(),
            items: value.items.iter().map(OrderItemDto::from).collect(),
        }
    }
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct CreateOrderItemDto {
    pub menu_item_id: u64,
    pub quantity: i32,
    pub note: Option<String>,
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct CreateOrderDto {
    pub items: Vec<CreateOrderItemDto>,
    pub note: Option<String>,
}

impl CreateOrderDto {
    fn validate(&self) -> ServiceResult<()> {
        let mut validator = Validator::new();
        validator
            .non_empty("items", &self.items)
            .optional_text("note", self.note.as_deref(), MAX_NOTE_LEN);

        for (i, item) in self.items.iter().enumerate() {
            validator
                .range(
                    &format!("items[{}].quantity", i),
                    i64::from(item.quantity),
                    1,
                    i64::from(MAX_LINE_QUANTITY),
                )
                .optional_text(&format!("items[{}].note", i), item.note.as_deref(), MAX_NOTE_LEN);
        }

        validator.finish()
    }
}

/// Builds the cart of an order submission.
///
/// Every referenced menu item must exist and be available.
fn build_cart(
    form: CreateOrderDto,
    menu_items: &[models::MenuItem],
    package: Option<&models::Package>,
) -> ServiceResult<Cart> {
    let mut cart = Cart::new();

    for line in form.items {
        let item = menu_items
            .iter()
            .find(|m| m.id == line.menu_item_id && m.available)
            .ok_or(ServiceError::BadRequest("menu_item_unavailable"))?;

        cart.add(CartLine::for_menu_item(item, line.quantity, line.note, package));
    }

    Validator::new()
        .check("items", !cart.exceeds_line_quantity(), "field_out_of_range")
        .finish()?;

    Ok(cart)
}

/// Places an order for an open session, used by staff and guest devices.
pub(super) async fn place_order(
    db: &mut DatabaseConnection,
    events: &EventBroadcaster,
    session: &models::DiningSession,
    form: CreateOrderDto,
) -> ServiceResult<models::Order> {
    form.validate()?;

    if !session.is_open() {
        return Err(ServiceError::BadRequest("session_closed"));
    }

    let package = match session.package_id {
        Some(id) => db.get_package_by_id(id).await?,
        None => None,
    };

    let ids: Vec<u64> = form.items.iter().map(|i| i.menu_item_id).collect();
    let menu_items = db.get_menu_items_by_ids(&ids).await?;

    let note = form
        .note
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_owned);
    let cart = build_cart(form, &menu_items, package.as_ref())?;

    let order = db
        .create_order(models::NewOrder {
            session_id: session.id,
            note,
            items: cart.into_order_items(),
        })
        .await?;

    let dto = OrderDto::from(&order);
    events.emit(Topic::Orders, "order.created", Some(session.id), &dto);
    events.emit(Topic::Kitchen, "order.created", Some(session.id), &dto);
    Ok(order)
}

async fn list_session_orders(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<Json<Vec<OrderDto>>> {
    state.session_require_staff()?;

    if state.db.get_session_by_id(id).await?.is_none() {
        return Err(ServiceError::NotFound);
    }

    let orders = state.db.get_orders_by_session(id).await?;
    Ok(Json(orders.iter().map(OrderDto::from).collect()))
}

fn list_session_orders_docs(op: TransformOperation) -> TransformOperation {
    op.description("List all orders of a session, oldest first.")
        .tag("orders")
        .response::<200, Json<Vec<OrderDto>>>()
        .response_with::<404, (), _>(|res| res.description("The requested session does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["staff"])
}

async fn create_session_order(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<CreateOrderDto>,
) -> ServiceResult<Json<OrderDto>> {
    let user = state.session_require_staff()?;

    let session = state
        .db
        .get_session_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;

    let order = place_order(&mut state.db, &state.events, &session, form.0).await?;

    log_activity(&mut state.db, Some(user.id), "create", "order", Some(order.id), &session.table_name).await;
    Ok(Json(OrderDto::from(&order)))
}

fn create_session_order_docs(op: TransformOperation) -> TransformOperation {
    op.description("Place an order for a session. Equal lines are merged.")
        .tag("orders")
        .response::<200, Json<OrderDto>>()
        .response_with::<400, (), _>(|res| {
            res.description("Invalid input, session closed or menu item unavailable!")
        })
        .response_with::<404, (), _>(|res| res.description("The requested session does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["staff"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct ItemStatusDto {
    pub status: KitchenStatusDto,
}

async fn update_item_status(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<ItemStatusDto>,
) -> ServiceResult<Json<OrderDto>> {
    let user = state.session_require_role(&[models::Role::Kitchen, models::Role::Staff])?;
    let target: models::KitchenStatus = form.0.status.into();

    let item = state
        .db
        .get_order_item_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;

    if !item.kitchen_status.can_transition_to(target) {
        return Err(ServiceError::BadRequest("invalid_status_transition"));
    }

    let order = state
        .db
        .update_order_item_status(id, item.kitchen_status, target)
        .await?;
    let dto = OrderDto::from(&order);

    log_activity(&mut state.db, Some(user.id), "status", "order_item", Some(id), target.as_str()).await;
    state.events.emit(
        Topic::Kitchen,
        "item.status",
        Some(order.session_id),
        &serde_json::json!({ "item_id": id, "order_id": order.id, "status": target.as_str() }),
    );
    state
        .events
        .emit(Topic::Orders, "order.updated", Some(order.session_id), &dto);
    Ok(Json(dto))
}

fn update_item_status_docs(op: TransformOperation) -> TransformOperation {
    op.description("Move an order item one kitchen step forward (WAITING, COOKING, DONE, SERVED).")
        .tag("orders")
        .response::<200, Json<OrderDto>>()
        .response_with::<400, (), _>(|res| {
            res.description("Invalid status transition, the order is cancelled or the session is closed!")
        })
        .response_with::<404, (), _>(|res| res.description("The requested order item does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["kitchen", "staff"])
}

async fn cancel_order(mut state: RequestState, Path(id): Path<u64>) -> ServiceResult<Json<OrderDto>> {
    let user = state.session_require_staff()?;

    let order = state
        .db
        .get_order_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;

    if !order.is_cancellable() || !state.db.cancel_order(id).await? {
        return Err(ServiceError::BadRequest("order_not_cancellable"));
    }

    let order = state
        .db
        .get_order_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;
    let dto = OrderDto::from(&order);

    log_activity(&mut state.db, Some(user.id), "cancel", "order", Some(id), "").await;
    state
        .events
        .emit(Topic::Orders, "order.cancelled", Some(order.session_id), &dto);
    state
        .events
        .emit(Topic::Kitchen, "order.cancelled", Some(order.session_id), &dto);
    Ok(Json(dto))
}

fn cancel_order_docs(op: TransformOperation) -> TransformOperation {
    op.description("Cancel an order while the kitchen has not started on it.")
        .tag("orders")
        .response::<200, Json<OrderDto>>()
        .response_with::<400, (), _>(|res| res.description("The order is not cancellable anymore!"))
        .response_with::<404, (), _>(|res| res.description("The requested order does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["staff"])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu_item(id: u64, available: bool) -> models::MenuItem {
        models::MenuItem {
            id,
            category_id: None,
            name: format!("Dish {}", id),
            description: String::new(),
            price_cents: 1000,
            image_url: None,
            available,
        }
    }

    fn line(menu_item_id: u64, quantity: i32, note: Option<&str>) -> CreateOrderItemDto {
        CreateOrderItemDto {
            menu_item_id,
            quantity,
            note: note.map(str::to_owned),
        }
    }

    #[test]
    fn submitted_lines_are_merged() {
        let form = CreateOrderDto {
            items: vec![line(1, 1, None), line(2, 1, None), line(1, 2, Some(""))],
            note: None,
        };
        let cart = build_cart(form, &[menu_item(1, true), menu_item(2, true)], None).unwrap();

        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.lines()[0].quantity, 3);
    }

    #[test]
    fn merged_quantity_is_limited() {
        let form = CreateOrderDto {
            items: vec![line(1, 99, None), line(1, 99, None)],
            note: None,
        };
        assert!(form.validate().is_ok());

        let Err(ServiceError::ValidationFailed(errors)) = build_cart(form, &[menu_item(1, true)], None)
        else {
            panic!("expected validation failure");
        };
        assert_eq!(errors[0].field, "items");
        assert_eq!(errors[0].error, "field_out_of_range");
    }

    #[test]
    fn unavailable_items_are_rejected() {
        let form = CreateOrderDto {
            items: vec![line(1, 1, None), line(2, 1, None)],
            note: None,
        };
        let result = build_cart(form, &[menu_item(1, true), menu_item(2, false)], None);
        assert_eq!(result, Err(ServiceError::BadRequest("menu_item_unavailable")));

        let form = CreateOrderDto {
            items: vec![line(3, 1, None)],
            note: None,
        };
        let result = build_cart(form, &[menu_item(1, true)], None);
        assert_eq!(result, Err(ServiceError::BadRequest("menu_item_unavailable")));
    }

    #[test]
    fn quantities_are_limited() {
        let form = CreateOrderDto {
            items: vec![line(1, 0, None), line(1, 100, None)],
            note: None,
        };
        let Err(ServiceError::ValidationFailed(errors)) = form.validate() else {
            panic!("expected validation failure");
        };
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "items[0].quantity");

        let empty = CreateOrderDto {
            items: vec![],
            note: None,
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn kitchen_status_uses_upper_case_names() {
        let form: ItemStatusDto = serde_json::from_str(r#"{"status":"COOKING"}"#).unwrap();
        assert_eq!(form.status, KitchenStatusDto::Cooking);
        assert_eq!(
            serde_json::to_string(&KitchenStatusDto::Served).unwrap(),
            r#""SERVED""#
        );
    }
}
