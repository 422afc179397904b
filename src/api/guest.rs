//! Endpoints for guest devices, authenticated by the ordering token of the
//! dining session that is encoded in the table's qr code.
use aide::axum::routing::{get_with, post_with};
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::Json;
use schemars::JsonSchema;
use serde::Serialize;

use crate::database::{AppState, DatabaseConnection};
use crate::error::{ServiceError, ServiceResult};
use crate::extract::{JsonBody, Path};
use crate::models;
use crate::request_state::RequestState;

use super::log_activity;
use super::menu::{build_menu, MenuSectionDto};
use super::orders::{place_order, CreateOrderDto, OrderDto};
use super::packages::PackageDto;
use super::sessions::{session_bill, BillDto, SessionStatusDto};

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route("/guest/:token", get_with(get_guest_view, get_guest_view_docs))
        .api_route("/guest/:token/menu", get_with(get_guest_menu, get_guest_menu_docs))
        .api_route(
            "/guest/:token/orders",
            post_with(create_guest_order, create_guest_order_docs),
        )
        .with_state(app_state)
}

pub(super) async fn session_by_token(
    db: &mut DatabaseConnection,
    token: &str,
) -> ServiceResult<models::DiningSession> {
    db.get_open_session_by_token(token)
        .await?
        .ok_or(ServiceError::Unauthorized("invalid_guest_token"))
}

/// What a guest sees of their session, the ordering token is left out.
#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct GuestViewDto {
    pub session_id: u64,
    pub table_name: String,
    pub guest_count: i32,
    pub status: SessionStatusDto,
    pub package: Option<PackageDto>,
    pub orders: Vec<OrderDto>,
    pub bill: BillDto,
}

async fn get_guest_view(
    mut state: RequestState,
    Path(token): Path<String>,
) -> ServiceResult<Json<GuestViewDto>> {
    let session = session_by_token(&mut state.db, &token).await?;

    let package = match session.package_id {
        Some(id) => state.db.get_package_by_id(id).await?,
        None => None,
    };
    let orders = state.db.get_orders_by_session(session.id).await?;
    let bill = session_bill(&mut state.db, &session).await?;

    Ok(Json(GuestViewDto {
        session_id: session.id,
        table_name: session.table_name.to_owned(),
        guest_count: session.guest_count,
        status: session.status.into(),
        package: package.as_ref().map(PackageDto::from),
        orders: orders.iter().map(OrderDto::from).collect(),
        bill: BillDto::from(&bill),
    }))
}

fn get_guest_view_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get the session of an ordering token with its orders and current bill.")
        .tag("guest")
        .response::<200, Json<GuestViewDto>>()
        .response_with::<401, (), _>(|res| res.description("Unknown token or session closed!"))
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct GuestMenuDto {
    /// Only available items are listed
    pub sections: Vec<MenuSectionDto>,
    pub package: Option<PackageDto>,
}

async fn get_guest_menu(
    mut state: RequestState,
    Path(token): Path<String>,
) -> ServiceResult<Json<GuestMenuDto>> {
    let session = session_by_token(&mut state.db, &token).await?;

    let package = match session.package_id {
        Some(id) => state.db.get_package_by_id(id).await?,
        None => None,
    };
    let categories = state.db.get_all_categories().await?;
    let items: Vec<models::MenuItem> = state
        .db
        .get_all_menu_items()
        .await?
        .into_iter()
        .filter(|i| i.available)
        .collect();

    Ok(Json(GuestMenuDto {
        sections: build_menu(&categories, &items),
        package: package.as_ref().map(PackageDto::from),
    }))
}

fn get_guest_menu_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get the orderable menu and the package of the guest's session.")
        .tag("guest")
        .response::<200, Json<GuestMenuDto>>()
        .response_with::<401, (), _>(|res| res.description("Unknown token or session closed!"))
}

async fn create_guest_order(
    mut state: RequestState,
    Path(token): Path<String>,
    form: JsonBody<CreateOrderDto>,
) -> ServiceResult<Json<OrderDto>> {
    let session = session_by_token(&mut state.db, &token).await?;

    let order = place_order(&mut state.db, &state.events, &session, form.0).await?;

    log_activity(&mut state.db, None, "create", "order", Some(order.id), "guest").await;
    Ok(Json(OrderDto::from(&order)))
}

fn create_guest_order_docs(op: TransformOperation) -> TransformOperation {
    op.description("Place an order from a guest device.")
        .tag("guest")
        .response::<200, Json<OrderDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input or menu item unavailable!"))
        .response_with::<401, (), _>(|res| res.description("Unknown token or session closed!"))
}
