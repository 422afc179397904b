use aide::axum::routing::{get_with, post_with, put_with};
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use log::info;
use qrcode::render::svg;
use qrcode::QrCode;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::billing::{compute_bill, Bill};
use crate::broadcast::Topic;
use crate::database::{AppState, DatabaseConnection};
use crate::env;
use crate::error::{ServiceError, ServiceResult};
use crate::extract::{JsonBody, Path, Query};
use crate::models;
use crate::request_state::RequestState;
use crate::validation::{Validator, MAX_SHORT_TEXT_LEN};

use super::log_activity;

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/sessions",
            get_with(list_sessions, list_sessions_docs).post_with(open_session, open_session_docs),
        )
        .api_route("/session/:id", get_with(get_session, get_session_docs))
        .api_route(
            "/session/:id/guests",
            put_with(update_guest_count, update_guest_count_docs),
        )
        .api_route(
            "/session/:id/promotion",
            put_with(apply_promotion, apply_promotion_docs)
                .delete_with(remove_promotion, remove_promotion_docs),
        )
        .api_route("/session/:id/bill", get_with(get_bill, get_bill_docs))
        .api_route("/session/:id/close", post_with(close_session, close_session_docs))
        .api_route("/session/:id/qr", get_with(get_qr_code, get_qr_code_docs))
        .with_state(app_state)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub enum SessionStatusDto {
    #[serde(alias = "open")]
    Open,
    #[serde(alias = "closed")]
    Closed,
}

impl From<models::SessionStatus> for SessionStatusDto {
    fn from(value: models::SessionStatus) -> Self {
        match value {
            models::SessionStatus::Open => SessionStatusDto::Open,
            models::SessionStatus::Closed => SessionStatusDto::Closed,
        }
    }
}

impl From<SessionStatusDto> for models::SessionStatus {
    fn from(value: SessionStatusDto) -> Self {
        match value {
            SessionStatusDto::Open => models::SessionStatus::Open,
            SessionStatusDto::Closed => models::SessionStatus::Closed,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct SessionDto {
    pub id: u64,
    pub table_id: u64,
    pub table_name: String,
    pub package_id: Option<u64>,
    pub guest_count: i32,
    /// Guest ordering token, part of the qr code url
    pub token: String,
    pub status: SessionStatusDto,
    pub promotion_id: Option<u64>,
    pub opened_at: String,
    pub closed_at: Option<String>,
    /// Stored when the session is closed
    pub total_cents: Option<i64>,
}

impl From<&models::DiningSession> for SessionDto {
    fn from(value: &models::DiningSession) -> Self {
        Self {
            id: value.id,
            table_id: value.table_id,
            table_name: value.table_name.to_owned(),
            package_id: value.package_id,
            guest_count: value.guest_count,
            token: value.token.to_owned(),
            status: value.status.into(),
            promotion_id: value.promotion_id,
            opened_at: value.opened_at.to_rfc3339(),
            closed_at: value.closed_at.map(|d| d.to_rfc3339()),
            total_cents: value.total_cents,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct BillChargeDto {
    pub name: String,
    pub amount_cents: i64,
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct BillDto {
    /// Order lines not included in the package
    pub items_cents: i64,
    pub package_cents: i64,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub charges: Vec<BillChargeDto>,
    pub total_cents: i64,
}

impl From<&Bill> for BillDto {
    fn from(value: &Bill) -> Self {
        Self {
            items_cents: value.items_cents,
            package_cents: value.package_cents,
            subtotal_cents: value.subtotal_cents,
            discount_cents: value.discount_cents,
            charges: value
                .charges
                .iter()
                .map(|c| BillChargeDto {
                    name: c.name.to_owned(),
                    amount_cents: c.amount_cents,
                })
                .collect(),
            total_cents: value.total_cents,
        }
    }
}

/// Computes the current bill of `session` from the stored orders.
///
/// A promotion stays on the bill once applied, even if its window ends.
pub(super) async fn session_bill(
    db: &mut DatabaseConnection,
    session: &models::DiningSession,
) -> ServiceResult<Bill> {
    let package = match session.package_id {
        Some(id) => db.get_package_by_id(id).await?,
        None => None,
    };
    let promotion = match session.promotion_id {
        Some(id) => db.get_promotion_by_id(id).await?,
        None => None,
    };
    let orders = db.get_orders_by_session(session.id).await?;
    let charges = db.get_active_extra_charges().await?;

    Ok(compute_bill(
        session,
        package.as_ref(),
        &orders,
        promotion.as_ref(),
        &charges,
    ))
}

async fn load_session(state: &mut RequestState, id: u64) -> ServiceResult<models::DiningSession> {
    state
        .db
        .get_session_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)
}

fn require_open(session: &models::DiningSession) -> ServiceResult<()> {
    if session.is_open() {
        Ok(())
    } else {
        Err(ServiceError::BadRequest("session_closed"))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SessionQuery {
    pub status: Option<SessionStatusDto>,
}

async fn list_sessions(
    mut state: RequestState,
    Query(query): Query<SessionQuery>,
) -> ServiceResult<Json<Vec<SessionDto>>> {
    state.session_require_staff()?;

    let sessions = state.db.get_sessions(query.status.map(Into::into)).await?;
    Ok(Json(sessions.iter().map(SessionDto::from).collect()))
}

fn list_sessions_docs(op: TransformOperation) -> TransformOperation {
    op.description("List dining sessions, newest first.")
        .tag("sessions")
        .response::<200, Json<Vec<SessionDto>>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["staff"])
}

async fn get_session(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<Json<SessionDto>> {
    state.session_require_staff()?;

    let session = load_session(&mut state, id).await?;
    Ok(Json(SessionDto::from(&session)))
}

fn get_session_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a dining session by id.")
        .tag("sessions")
        .response::<200, Json<SessionDto>>()
        .response_with::<404, (), _>(|res| res.description("The requested session does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["staff"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct OpenSessionDto {
    pub table_id: u64,
    pub guest_count: i32,
    pub package_id: Option<u64>,
}

async fn open_session(
    mut state: RequestState,
    form: JsonBody<OpenSessionDto>,
) -> ServiceResult<Json<SessionDto>> {
    let user = state.session_require_staff()?;
    let form = form.0;

    Validator::new()
        .range("guest_count", i64::from(form.guest_count), 1, 100)
        .finish()?;

    let table = state.db.get_table_by_id(form.table_id).await?;
    if !table.map_or(false, |t| t.active) {
        return Err(ServiceError::BadRequest("table_inactive"));
    }

    if let Some(package_id) = form.package_id {
        let package = state.db.get_package_by_id(package_id).await?;
        if !package.map_or(false, |p| p.active) {
            return Err(ServiceError::BadRequest("package_inactive"));
        }
    }

    let session = state
        .db
        .open_session(form.table_id, form.guest_count, form.package_id)
        .await?;
    let dto = SessionDto::from(&session);

    info!("Opened session {} at table {}", session.id, session.table_name);
    log_activity(&mut state.db, Some(user.id), "open", "session", Some(session.id), &session.table_name).await;
    state.events.emit(Topic::Sessions, "session.opened", Some(session.id), &dto);
    Ok(Json(dto))
}

fn open_session_docs(op: TransformOperation) -> TransformOperation {
    op.description("Seat guests at a table and open a dining session.")
        .tag("sessions")
        .response::<200, Json<SessionDto>>()
        .response_with::<400, (), _>(|res| {
            res.description("Invalid input, table inactive or occupied, package inactive!")
        })
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["staff"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct GuestCountDto {
    pub guest_count: i32,
}

async fn update_guest_count(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<GuestCountDto>,
) -> ServiceResult<Json<SessionDto>> {
    let user = state.session_require_staff()?;
    let form = form.0;

    Validator::new()
        .range("guest_count", i64::from(form.guest_count), 1, 100)
        .finish()?;

    let session = load_session(&mut state, id).await?;
    require_open(&session)?;

    state.db.set_session_guest_count(id, form.guest_count).await?;
    let session = load_session(&mut state, id).await?;
    let dto = SessionDto::from(&session);

    log_activity(&mut state.db, Some(user.id), "update", "session", Some(id), "guest_count").await;
    state.events.emit(Topic::Sessions, "session.updated", Some(id), &dto);
    Ok(Json(dto))
}

fn update_guest_count_docs(op: TransformOperation) -> TransformOperation {
    op.description("Change the number of guests of an open session.")
        .tag("sessions")
        .response::<200, Json<SessionDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input or session closed!"))
        .response_with::<404, (), _>(|res| res.description("The requested session does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["staff"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct PromotionCodeDto {
    pub code: String,
}

async fn apply_promotion(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<PromotionCodeDto>,
) -> ServiceResult<Json<SessionDto>> {
    let user = state.session_require_staff()?;
    let form = form.0;

    Validator::new()
        .required_text("code", &form.code, MAX_SHORT_TEXT_LEN)
        .finish()?;

    let session = load_session(&mut state, id).await?;
    require_open(&session)?;

    let promotion = state.db.get_promotion_by_code(form.code.trim()).await?;
    let promotion = match promotion {
        Some(promotion) if promotion.is_applicable_at(Utc::now()) => promotion,
        _ => return Err(ServiceError::BadRequest("promotion_not_applicable")),
    };

    state.db.set_session_promotion(id, Some(promotion.id)).await?;
    let session = load_session(&mut state, id).await?;
    let dto = SessionDto::from(&session);

    log_activity(&mut state.db, Some(user.id), "apply_promotion", "session", Some(id), &promotion.name).await;
    state.events.emit(Topic::Sessions, "session.updated", Some(id), &dto);
    Ok(Json(dto))
}

fn apply_promotion_docs(op: TransformOperation) -> TransformOperation {
    op.description("Apply a promotion code to an open session, replacing any previous one.")
        .tag("sessions")
        .response::<200, Json<SessionDto>>()
        .response_with::<400, (), _>(|res| {
            res.description("Session closed or promotion unknown or not applicable now!")
        })
        .response_with::<404, (), _>(|res| res.description("The requested session does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["staff"])
}

async fn remove_promotion(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<Json<SessionDto>> {
    let user = state.session_require_staff()?;

    let session = load_session(&mut state, id).await?;
    require_open(&session)?;

    state.db.set_session_promotion(id, None).await?;
    let session = load_session(&mut state, id).await?;
    let dto = SessionDto::from(&session);

    log_activity(&mut state.db, Some(user.id), "remove_promotion", "session", Some(id), "").await;
    state.events.emit(Topic::Sessions, "session.updated", Some(id), &dto);
    Ok(Json(dto))
}

fn remove_promotion_docs(op: TransformOperation) -> TransformOperation {
    op.description("Remove the promotion of an open session.")
        .tag("sessions")
        .response::<200, Json<SessionDto>>()
        .response_with::<400, (), _>(|res| res.description("The session is closed!"))
        .response_with::<404, (), _>(|res| res.description("The requested session does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["staff"])
}

async fn get_bill(mut state: RequestState, Path(id): Path<u64>) -> ServiceResult<Json<BillDto>> {
    state.session_require_staff()?;

    let session = load_session(&mut state, id).await?;
    let bill = session_bill(&mut state.db, &session).await?;
    Ok(Json(BillDto::from(&bill)))
}

fn get_bill_docs(op: TransformOperation) -> TransformOperation {
    op.description("Compute the current bill of a session.")
        .tag("sessions")
        .response::<200, Json<BillDto>>()
        .response_with::<404, (), _>(|res| res.description("The requested session does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["staff"])
}

async fn close_session(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<Json<SessionDto>> {
    let user = state.session_require_staff()?;

    let session = load_session(&mut state, id).await?;
    require_open(&session)?;

    let bill = session_bill(&mut state.db, &session).await?;
    if !state.db.close_session(id, bill.total_cents).await? {
        return Err(ServiceError::BadRequest("session_has_open_orders"));
    }

    let session = load_session(&mut state, id).await?;
    let dto = SessionDto::from(&session);

    info!("Closed session {} with total {}", id, bill.total_cents);
    log_activity(&mut state.db, Some(user.id), "close", "session", Some(id), &bill.total_cents.to_string()).await;
    state.events.emit(Topic::Sessions, "session.closed", Some(id), &dto);
    state.events.emit(
        Topic::Tables,
        "table.released",
        None,
        &serde_json::json!({ "id": session.table_id }),
    );
    Ok(Json(dto))
}

fn close_session_docs(op: TransformOperation) -> TransformOperation {
    op.description("Close a session and store its bill total. Fails while orders are still open.")
        .tag("sessions")
        .response::<200, Json<SessionDto>>()
        .response_with::<400, (), _>(|res| {
            res.description("The session is already closed or has open orders!")
        })
        .response_with::<404, (), _>(|res| res.description("The requested session does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["staff"])
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct QrCodeDto {
    /// Guest ordering page of the session
    pub url: String,
    /// `data:image/svg+xml;base64,...`
    pub svg: String,
}

pub fn guest_order_url(base: &str, token: &str) -> String {
    format!("{}/order/{}", base.trim_end_matches('/'), token)
}

fn qr_code_data_url(content: &str) -> ServiceResult<String> {
    let code = QrCode::new(content.as_bytes())
        .map_err(|e| ServiceError::InternalServerError(format!("Could not encode qr code: {}", e)))?;
    let image = code
        .render::<svg::Color>()
        .min_dimensions(256, 256)
        .quiet_zone(true)
        .build();

    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image)))
}

async fn get_qr_code(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<Json<QrCodeDto>> {
    state.session_require_staff()?;

    let session = load_session(&mut state, id).await?;
    require_open(&session)?;

    let url = guest_order_url(env::PUBLIC_URL.as_str(), &session.token);
    let svg = qr_code_data_url(&url)?;
    Ok(Json(QrCodeDto { url, svg }))
}

fn get_qr_code_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get the guest ordering url of an open session and its qr code.")
        .tag("sessions")
        .response::<200, Json<QrCodeDto>>()
        .response_with::<400, (), _>(|res| res.description("The session is closed!"))
        .response_with::<404, (), _>(|res| res.description("The requested session does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["staff"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_url_joins_base_and_token() {
        assert_eq!(
            guest_order_url("https://tablemate.example/", "abc123"),
            "https://tablemate.example/order/abc123"
        );
        assert_eq!(
            guest_order_url("http://localhost:3000", "abc123"),
            "http://localhost:3000/order/abc123"
        );
    }

    #[test]
    fn qr_code_is_svg_data_url() {
        let data_url = qr_code_data_url("http://localhost:3000/order/abc123").unwrap();
        let encoded = data_url
            .strip_prefix("data:image/svg+xml;base64,")
            .unwrap();
        let svg = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(svg.contains("<svg"));
    }

    #[test]
    fn status_query_accepts_lowercase() {
        let query: SessionQuery = serde_json::from_str(r#"{"status":"open"}"#).unwrap();
        assert_eq!(query.status, Some(SessionStatusDto::Open));
        let query: SessionQuery = serde_json::from_str(r#"{"status":"Closed"}"#).unwrap();
        assert_eq!(query.status, Some(SessionStatusDto::Closed));
    }
}
