use aide::axum::routing::get_with;
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::http::StatusCode;
use axum::Json;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::database::AppState;
use crate::error::{ServiceError, ServiceResult};
use crate::extract::{JsonBody, Path};
use crate::models;
use crate::request_state::RequestState;
use crate::validation::{Validator, MAX_NAME_LEN};

use super::log_activity;

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/extra-charge/:id",
            get_with(get_extra_charge, get_extra_charge_docs)
                .put_with(update_extra_charge, update_extra_charge_docs)
                .delete_with(delete_extra_charge, delete_extra_charge_docs),
        )
        .api_route(
            "/extra-charges",
            get_with(list_extra_charges, list_extra_charges_docs)
                .post_with(create_extra_charge, create_extra_charge_docs),
        )
        .with_state(app_state)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub enum ChargeKindDto {
    /// Whole percent of the discounted subtotal
    Percent,
    /// Cents per bill
    Fixed,
    /// Cents per guest
    PerGuest,
}

impl From<&models::ChargeKind> for ChargeKindDto {
    fn from(value: &models::ChargeKind) -> Self {
        match value {
            models::ChargeKind::Percent => ChargeKindDto::Percent,
            models::ChargeKind::Fixed => ChargeKindDto::Fixed,
            models::ChargeKind::PerGuest => ChargeKindDto::PerGuest,
        }
    }
}

impl From<ChargeKindDto> for models::ChargeKind {
    fn from(value: ChargeKindDto) -> Self {
        match value {
            ChargeKindDto::Percent => models::ChargeKind::Percent,
            ChargeKindDto::Fixed => models::ChargeKind::Fixed,
            ChargeKindDto::PerGuest => models::ChargeKind::PerGuest,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct ExtraChargeDto {
    pub id: u64,
    pub name: String,
    pub kind: ChargeKindDto,
    pub amount: i64,
    pub active: bool,
}

impl From<&models::ExtraCharge> for ExtraChargeDto {
    fn from(value: &models::ExtraCharge) -> Self {
        Self {
            id: value.id,
            name: value.name.to_owned(),
            kind: ChargeKindDto::from(&value.kind),
            amount: value.amount,
            active: value.active,
        }
    }
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct SaveExtraChargeDto {
    pub name: String,
    pub kind: ChargeKindDto,
    pub amount: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl SaveExtraChargeDto {
    fn validate(&self) -> ServiceResult<()> {
        let max = match self.kind {
            ChargeKindDto::Percent => 100,
            ChargeKindDto::Fixed | ChargeKindDto::PerGuest => i64::MAX,
        };

        Validator::new()
            .required_text("name", &self.name, MAX_NAME_LEN)
            .range("amount", self.amount, 0, max)
            .finish()
    }
}

async fn list_extra_charges(mut state: RequestState) -> ServiceResult<Json<Vec<ExtraChargeDto>>> {
    state.session_require_manager()?;

    let charges = state.db.get_all_extra_charges().await?;
    Ok(Json(charges.iter().map(ExtraChargeDto::from).collect()))
}

fn list_extra_charges_docs(op: TransformOperation) -> TransformOperation {
    op.description("List all extra charges (service charge, tax, ...).")
        .tag("extra_charges")
        .response::<200, Json<Vec<ExtraChargeDto>>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn get_extra_charge(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<Json<ExtraChargeDto>> {
    state.session_require_manager()?;

    let charge = state.db.get_extra_charge_by_id(id).await?;

    if let Some(charge) = charge {
        return Ok(Json(ExtraChargeDto::from(&charge)));
    }

    Err(ServiceError::NotFound)
}

fn get_extra_charge_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get an extra charge by id.")
        .tag("extra_charges")
        .response::<200, Json<ExtraChargeDto>>()
        .response_with::<404, (), _>(|res| res.description("The requested charge does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn create_extra_charge(
    mut state: RequestState,
    form: JsonBody<SaveExtraChargeDto>,
) -> ServiceResult<Json<ExtraChargeDto>> {
    let user = state.session_require_manager()?;
    let form = form.0;
    form.validate()?;

    let charge = models::ExtraCharge {
        id: 0,
        name: form.name.trim().to_owned(),
        kind: form.kind.into(),
        amount: form.amount,
        active: form.active,
    };

    let charge = state.db.store_extra_charge(charge).await?;

    log_activity(&mut state.db, Some(user.id), "create", "extra_charge", Some(charge.id), &charge.name).await;
    Ok(Json(ExtraChargeDto::from(&charge)))
}

fn create_extra_charge_docs(op: TransformOperation) -> TransformOperation {
    op.description("Create a new extra charge.")
        .tag("extra_charges")
        .response::<200, Json<ExtraChargeDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn update_extra_charge(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<SaveExtraChargeDto>,
) -> ServiceResult<Json<ExtraChargeDto>> {
    let user = state.session_require_manager()?;
    let form = form.0;
    form.validate()?;

    let charge = state.db.get_extra_charge_by_id(id).await?;

    if let Some(mut charge) = charge {
        charge.name = form.name.trim().to_owned();
        charge.kind = form.kind.into();
        charge.amount = form.amount;
        charge.active = form.active;

        let charge = state.db.store_extra_charge(charge).await?;

        log_activity(&mut state.db, Some(user.id), "update", "extra_charge", Some(id), &charge.name).await;
        return Ok(Json(ExtraChargeDto::from(&charge)));
    }

    Err(ServiceError::NotFound)
}

fn update_extra_charge_docs(op: TransformOperation) -> TransformOperation {
    op.description("Update an existing extra charge.")
        .tag("extra_charges")
        .response::<200, Json<ExtraChargeDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input!"))
        .response_with::<404, (), _>(|res| res.description("The requested charge does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn delete_extra_charge(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<StatusCode> {
    let user = state.session_require_manager()?;

    if state.db.get_extra_charge_by_id(id).await?.is_none() {
        return Err(ServiceError::NotFound);
    }

    state.db.delete_extra_charge(id).await?;

    log_activity(&mut state.db, Some(user.id), "delete", "extra_charge", Some(id), "").await;
    Ok(StatusCode::NO_CONTENT)
}

fn delete_extra_charge_docs(op: TransformOperation) -> TransformOperation {
    op.description("Delete an existing extra charge.")
        .tag("extra_charges")
        .response_with::<204, (), _>(|res| res.description("The charge was successfully deleted!"))
        .response_with::<404, (), _>(|res| res.description("The requested charge does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}
