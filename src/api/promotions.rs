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
use crate::validation::{Validator, MAX_NAME_LEN, MAX_SHORT_TEXT_LEN};

use super::log_activity;

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/promotion/:id",
            get_with(get_promotion, get_promotion_docs)
                .put_with(update_promotion, update_promotion_docs)
                .delete_with(delete_promotion, delete_promotion_docs),
        )
        .api_route(
            "/promotions",
            get_with(list_promotions, list_promotions_docs)
                .post_with(create_promotion, create_promotion_docs),
        )
        .with_state(app_state)
}

/// `Percent` is a whole percent (1 to 100), `Fixed` an amount in cents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "value")]
pub enum DiscountDto {
    Percent(i64),
    Fixed(i64),
}

impl From<&models::Discount> for DiscountDto {
    fn from(value: &models::Discount) -> Self {
        match value {
            models::Discount::Percent(p) => DiscountDto::Percent(*p),
            models::Discount::Fixed(c) => DiscountDto::Fixed(*c),
        }
    }
}

impl From<DiscountDto> for models::Discount {
    fn from(value: DiscountDto) -> Self {
        match value {
            DiscountDto::Percent(p) => models::Discount::Percent(p),
            DiscountDto::Fixed(c) => models::Discount::Fixed(c),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct PromotionDto {
    pub id: u64,
    pub name: String,
    pub code: Option<String>,
    pub discount: DiscountDto,
    pub starts_at: Option<String>,
    pub ends_at: Option<String>,
    pub active: bool,
}

impl From<&models::Promotion> for PromotionDto {
    fn from(value: &models::Promotion) -> Self {
        Self {
            id: value.id,
            name: value.name.to_owned(),
            code: value.code.to_owned(),
            discount: DiscountDto::from(&value.discount),
            starts_at: value.starts_at.map(|d| d.to_rfc3339()),
            ends_at: value.ends_at.map(|d| d.to_rfc3339()),
            active: value.active,
        }
    }
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct SavePromotionDto {
    pub name: String,
    pub code: Option<String>,
    pub discount: DiscountDto,
    /// RFC 3339 timestamp
    pub starts_at: Option<String>,
    /// RFC 3339 timestamp, exclusive
    pub ends_at: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl SavePromotionDto {
    /// Validates the form and converts it into a promotion with id 0.
    fn into_promotion(self) -> ServiceResult<models::Promotion> {
        let mut validator = Validator::new();
        validator
            .required_text("name", &self.name, MAX_NAME_LEN)
            .optional_text("code", self.code.as_deref(), MAX_SHORT_TEXT_LEN);

        match self.discount {
            DiscountDto::Percent(p) => validator.range("discount", p, 1, 100),
            DiscountDto::Fixed(c) => validator.range("discount", c, 1, i64::MAX),
        };

        let starts_at = validator.optional_date("starts_at", self.starts_at.as_deref());
        let ends_at = validator.optional_date("ends_at", self.ends_at.as_deref());
        if let (Some(start), Some(end)) = (starts_at, ends_at) {
            validator.check("ends_at", start < end, "field_out_of_range");
        }
        validator.finish()?;

        Ok(models::Promotion {
            id: 0,
            name: self.name.trim().to_owned(),
            code: self
                .code
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty()),
            discount: self.discount.into(),
            starts_at,
            ends_at,
            active: self.active,
        })
    }
}

async fn list_promotions(mut state: RequestState) -> ServiceResult<Json<Vec<PromotionDto>>> {
    state.session_require_manager()?;

    let promotions = state.db.get_all_promotions().await?;
    Ok(Json(promotions.iter().map(PromotionDto::from).collect()))
}

fn list_promotions_docs(op: TransformOperation) -> TransformOperation {
    op.description("List all promotions.")
        .tag("promotions")
        .response::<200, Json<Vec<PromotionDto>>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn get_promotion(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<Json<PromotionDto>> {
    state.session_require_manager()?;

    let promotion = state.db.get_promotion_by_id(id).await?;

    if let Some(promotion) = promotion {
        return Ok(Json(PromotionDto::from(&promotion)));
    }

    Err(ServiceError::NotFound)
}

fn get_promotion_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a promotion by id.")
        .tag("promotions")
        .response::<200, Json<PromotionDto>>()
        .response_with::<404, (), _>(|res| res.description("The requested promotion does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn create_promotion(
    mut state: RequestState,
    form: JsonBody<SavePromotionDto>,
) -> ServiceResult<Json<PromotionDto>> {
    let user = state.session_require_manager()?;
    let promotion = form.0.into_promotion()?;

    let promotion = state.db.store_promotion(promotion).await?;

    log_activity(&mut state.db, Some(user.id), "create", "promotion", Some(promotion.id), &promotion.name).await;
    Ok(Json(PromotionDto::from(&promotion)))
}

fn create_promotion_docs(op: TransformOperation) -> TransformOperation {
    op.description("Create a new promotion.")
        .tag("promotions")
        .response::<200, Json<PromotionDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input or code taken!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn update_promotion(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<SavePromotionDto>,
) -> ServiceResult<Json<PromotionDto>> {
    let user = state.session_require_manager()?;
    let mut promotion = form.0.into_promotion()?;

    if state.db.get_promotion_by_id(id).await?.is_none() {
        return Err(ServiceError::NotFound);
    }

    promotion.id = id;
    let promotion = state.db.store_promotion(promotion).await?;

    log_activity(&mut state.db, Some(user.id), "update", "promotion", Some(id), &promotion.name).await;
    Ok(Json(PromotionDto::from(&promotion)))
}

fn update_promotion_docs(op: TransformOperation) -> TransformOperation {
    op.description("Update an existing promotion.")
        .tag("promotions")
        .response::<200, Json<PromotionDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input or code taken!"))
        .response_with::<404, (), _>(|res| res.description("The requested promotion does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn delete_promotion(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<StatusCode> {
    let user = state.session_require_manager()?;

    if state.db.get_promotion_by_id(id).await?.is_none() {
        return Err(ServiceError::NotFound);
    }

    state.db.delete_promotion(id).await?;

    log_activity(&mut state.db, Some(user.id), "delete", "promotion", Some(id), "").await;
    Ok(StatusCode::NO_CONTENT)
}

fn delete_promotion_docs(op: TransformOperation) -> TransformOperation {
    op.description("Delete an existing promotion.")
        .tag("promotions")
        .response_with::<204, (), _>(|res| res.description("The promotion was successfully deleted!"))
        .response_with::<404, (), _>(|res| res.description("The requested promotion does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(discount: DiscountDto) -> SavePromotionDto {
        SavePromotionDto {
            name: "Happy hour".to_owned(),
            code: Some(" happy10 ".to_owned()),
            discount,
            starts_at: Some("2024-01-01T17:00:00Z".to_owned()),
            ends_at: Some("2024-01-01T19:00:00Z".to_owned()),
            active: true,
        }
    }

    #[test]
    fn code_is_normalized() {
        let promotion = form(DiscountDto::Percent(10)).into_promotion().unwrap();
        assert_eq!(promotion.code.as_deref(), Some("HAPPY10"));
        assert_eq!(promotion.discount, models::Discount::Percent(10));
    }

    #[test]
    fn percent_is_limited_to_hundred() {
        assert!(form(DiscountDto::Percent(101)).into_promotion().is_err());
        assert!(form(DiscountDto::Percent(0)).into_promotion().is_err());
        assert!(form(DiscountDto::Percent(100)).into_promotion().is_ok());
    }

    #[test]
    fn end_must_follow_start() {
        let mut form = form(DiscountDto::Fixed(500));
        form.ends_at = Some("2024-01-01T16:00:00Z".to_owned());
        assert!(form.into_promotion().is_err());
    }
}
