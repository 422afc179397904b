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
use crate::validation::{Validator, MAX_NAME_LEN, MAX_NOTE_LEN};

use super::log_activity;

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/flowtrak/template/:id",
            get_with(get_template, get_template_docs)
                .put_with(update_template, update_template_docs)
                .delete_with(delete_template, delete_template_docs),
        )
        .api_route(
            "/flowtrak/templates",
            get_with(list_templates, list_templates_docs)
                .post_with(create_template, create_template_docs),
        )
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TemplateStepDto {
    pub name: String,
    pub department_id: Option<u64>,
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct TemplateDto {
    pub id: u64,
    pub name: String,
    pub description: String,
    /// Become the checkpoints of work orders created from this template
    pub steps: Vec<TemplateStepDto>,
}

impl From<&models::WorkOrderTemplate> for TemplateDto {
    fn from(value: &models::WorkOrderTemplate) -> Self {
        Self {
            id: value.id,
            name: value.name.to_owned(),
            description: value.description.to_owned(),
            steps: value
                .steps
                .iter()
                .map(|s| TemplateStepDto {
                    name: s.name.to_owned(),
                    department_id: s.department_id,
                })
                .collect(),
        }
    }
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct SaveTemplateDto {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<TemplateStepDto>,
}

impl SaveTemplateDto {
    fn into_template(self, id: u64) -> ServiceResult<models::WorkOrderTemplate> {
        let mut validator = Validator::new();
        validator
            .required_text("name", &self.name, MAX_NAME_LEN)
            .optional_text("description", Some(&self.description), MAX_NOTE_LEN)
            .non_empty("steps", &self.steps);
        for (i, step) in self.steps.iter().enumerate() {
            validator.required_text(&format!("steps[{}].name", i), &step.name, MAX_NAME_LEN);
        }
        validator.finish()?;

        Ok(models::WorkOrderTemplate {
            id,
            name: self.name.trim().to_owned(),
            description: self.description.trim().to_owned(),
            steps: self
                .steps
                .into_iter()
                .map(|s| models::TemplateStep {
                    name: s.name.trim().to_owned(),
                    department_id: s.department_id,
                })
                .collect(),
        })
    }
}

async fn list_templates(mut state: RequestState) -> ServiceResult<Json<Vec<TemplateDto>>> {
    state.session_require_manager()?;

    let templates = state.db.get_all_templates().await?;
    Ok(Json(templates.iter().map(TemplateDto::from).collect()))
}

fn list_templates_docs(op: TransformOperation) -> TransformOperation {
    op.description("List all work order templates.")
        .tag("flowtrak")
        .response::<200, Json<Vec<TemplateDto>>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn get_template(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<Json<TemplateDto>> {
    state.session_require_manager()?;

    let template = state.db.get_template_by_id(id).await?;

    if let Some(template) = template {
        return Ok(Json(TemplateDto::from(&template)));
    }

    Err(ServiceError::NotFound)
}

fn get_template_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a work order template by id.")
        .tag("flowtrak")
        .response::<200, Json<TemplateDto>>()
        .response_with::<404, (), _>(|res| res.description("The requested template does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn create_template(
    mut state: RequestState,
    form: JsonBody<SaveTemplateDto>,
) -> ServiceResult<Json<TemplateDto>> {
    let user = state.session_require_manager()?;
    let template = form.0.into_template(0)?;

    let template = state.db.store_template(template).await?;

    log_activity(&mut state.db, Some(user.id), "create", "template", Some(template.id), &template.name).await;
    Ok(Json(TemplateDto::from(&template)))
}

fn create_template_docs(op: TransformOperation) -> TransformOperation {
    op.description("Create a new work order template.")
        .tag("flowtrak")
        .response::<200, Json<TemplateDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input or unknown department!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn update_template(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<SaveTemplateDto>,
) -> ServiceResult<Json<TemplateDto>> {
    let user = state.session_require_manager()?;
    let template = form.0.into_template(id)?;

    if state.db.get_template_by_id(id).await?.is_none() {
        return Err(ServiceError::NotFound);
    }

    let template = state.db.store_template(template).await?;

    log_activity(&mut state.db, Some(user.id), "update", "template", Some(id), &template.name).await;
    Ok(Json(TemplateDto::from(&template)))
}

fn update_template_docs(op: TransformOperation) -> TransformOperation {
    op.description("Update a work order template and replace its steps. Existing work orders keep their checkpoints.")
        .tag("flowtrak")
        .response::<200, Json<TemplateDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input or unknown department!"))
        .response_with::<404, (), _>(|res| res.description("The requested template does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn delete_template(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<StatusCode> {
    let user = state.session_require_manager()?;

    if state.db.get_template_by_id(id).await?.is_none() {
        return Err(ServiceError::NotFound);
    }

    state.db.delete_template(id).await?;

    log_activity(&mut state.db, Some(user.id), "delete", "template", Some(id), "").await;
    Ok(StatusCode::NO_CONTENT)
}

fn delete_template_docs(op: TransformOperation) -> TransformOperation {
    op.description("Delete a work order template.")
        .tag("flowtrak")
        .response_with::<204, (), _>(|res| res.description("The template was successfully deleted!"))
        .response_with::<404, (), _>(|res| res.description("The requested template does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_need_steps() {
        let form = SaveTemplateDto {
            name: "Supplier onboarding".to_owned(),
            description: String::new(),
            steps: vec![],
        };
        assert!(form.into_template(0).is_err());
    }

    #[test]
    fn step_names_are_trimmed() {
        let form = SaveTemplateDto {
            name: " Supplier onboarding ".to_owned(),
            description: String::new(),
            steps: vec![
                TemplateStepDto {
                    name: " Contract ".to_owned(),
                    department_id: Some(2),
                },
                TemplateStepDto {
                    name: "Tasting".to_owned(),
                    department_id: None,
                },
            ],
        };
        let template = form.into_template(5).unwrap();
        assert_eq!(template.id, 5);
        assert_eq!(template.name, "Supplier onboarding");
        assert_eq!(template.steps[0].name, "Contract");
        assert_eq!(template.steps[0].department_id, Some(2));
        assert_eq!(template.steps.len(), 2);
    }
}
