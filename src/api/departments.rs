use aide::axum::routing::get_with;
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::http::StatusCode;
use axum::Json;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::broadcast::Topic;
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
            "/flowtrak/department/:id",
            get_with(get_department, get_department_docs)
                .put_with(update_department, update_department_docs)
                .delete_with(delete_department, delete_department_docs),
        )
        .api_route(
            "/flowtrak/departments",
            get_with(list_departments, list_departments_docs)
                .post_with(create_department, create_department_docs),
        )
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct DepartmentDto {
    pub id: u64,
    pub name: String,
    pub description: String,
}

impl From<&models::Department> for DepartmentDto {
    fn from(value: &models::Department) -> Self {
        Self {
            id: value.id,
            name: value.name.to_owned(),
            description: value.description.to_owned(),
        }
    }
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct SaveDepartmentDto {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl SaveDepartmentDto {
    fn validate(&self) -> ServiceResult<()> {
        Validator::new()
            .required_text("name", &self.name, MAX_NAME_LEN)
            .optional_text("description", Some(&self.description), MAX_NOTE_LEN)
            .finish()
    }
}

async fn list_departments(mut state: RequestState) -> ServiceResult<Json<Vec<DepartmentDto>>> {
    state.session_require()?;

    let departments = state.db.get_all_departments().await?;
    Ok(Json(departments.iter().map(DepartmentDto::from).collect()))
}

fn list_departments_docs(op: TransformOperation) -> TransformOperation {
    op.description("List all departments.")
        .tag("flowtrak")
        .response::<200, Json<Vec<DepartmentDto>>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .security_requirement("SessionToken")
}

async fn get_department(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<Json<DepartmentDto>> {
    state.session_require()?;

    let department = state.db.get_department_by_id(id).await?;

    if let Some(department) = department {
        return Ok(Json(DepartmentDto::from(&department)));
    }

    Err(ServiceError::NotFound)
}

fn get_department_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a department by id.")
        .tag("flowtrak")
        .response::<200, Json<DepartmentDto>>()
        .response_with::<404, (), _>(|res| res.description("The requested department does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .security_requirement("SessionToken")
}

async fn create_department(
    mut state: RequestState,
    form: JsonBody<SaveDepartmentDto>,
) -> ServiceResult<Json<DepartmentDto>> {
    let user = state.session_require_manager()?;
    let form = form.0;
    form.validate()?;

    let name = form.name.trim().to_owned();
    if state.db.department_name_exists(&name, 0).await? {
        return Err(ServiceError::BadRequest("department_name_taken"));
    }

    let department = state
        .db
        .store_department(models::Department {
            id: 0,
            name,
            description: form.description.trim().to_owned(),
        })
        .await?;
    let dto = DepartmentDto::from(&department);

    log_activity(&mut state.db, Some(user.id), "create", "department", Some(department.id), &department.name).await;
    state.events.emit(Topic::Flowtrak, "department.created", None, &dto);
    Ok(Json(dto))
}

fn create_department_docs(op: TransformOperation) -> TransformOperation {
    op.description("Create a new department.")
        .tag("flowtrak")
        .response::<200, Json<DepartmentDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input or name taken!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn update_department(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<SaveDepartmentDto>,
) -> ServiceResult<Json<DepartmentDto>> {
    let user = state.session_require_manager()?;
    let form = form.0;
    form.validate()?;

    let department = state.db.get_department_by_id(id).await?;

    if let Some(mut department) = department {
        let name = form.name.trim().to_owned();
        if state.db.department_name_exists(&name, id).await? {
            return Err(ServiceError::BadRequest("department_name_taken"));
        }

        department.name = name;
        department.description = form.description.trim().to_owned();

        let department = state.db.store_department(department).await?;
        let dto = DepartmentDto::from(&department);

        log_activity(&mut state.db, Some(user.id), "update", "department", Some(id), &department.name).await;
        state.events.emit(Topic::Flowtrak, "department.updated", None, &dto);
        return Ok(Json(dto));
    }

    Err(ServiceError::NotFound)
}

fn update_department_docs(op: TransformOperation) -> TransformOperation {
    op.description("Update an existing department.")
        .tag("flowtrak")
        .response::<200, Json<DepartmentDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input or name taken!"))
        .response_with::<404, (), _>(|res| res.description("The requested department does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn delete_department(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<StatusCode> {
    let user = state.session_require_manager()?;

    if state.db.get_department_by_id(id).await?.is_none() {
        return Err(ServiceError::NotFound);
    }

    state.db.delete_department(id).await?;

    log_activity(&mut state.db, Some(user.id), "delete", "department", Some(id), "").await;
    state
        .events
        .emit(Topic::Flowtrak, "department.deleted", None, &serde_json::json!({ "id": id }));
    Ok(StatusCode::NO_CONTENT)
}

fn delete_department_docs(op: TransformOperation) -> TransformOperation {
    op.description("Delete a department. Users, steps and checkpoints lose their department.")
        .tag("flowtrak")
        .response_with::<204, (), _>(|res| res.description("The department was successfully deleted!"))
        .response_with::<404, (), _>(|res| res.description("The requested department does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}
