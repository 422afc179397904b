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
use crate::validation::{Validator, MAX_NAME_LEN, MAX_SHORT_TEXT_LEN};

use super::log_activity;

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/table/:id",
            get_with(get_table, get_table_docs)
                .put_with(update_table, update_table_docs)
                .delete_with(delete_table, delete_table_docs),
        )
        .api_route(
            "/tables",
            get_with(list_tables, list_tables_docs).post_with(create_table, create_table_docs),
        )
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct TableDto {
    pub id: u64,
    pub name: String,
    pub seats: i32,
    pub zone: String,
    pub active: bool,
    pub occupied: bool,
}

impl From<&models::DiningTable> for TableDto {
    fn from(value: &models::DiningTable) -> Self {
        Self {
            id: value.id,
            name: value.name.to_owned(),
            seats: value.seats,
            zone: value.zone.to_owned(),
            active: value.active,
            occupied: value.occupied,
        }
    }
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct SaveTableDto {
    pub name: String,
    pub seats: i32,
    #[serde(default)]
    pub zone: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl SaveTableDto {
    fn validate(&self) -> ServiceResult<()> {
        Validator::new()
            .required_text("name", &self.name, MAX_NAME_LEN)
            .range("seats", i64::from(self.seats), 1, 100)
            .optional_text("zone", Some(&self.zone), MAX_SHORT_TEXT_LEN)
            .finish()
    }
}

async fn list_tables(mut state: RequestState) -> ServiceResult<Json<Vec<TableDto>>> {
    state.session_require()?;

    let tables = state.db.get_all_tables().await?;
    Ok(Json(tables.iter().map(TableDto::from).collect()))
}

fn list_tables_docs(op: TransformOperation) -> TransformOperation {
    op.description("List all tables.")
        .tag("tables")
        .response::<200, Json<Vec<TableDto>>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .security_requirement("SessionToken")
}

async fn get_table(mut state: RequestState, Path(id): Path<u64>) -> ServiceResult<Json<TableDto>> {
    state.session_require()?;

    let table = state.db.get_table_by_id(id).await?;

    if let Some(table) = table {
        return Ok(Json(TableDto::from(&table)));
    }

    Err(ServiceError::NotFound)
}

fn get_table_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a table by id.")
        .tag("tables")
        .response::<200, Json<TableDto>>()
        .response_with::<404, (), _>(|res| res.description("The requested table does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .security_requirement("SessionToken")
}

async fn create_table(
    mut state: RequestState,
    form: JsonBody<SaveTableDto>,
) -> ServiceResult<Json<TableDto>> {
    let user = state.session_require_manager()?;
    let form = form.0;
    form.validate()?;

    let name = form.name.trim().to_owned();
    if state.db.table_name_exists(&name, 0).await? {
        return Err(ServiceError::BadRequest("table_name_taken"));
    }

    let table = models::DiningTable {
        id: 0,
        name,
        seats: form.seats,
        zone: form.zone.trim().to_owned(),
        active: form.active,
        occupied: false,
    };

    let table = state.db.store_table(table).await?;
    let dto = TableDto::from(&table);

    log_activity(&mut state.db, Some(user.id), "create", "table", Some(table.id), &table.name).await;
    state.events.emit(Topic::Tables, "table.created", None, &dto);
    Ok(Json(dto))
}

fn create_table_docs(op: TransformOperation) -> TransformOperation {
    op.description("Create a new table.")
        .tag("tables")
        .response::<200, Json<TableDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input or name taken!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn update_table(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<SaveTableDto>,
) -> ServiceResult<Json<TableDto>> {
    let user = state.session_require_manager()?;
    let form = form.0;
    form.validate()?;

    let table = state.db.get_table_by_id(id).await?;

    if let Some(mut table) = table {
        let name = form.name.trim().to_owned();
        if state.db.table_name_exists(&name, id).await? {
            return Err(ServiceError::BadRequest("table_name_taken"));
        }

        table.name = name;
        table.seats = form.seats;
        table.zone = form.zone.trim().to_owned();
        table.active = form.active;

        let table = state.db.store_table(table).await?;
        let dto = TableDto::from(&table);

        log_activity(&mut state.db, Some(user.id), "update", "table", Some(id), &table.name).await;
        state.events.emit(Topic::Tables, "table.updated", None, &dto);
        return Ok(Json(dto));
    }

    Err(ServiceError::NotFound)
}

fn update_table_docs(op: TransformOperation) -> TransformOperation {
    op.description("Update an existing table.")
        .tag("tables")
        .response::<200, Json<TableDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input or name taken!"))
        .response_with::<404, (), _>(|res| res.description("The requested table does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn delete_table(mut state: RequestState, Path(id): Path<u64>) -> ServiceResult<StatusCode> {
    let user = state.session_require_manager()?;

    let table = state.db.get_table_by_id(id).await?.ok_or(ServiceError::NotFound)?;
    if table.occupied {
        return Err(ServiceError::BadRequest("table_has_open_session"));
    }

    state.db.delete_table(id).await?;

    log_activity(&mut state.db, Some(user.id), "delete", "table", Some(id), &table.name).await;
    state
        .events
        .emit(Topic::Tables, "table.deleted", None, &serde_json::json!({ "id": id }));
    Ok(StatusCode::NO_CONTENT)
}

fn delete_table_docs(op: TransformOperation) -> TransformOperation {
    op.description("Delete an existing table.")
        .tag("tables")
        .response_with::<204, (), _>(|res| res.description("The table was successfully deleted!"))
        .response_with::<400, (), _>(|res| {
            res.description("The table has an open session or a session history!")
        })
        .response_with::<404, (), _>(|res| res.description("The requested table does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}
