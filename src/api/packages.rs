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
            "/package/:id",
            get_with(get_package, get_package_docs)
                .put_with(update_package, update_package_docs)
                .delete_with(delete_package, delete_package_docs),
        )
        .api_route(
            "/packages",
            get_with(list_packages, list_packages_docs)
                .post_with(create_package, create_package_docs),
        )
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct PackageDto {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub price_per_guest_cents: i64,
    pub active: bool,
    /// Menu items that are included in the package price
    pub menu_item_ids: Vec<u64>,
}

impl From<&models::Package> for PackageDto {
    fn from(value: &models::Package) -> Self {
        Self {
            id: value.id,
            name: value.name.to_owned(),
            description: value.description.to_owned(),
            price_per_guest_cents: value.price_per_guest_cents,
            active: value.active,
            menu_item_ids: value.menu_item_ids.to_owned(),
        }
    }
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct SavePackageDto {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price_per_guest_cents: i64,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub menu_item_ids: Vec<u64>,
}

fn default_active() -> bool {
    true
}

impl SavePackageDto {
    fn validate(&self) -> ServiceResult<()> {
        Validator::new()
            .required_text("name", &self.name, MAX_NAME_LEN)
            .optional_text("description", Some(&self.description), MAX_NOTE_LEN)
            .range("price_per_guest_cents", self.price_per_guest_cents, 0, i64::MAX)
            .finish()
    }
}

async fn list_packages(mut state: RequestState) -> ServiceResult<Json<Vec<PackageDto>>> {
    let packages = state.db.get_all_packages().await?;
    Ok(Json(packages.iter().map(PackageDto::from).collect()))
}

fn list_packages_docs(op: TransformOperation) -> TransformOperation {
    op.description("List all buffet packages.")
        .tag("packages")
        .response::<200, Json<Vec<PackageDto>>>()
}

async fn get_package(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<Json<PackageDto>> {
    let package = state.db.get_package_by_id(id).await?;

    if let Some(package) = package {
        return Ok(Json(PackageDto::from(&package)));
    }

    Err(ServiceError::NotFound)
}

fn get_package_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a buffet package by id.")
        .tag("packages")
        .response::<200, Json<PackageDto>>()
        .response_with::<404, (), _>(|res| res.description("The requested package does not exist!"))
}

async fn create_package(
    mut state: RequestState,
    form: JsonBody<SavePackageDto>,
) -> ServiceResult<Json<PackageDto>> {
    let user = state.session_require_manager()?;
    let form = form.0;
    form.validate()?;

    let package = models::Package {
        id: 0,
        name: form.name.trim().to_owned(),
        description: form.description.trim().to_owned(),
        price_per_guest_cents: form.price_per_guest_cents,
        active: form.active,
        menu_item_ids: form.menu_item_ids,
    };

    let package = state.db.store_package(package).await?;
    let dto = PackageDto::from(&package);

    log_activity(&mut state.db, Some(user.id), "create", "package", Some(package.id), &package.name).await;
    state.events.emit(Topic::Menu, "package.created", None, &dto);
    Ok(Json(dto))
}

fn create_package_docs(op: TransformOperation) -> TransformOperation {
    op.description("Create a new buffet package.")
        .tag("packages")
        .response::<200, Json<PackageDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input or unknown menu item!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn update_package(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<SavePackageDto>,
) -> ServiceResult<Json<PackageDto>> {
    let user = state.session_require_manager()?;
    let form = form.0;
    form.validate()?;

    let package = state.db.get_package_by_id(id).await?;

    if let Some(mut package) = package {
        package.name = form.name.trim().to_owned();
        package.description = form.description.trim().to_owned();
        package.price_per_guest_cents = form.price_per_guest_cents;
        package.active = form.active;
        package.menu_item_ids = form.menu_item_ids;

        let package = state.db.store_package(package).await?;
        let dto = PackageDto::from(&package);

        log_activity(&mut state.db, Some(user.id), "update", "package", Some(id), &package.name).await;
        state.events.emit(Topic::Menu, "package.updated", None, &dto);
        return Ok(Json(dto));
    }

    Err(ServiceError::NotFound)
}

fn update_package_docs(op: TransformOperation) -> TransformOperation {
    op.description("Update an existing buffet package and replace its included items.")
        .tag("packages")
        .response::<200, Json<PackageDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input or unknown menu item!"))
        .response_with::<404, (), _>(|res| res.description("The requested package does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn delete_package(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<StatusCode> {
    let user = state.session_require_manager()?;

    if state.db.get_package_by_id(id).await?.is_none() {
        return Err(ServiceError::NotFound);
    }

    state.db.delete_package(id).await?;

    log_activity(&mut state.db, Some(user.id), "delete", "package", Some(id), "").await;
    state
        .events
        .emit(Topic::Menu, "package.deleted", None, &serde_json::json!({ "id": id }));
    Ok(StatusCode::NO_CONTENT)
}

fn delete_package_docs(op: TransformOperation) -> TransformOperation {
    op.description("Delete a buffet package.")
        .tag("packages")
        .response_with::<204, (), _>(|res| res.description("The package was successfully deleted!"))
        .response_with::<404, (), _>(|res| res.description("The requested package does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}
