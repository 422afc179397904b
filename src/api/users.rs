use aide::axum::routing::{get_with, put_with};
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
use crate::validation::{Validator, MAX_NAME_LEN, MAX_PASSWORD_LEN, MAX_SHORT_TEXT_LEN};

use super::{log_activity, password_hash_create};

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/user/:id",
            get_with(get_user, get_user_docs)
                .put_with(update_user, update_user_docs)
                .delete_with(delete_user, delete_user_docs),
        )
        .api_route(
            "/user/:id/password",
            put_with(update_user_password, update_user_password_docs),
        )
        .api_route(
            "/users",
            get_with(list_users, list_users_docs).post_with(create_user, create_user_docs),
        )
        .with_state(app_state)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub enum RoleDto {
    Admin,
    Manager,
    Staff,
    Kitchen,
}

impl From<&models::Role> for RoleDto {
    fn from(value: &models::Role) -> Self {
        match value {
            models::Role::Admin => RoleDto::Admin,
            models::Role::Manager => RoleDto::Manager,
            models::Role::Staff => RoleDto::Staff,
            models::Role::Kitchen => RoleDto::Kitchen,
        }
    }
}

impl From<RoleDto> for models::Role {
    fn from(value: RoleDto) -> Self {
        match value {
            RoleDto::Admin => models::Role::Admin,
            RoleDto::Manager => models::Role::Manager,
            RoleDto::Staff => models::Role::Staff,
            RoleDto::Kitchen => models::Role::Kitchen,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct UserDto {
    pub id: u64,
    pub username: String,
    pub name: String,
    pub role: RoleDto,
    pub department_id: Option<u64>,
    pub created_at: String,
}

impl From<&models::User> for UserDto {
    fn from(value: &models::User) -> Self {
        Self {
            id: value.id,
            username: value.username.to_owned(),
            name: value.name.to_owned(),
            role: RoleDto::from(&value.role),
            department_id: value.department_id,
            created_at: value.created_at.to_rfc3339(),
        }
    }
}

async fn list_users(mut state: RequestState) -> ServiceResult<Json<Vec<UserDto>>> {
    state.session_require_admin()?;

    let users = state.db.get_all_users().await?;
    Ok(Json(users.iter().map(UserDto::from).collect()))
}

fn list_users_docs(op: TransformOperation) -> TransformOperation {
    op.description("List all users.")
        .tag("users")
        .response::<200, Json<Vec<UserDto>>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin"])
}

async fn get_user(mut state: RequestState, Path(id): Path<u64>) -> ServiceResult<Json<UserDto>> {
    state.session_require_admin_or_self(id)?;

    let user = state.db.get_user_by_id(id).await?;

    if let Some(user) = user {
        return Ok(Json(UserDto::from(&user)));
    }

    Err(ServiceError::NotFound)
}

fn get_user_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a user by id.")
        .tag("users")
        .response::<200, Json<UserDto>>()
        .response_with::<404, (), _>(|res| res.description("The requested user does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin", "self"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct CreateUserDto {
    pub username: String,
    pub name: String,
    pub password: String,
    pub role: RoleDto,
    pub department_id: Option<u64>,
}

async fn create_user(
    mut state: RequestState,
    form: JsonBody<CreateUserDto>,
) -> ServiceResult<Json<UserDto>> {
    let admin = state.session_require_admin()?;
    let form = form.0;

    Validator::new()
        .required_text("username", &form.username, MAX_SHORT_TEXT_LEN)
        .required_text("name", &form.name, MAX_NAME_LEN)
        .required_text("password", &form.password, MAX_PASSWORD_LEN)
        .finish()?;

    let username = form.username.trim().to_owned();
    if state.db.username_exists(&username, 0).await? {
        return Err(ServiceError::BadRequest("username_taken"));
    }

    let user = models::User {
        id: 0,
        username,
        name: form.name.trim().to_owned(),
        role: form.role.into(),
        department_id: form.department_id,
        created_at: chrono::Utc::now(),
    };

    let password_hash = password_hash_create(&form.password)?;
    let user = state.db.store_user(user, Some(password_hash)).await?;

    log_activity(&mut state.db, Some(admin.id), "create", "user", Some(user.id), &user.username).await;
    Ok(Json(UserDto::from(&user)))
}

fn create_user_docs(op: TransformOperation) -> TransformOperation {
    op.description("Create a new user.")
        .tag("users")
        .response::<200, Json<UserDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input or username taken!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct UpdateUserDto {
    pub username: String,
    pub name: String,
    pub role: RoleDto,
    pub department_id: Option<u64>,
}

async fn update_user(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<UpdateUserDto>,
) -> ServiceResult<Json<UserDto>> {
    let admin = state.session_require_admin()?;
    let form = form.0;

    Validator::new()
        .required_text("username", &form.username, MAX_SHORT_TEXT_LEN)
        .required_text("name", &form.name, MAX_NAME_LEN)
        .finish()?;

    let user = state.db.get_user_by_id(id).await?;

    if let Some(mut user) = user {
        let username = form.username.trim().to_owned();
        if state.db.username_exists(&username, id).await? {
            return Err(ServiceError::BadRequest("username_taken"));
        }

        user.username = username;
        user.name = form.name.trim().to_owned();
        user.role = form.role.into();
        user.department_id = form.department_id;

        let user = state.db.store_user(user, None).await?;

        log_activity(&mut state.db, Some(admin.id), "update", "user", Some(id), &user.username).await;
        return Ok(Json(UserDto::from(&user)));
    }

    Err(ServiceError::NotFound)
}

fn update_user_docs(op: TransformOperation) -> TransformOperation {
    op.description("Update an existing user.")
        .tag("users")
        .response::<200, Json<UserDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input or username taken!"))
        .response_with::<404, (), _>(|res| res.description("The requested user does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct UpdatePasswordDto {
    pub password: String,
}

async fn update_user_password(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<UpdatePasswordDto>,
) -> ServiceResult<StatusCode> {
    let actor = state.session_require_admin_or_self(id)?;
    let form = form.0;

    Validator::new()
        .required_text("password", &form.password, MAX_PASSWORD_LEN)
        .finish()?;

    let user = state.db.get_user_by_id(id).await?;

    if let Some(user) = user {
        let password_hash = password_hash_create(&form.password)?;
        state.db.store_user(user, Some(password_hash)).await?;

        log_activity(&mut state.db, Some(actor.id), "change_password", "user", Some(id), "").await;
        return Ok(StatusCode::NO_CONTENT);
    }

    Err(ServiceError::NotFound)
}

fn update_user_password_docs(op: TransformOperation) -> TransformOperation {
    op.description("Set a new password.")
        .tag("users")
        .response_with::<204, (), _>(|res| res.description("The password was changed!"))
        .response_with::<400, (), _>(|res| res.description("Invalid password!"))
        .response_with::<404, (), _>(|res| res.description("The requested user does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin", "self"])
}

async fn delete_user(mut state: RequestState, Path(id): Path<u64>) -> ServiceResult<StatusCode> {
    let admin = state.session_require_admin()?;

    if admin.id == id {
        return Err(ServiceError::BadRequest("cannot_delete_self"));
    }

    if state.db.get_user_by_id(id).await?.is_none() {
        return Err(ServiceError::NotFound);
    }

    state.db.delete_user(id).await?;

    log_activity(&mut state.db, Some(admin.id), "delete", "user", Some(id), "").await;
    Ok(StatusCode::NO_CONTENT)
}

fn delete_user_docs(op: TransformOperation) -> TransformOperation {
    op.description("Delete an existing user.")
        .tag("users")
        .response_with::<204, (), _>(|res| res.description("The user was successfully deleted!"))
        .response_with::<400, (), _>(|res| res.description("Users cannot delete themself!"))
        .response_with::<404, (), _>(|res| res.description("The requested user does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin"])
}
