use std::ops::Add;

use aide::axum::routing::{delete_with, get_with, post_with};
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use aide::OperationOutput;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::database::AppState;
use crate::error::{ServiceError, ServiceResult};
use crate::extract::JsonBody;
use crate::request_state::RequestState;
use crate::validation::{Validator, MAX_PASSWORD_LEN, MAX_SHORT_TEXT_LEN};
use crate::{env, SESSION_COOKIE_NAME};

use super::users::UserDto;
use super::{log_activity, password_hash_verify};

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route("/auth/login", post_with(auth_login, auth_login_docs))
        .api_route("/auth/me", get_with(auth_me, auth_me_docs))
        .api_route("/auth", delete_with(auth_delete, auth_delete_docs))
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct AuthTokenDto {
    pub token: String,
}

impl OperationOutput for AuthTokenDto {
    type Inner = AuthTokenDto;
}
impl IntoResponse for AuthTokenDto {
    fn into_response(self) -> axum::response::Response {
        let mut headers = HeaderMap::new();
        // Tokens are alphanumeric, so the header value is always valid.
        if let Ok(cookie) = HeaderValue::from_str(&format!(
            "{}={}; Path=/api/v1; HttpOnly; SameSite=Lax",
            SESSION_COOKIE_NAME, self.token
        )) {
            headers.insert(header::SET_COOKIE, cookie);
        }

        (StatusCode::OK, headers, Json(self)).into_response()
    }
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct LoginDto {
    pub username: String,
    pub password: String,
}

async fn auth_login(
    mut state: RequestState,
    form: JsonBody<LoginDto>,
) -> ServiceResult<AuthTokenDto> {
    let form = form.0;

    Validator::new()
        .required_text("username", &form.username, MAX_SHORT_TEXT_LEN)
        .required_text("password", &form.password, MAX_PASSWORD_LEN)
        .finish()?;

    if let Some((user, password_hash)) = state.db.get_user_credentials(&form.username).await? {
        if password_hash_verify(&password_hash, &form.password)? {
            let valid_until = Utc::now().add(Duration::minutes(*env::SESSION_LIFETIME_MINUTES));
            let token = state.db.create_session_token(user.id, valid_until).await?;

            log_activity(&mut state.db, Some(user.id), "login", "user", Some(user.id), "").await;
            return Ok(AuthTokenDto { token });
        }
    }

    Err(ServiceError::Unauthorized("invalid_credentials"))
}

fn auth_login_docs(op: TransformOperation) -> TransformOperation {
    op.description("Login with username and password.")
        .tag("auth")
        .response::<200, Json<AuthTokenDto>>()
        .response_with::<400, (), _>(|res| res.description("Username or password missing!"))
        .response_with::<401, (), _>(|res| res.description("Invalid username or password!"))
}

async fn auth_me(state: RequestState) -> ServiceResult<Json<UserDto>> {
    let user = state.session_require()?;
    Ok(Json(UserDto::from(&user)))
}

fn auth_me_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get the logged in user.")
        .tag("auth")
        .response::<200, Json<UserDto>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .security_requirement("SessionToken")
}

async fn auth_delete(mut state: RequestState) -> ServiceResult<StatusCode> {
    if let Some(session) = state.session.take() {
        state.db.delete_session_token(&session.token).await?;
    }

    Ok(StatusCode::NO_CONTENT)
}

fn auth_delete_docs(op: TransformOperation) -> TransformOperation {
    op.description("Logout the current session.")
        .tag("auth")
        .response_with::<204, (), _>(|res| res.description("Logout was successful!"))
}
