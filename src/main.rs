use std::sync::Arc;

use aide::axum::ApiRouter;
use aide::openapi::OpenApi;
use axum::Extension;
use chrono::Utc;
use log::{error, info, warn};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

mod api;
mod billing;
mod broadcast;
mod cart;
mod database;
mod docs;
mod env;
mod error;
mod extract;
mod i18n;
mod models;
mod request_state;
mod validation;

use crate::database::AppState;
use crate::error::ServiceResult;

/// Cookie set at login, for clients that cannot send an `Authorization` header.
pub const SESSION_COOKIE_NAME: &str = "tablemate_session";

#[tokio::main]
async fn main() {
    let result = init().await;

    let exit_code = match result {
        Ok(_) => 0,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            1
        }
    };

    std::process::exit(exit_code);
}

async fn init() -> ServiceResult<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app_state = AppState::connect(env::DATABASE_URL.as_str()).await?;
    prepare_database(&app_state).await?;

    aide::gen::on_error(|error| warn!("openapi: {}", error));
    aide::gen::extract_schemas(true);

    let mut api = OpenApi::default();

    let app = ApiRouter::new()
        .nest_api_service("/api/v1", api::init(app_state))
        .nest_api_service("/docs", docs::docs_routes())
        .finish_api_with(&mut api, docs::api_docs)
        .nest_service("/uploads", ServeDir::new(env::UPLOAD_DIR.as_str()))
        .layer(Extension(Arc::new(api)))
        .layer(axum::middleware::from_fn(i18n::localize_errors))
        .layer(CorsLayer::permissive());

    let address = format!("{}:{}", env::API_HOST.as_str(), env::API_PORT.as_str());
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Start server on {}", address);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Removes expired login tokens and creates the first admin if no user exists.
async fn prepare_database(app_state: &AppState) -> ServiceResult<()> {
    let mut db = app_state.connection().await?;

    let removed = db.delete_expired_session_tokens().await?;
    if removed > 0 {
        info!("Removed {} expired login tokens", removed);
    }

    if db.count_users().await? > 0 {
        return Ok(());
    }

    match (env::ADMIN_USERNAME.as_ref(), env::ADMIN_PASSWORD.as_ref()) {
        (Some(username), Some(password)) => {
            let user = models::User {
                id: 0,
                username: username.to_owned(),
                name: username.to_owned(),
                role: models::Role::Admin,
                department_id: None,
                created_at: Utc::now(),
            };
            let hash = api::password_hash_create(password)?;
            db.store_user(user, Some(hash)).await?;
            info!("Admin user '{}' was successfully created!", username);
        }
        _ => warn!("No users exist. Set ADMIN_USERNAME and ADMIN_PASSWORD to create an admin."),
    }

    Ok(())
}
