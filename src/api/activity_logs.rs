use aide::axum::routing::get_with;
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::Json;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::database::AppState;
use crate::error::ServiceResult;
use crate::extract::Query;
use crate::models;
use crate::request_state::RequestState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route("/activity-logs", get_with(list_activity_logs, list_activity_logs_docs))
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct ActivityLogDto {
    pub id: u64,
    pub user_id: Option<u64>,
    pub action: String,
    pub entity: String,
    pub entity_id: Option<u64>,
    pub detail: String,
    pub created_at: String,
}

impl From<&models::ActivityLog> for ActivityLogDto {
    fn from(value: &models::ActivityLog) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            action: value.action.to_owned(),
            entity: value.entity.to_owned(),
            entity_id: value.entity_id,
            detail: value.detail.to_owned(),
            created_at: value.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ActivityLogQuery {
    /// Defaults to 100, at most 1000
    pub limit: Option<i64>,
}

fn effective_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

async fn list_activity_logs(
    mut state: RequestState,
    Query(query): Query<ActivityLogQuery>,
) -> ServiceResult<Json<Vec<ActivityLogDto>>> {
    state.session_require_admin()?;

    let logs = state
        .db
        .get_activity_logs(effective_limit(query.limit))
        .await?;
    Ok(Json(logs.iter().map(ActivityLogDto::from).collect()))
}

fn list_activity_logs_docs(op: TransformOperation) -> TransformOperation {
    op.description("List the most recent activity log entries, newest first.")
        .tag("activity_logs")
        .response::<200, Json<Vec<ActivityLogDto>>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(effective_limit(None), 100);
        assert_eq!(effective_limit(Some(20)), 20);
        assert_eq!(effective_limit(Some(5000)), 1000);
        assert_eq!(effective_limit(Some(0)), 1);
        assert_eq!(effective_limit(Some(-3)), 1);
    }
}
