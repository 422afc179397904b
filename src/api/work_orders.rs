use aide::axum::routing::{delete_with, get_with, post_with};
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use log::info;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::broadcast::Topic;
use crate::database::{AppState, WorkOrderFilter};
use crate::error::{ServiceError, ServiceResult};
use crate::extract::{JsonBody, Path, Query};
use crate::models::{self, Role};
use crate::request_state::RequestState;
use crate::validation::{Validator, MAX_NAME_LEN, MAX_NOTE_LEN};

use super::log_activity;

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/flowtrak/work-orders",
            get_with(list_work_orders, list_work_orders_docs)
                .post_with(create_work_order, create_work_order_docs),
        )
        .api_route(
            "/flowtrak/work-order/:id",
            get_with(get_work_order, get_work_order_docs)
                .put_with(update_work_order, update_work_order_docs)
                .delete_with(delete_work_order, delete_work_order_docs),
        )
        .api_route(
            "/flowtrak/work-order/:id/cancel",
            post_with(cancel_work_order, cancel_work_order_docs),
        )
        .api_route(
            "/flowtrak/work-order/:id/checkpoint/:checkpoint/complete",
            post_with(complete_checkpoint, complete_checkpoint_docs),
        )
        .api_route(
            "/flowtrak/work-order/:id/comments",
            get_with(list_comments, list_comments_docs)
                .post_with(create_comment, create_comment_docs),
        )
        .api_route(
            "/flowtrak/comment/:id",
            delete_with(delete_comment, delete_comment_docs),
        )
        .with_state(app_state)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub enum WorkOrderStatusDto {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl From<models::WorkOrderStatus> for WorkOrderStatusDto {
    fn from(value: models::WorkOrderStatus) -> Self {
        match value {
            models::WorkOrderStatus::Open => WorkOrderStatusDto::Open,
            models::WorkOrderStatus::InProgress => WorkOrderStatusDto::InProgress,
            models::WorkOrderStatus::Completed => WorkOrderStatusDto::Completed,
            models::WorkOrderStatus::Cancelled => WorkOrderStatusDto::Cancelled,
        }
    }
}

impl From<WorkOrderStatusDto> for models::WorkOrderStatus {
    fn from(value: WorkOrderStatusDto) -> Self {
        match value {
            WorkOrderStatusDto::Open => models::WorkOrderStatus::Open,
            WorkOrderStatusDto::InProgress => models::WorkOrderStatus::InProgress,
            WorkOrderStatusDto::Completed => models::WorkOrderStatus::Completed,
            WorkOrderStatusDto::Cancelled => models::WorkOrderStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, JsonSchema)]
pub enum CheckpointStatusDto {
    Pending,
    Done,
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct CheckpointDto {
    pub id: u64,
    pub position: i32,
    pub name: String,
    pub department_id: Option<u64>,
    pub status: CheckpointStatusDto,
    pub completed_by: Option<u64>,
    pub completed_at: Option<String>,
}

impl From<&models::Checkpoint> for CheckpointDto {
    fn from(value: &models::Checkpoint) -> Self {
        Self {
            id: value.id,
            position: value.position,
            name: value.name.to_owned(),
            department_id: value.department_id,
            status: match value.status {
                models::CheckpointStatus::Pending => CheckpointStatusDto::Pending,
                models::CheckpointStatus::Done => CheckpointStatusDto::Done,
            },
            completed_by: value.completed_by,
            completed_at: value.completed_at.map(|d| d.to_rfc3339()),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct CommentDto {
    pub id: u64,
    pub author_id: Option<u64>,
    /// Missing if the author was deleted
    pub author_name: Option<String>,
    pub body: String,
    pub created_at: String,
}

impl From<&models::Comment> for CommentDto {
    fn from(value: &models::Comment) -> Self {
        Self {
            id: value.id,
            author_id: value.author_id,
            author_name: value.author_name.to_owned(),
            body: value.body.to_owned(),
            created_at: value.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct WorkOrderDto {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub department_id: Option<u64>,
    pub template_id: Option<u64>,
    pub status: WorkOrderStatusDto,
    pub created_by: Option<u64>,
    pub due_at: Option<String>,
    pub overdue: bool,
    pub created_at: String,
    pub updated_at: String,
    pub checkpoints: Vec<CheckpointDto>,
    /// Only included when a single work order is requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<CommentDto>>,
}

impl From<&models::WorkOrder> for WorkOrderDto {
    fn from(value: &models::WorkOrder) -> Self {
        Self {
            id: value.id,
            title: value.title.to_owned(),
            description: value.description.to_owned(),
            department_id: value.department_id,
            template_id: value.template_id,
            status: value.status.into(),
            created_by: value.created_by,
            due_at: value.due_at.map(|d| d.to_rfc3339()),
            overdue: value.is_overdue_at(Utc::now()),
            created_at: value.created_at.to_rfc3339(),
            updated_at: value.updated_at.to_rfc3339(),
            checkpoints: value.checkpoints.iter().map(CheckpointDto::from).collect(),
            comments: None,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WorkOrderQuery {
    pub status: Option<WorkOrderStatusDto>,
    pub department_id: Option<u64>,
}

async fn list_work_orders(
    mut state: RequestState,
    Query(query): Query<WorkOrderQuery>,
) -> ServiceResult<Json<Vec<WorkOrderDto>>> {
    state.session_require()?;

    let filter = WorkOrderFilter {
        status: query.status.map(Into::into),
        department_id: query.department_id,
    };
    let work_orders = state.db.get_work_orders(filter).await?;
    Ok(Json(work_orders.iter().map(WorkOrderDto::from).collect()))
}

fn list_work_orders_docs(op: TransformOperation) -> TransformOperation {
    op.description("List work orders, newest first, optionally filtered by status and department.")
        .tag("flowtrak")
        .response::<200, Json<Vec<WorkOrderDto>>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .security_requirement("SessionToken")
}

async fn get_work_order(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<Json<WorkOrderDto>> {
    state.session_require()?;

    let work_order = state.db.get_work_order_by_id(id).await?;

    if let Some(work_order) = work_order {
        let comments = state.db.get_comments(id).await?;
        let mut dto = WorkOrderDto::from(&work_order);
        dto.comments = Some(comments.iter().map(CommentDto::from).collect());
        return Ok(Json(dto));
    }

    Err(ServiceError::NotFound)
}

fn get_work_order_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a work order with its checkpoints and comments.")
        .tag("flowtrak")
        .response::<200, Json<WorkOrderDto>>()
        .response_with::<404, (), _>(|res| res.description("The requested work order does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .security_requirement("SessionToken")
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct CheckpointInputDto {
    pub name: String,
    pub department_id: Option<u64>,
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct CreateWorkOrderDto {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub department_id: Option<u64>,
    /// RFC 3339 timestamp
    pub due_at: Option<String>,
    /// Copy the checkpoints from this template ...
    pub template_id: Option<u64>,
    /// ... or list them explicitly
    pub checkpoints: Option<Vec<CheckpointInputDto>>,
}

/// Turns checkpoint names and departments into pending checkpoints.
fn pending_checkpoints(steps: Vec<(String, Option<u64>)>) -> Vec<models::Checkpoint> {
    steps
        .into_iter()
        .enumerate()
        .map(|(position, (name, department_id))| models::Checkpoint {
            id: 0,
            work_order_id: 0,
            position: position as i32,
            name,
            department_id,
            status: models::CheckpointStatus::Pending,
            completed_by: None,
            completed_at: None,
        })
        .collect()
}

async fn create_work_order(
    mut state: RequestState,
    form: JsonBody<CreateWorkOrderDto>,
) -> ServiceResult<Json<WorkOrderDto>> {
    let user = state.session_require()?;
    let form = form.0;

    let mut validator = Validator::new();
    validator
        .required_text("title", &form.title, MAX_NAME_LEN)
        .optional_text("description", Some(&form.description), MAX_NOTE_LEN);
    if let Some(ref checkpoints) = form.checkpoints {
        validator.non_empty("checkpoints", checkpoints);
        for (i, checkpoint) in checkpoints.iter().enumerate() {
            validator.required_text(&format!("checkpoints[{}].name", i), &checkpoint.name, MAX_NAME_LEN);
        }
    }
    let due_at = validator.optional_date("due_at", form.due_at.as_deref());
    validator.finish()?;

    let steps: Vec<(String, Option<u64>)> = match (form.template_id, form.checkpoints) {
        (Some(template_id), None) => {
            let template = state
                .db
                .get_template_by_id(template_id)
                .await?
                .ok_or(ServiceError::BadRequest("invalid_reference"))?;
            template
                .steps
                .into_iter()
                .map(|s| (s.name, s.department_id))
                .collect()
        }
        (None, Some(checkpoints)) => checkpoints
            .into_iter()
            .map(|c| (c.name.trim().to_owned(), c.department_id))
            .collect(),
        _ => return Err(ServiceError::BadRequest("invalid_work_order_source")),
    };

    let now = Utc::now();
    let work_order = state
        .db
        .create_work_order(models::WorkOrder {
            id: 0,
            title: form.title.trim().to_owned(),
            description: form.description.trim().to_owned(),
            department_id: form.department_id,
            template_id: form.template_id,
            status: models::WorkOrderStatus::Open,
            created_by: Some(user.id),
            due_at,
            created_at: now,
            updated_at: now,
            checkpoints: pending_checkpoints(steps),
        })
        .await?;
    let dto = WorkOrderDto::from(&work_order);

    info!("Work order {} created by {}", work_order.id, user.username);
    log_activity(&mut state.db, Some(user.id), "create", "work_order", Some(work_order.id), &work_order.title).await;
    state.events.emit(Topic::Flowtrak, "work_order.created", None, &dto);
    Ok(Json(dto))
}

fn create_work_order_docs(op: TransformOperation) -> TransformOperation {
    op.description("Create a work order either from a template or with an explicit checkpoint list.")
        .tag("flowtrak")
        .response::<200, Json<WorkOrderDto>>()
        .response_with::<400, (), _>(|res| {
            res.description("Invalid input, unknown template or not exactly one checkpoint source!")
        })
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .security_requirement("SessionToken")
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct UpdateWorkOrderDto {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub department_id: Option<u64>,
    /// RFC 3339 timestamp
    pub due_at: Option<String>,
}

async fn update_work_order(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<UpdateWorkOrderDto>,
) -> ServiceResult<Json<WorkOrderDto>> {
    let user = state.session_require()?;
    let form = form.0;

    let mut validator = Validator::new();
    validator
        .required_text("title", &form.title, MAX_NAME_LEN)
        .optional_text("description", Some(&form.description), MAX_NOTE_LEN);
    let due_at = validator.optional_date("due_at", form.due_at.as_deref());
    validator.finish()?;

    let work_order = state.db.get_work_order_by_id(id).await?;

    if let Some(mut work_order) = work_order {
        work_order.title = form.title.trim().to_owned();
        work_order.description = form.description.trim().to_owned();
        work_order.department_id = form.department_id;
        work_order.due_at = due_at;

        let work_order = state.db.update_work_order(work_order).await?;
        let dto = WorkOrderDto::from(&work_order);

        log_activity(&mut state.db, Some(user.id), "update", "work_order", Some(id), &work_order.title).await;
        state.events.emit(Topic::Flowtrak, "work_order.updated", None, &dto);
        return Ok(Json(dto));
    }

    Err(ServiceError::NotFound)
}

fn update_work_order_docs(op: TransformOperation) -> TransformOperation {
    op.description("Update title, description, department and due date of a work order.")
        .tag("flowtrak")
        .response::<200, Json<WorkOrderDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input or unknown department!"))
        .response_with::<404, (), _>(|res| res.description("The requested work order does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .security_requirement("SessionToken")
}

async fn delete_work_order(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<StatusCode> {
    let user = state.session_require_manager()?;

    if state.db.get_work_order_by_id(id).await?.is_none() {
        return Err(ServiceError::NotFound);
    }

    state.db.delete_work_order(id).await?;

    log_activity(&mut state.db, Some(user.id), "delete", "work_order", Some(id), "").await;
    state
        .events
        .emit(Topic::Flowtrak, "work_order.deleted", None, &serde_json::json!({ "id": id }));
    Ok(StatusCode::NO_CONTENT)
}

fn delete_work_order_docs(op: TransformOperation) -> TransformOperation {
    op.description("Delete a work order with its checkpoints and comments.")
        .tag("flowtrak")
        .response_with::<204, (), _>(|res| res.description("The work order was successfully deleted!"))
        .response_with::<404, (), _>(|res| res.description("The requested work order does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

async fn cancel_work_order(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<Json<WorkOrderDto>> {
    let user = state.session_require_manager()?;

    if state.db.get_work_order_by_id(id).await?.is_none() {
        return Err(ServiceError::NotFound);
    }

    if !state.db.cancel_work_order(id).await? {
        return Err(ServiceError::BadRequest("work_order_finished"));
    }

    let work_order = state
        .db
        .get_work_order_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;
    let dto = WorkOrderDto::from(&work_order);

    log_activity(&mut state.db, Some(user.id), "cancel", "work_order", Some(id), &work_order.title).await;
    state.events.emit(Topic::Flowtrak, "work_order.cancelled", None, &dto);
    Ok(Json(dto))
}

fn cancel_work_order_docs(op: TransformOperation) -> TransformOperation {
    op.description("Cancel an unfinished work order.")
        .tag("flowtrak")
        .response::<200, Json<WorkOrderDto>>()
        .response_with::<400, (), _>(|res| res.description("The work order is already finished!"))
        .response_with::<404, (), _>(|res| res.description("The requested work order does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["manager"])
}

/// Checkpoints bound to a department can only be completed by its members
/// or by managers.
fn may_complete(user: &models::User, checkpoint: &models::Checkpoint) -> bool {
    match checkpoint.department_id {
        None => true,
        Some(department_id) => {
            user.role.satisfies(Role::Manager) || user.department_id == Some(department_id)
        }
    }
}

async fn complete_checkpoint(
    mut state: RequestState,
    Path((id, checkpoint_id)): Path<(u64, u64)>,
) -> ServiceResult<Json<WorkOrderDto>> {
    let user = state.session_require()?;

    let work_order = state
        .db
        .get_work_order_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;

    let checkpoint = work_order.check_completable(checkpoint_id)?;
    if !may_complete(&user, checkpoint) {
        return Err(ServiceError::Forbidden);
    }
    let checkpoint_name = checkpoint.name.clone();

    let work_order = state
        .db
        .complete_checkpoint(id, checkpoint_id, user.id)
        .await?;
    let dto = WorkOrderDto::from(&work_order);

    log_activity(&mut state.db, Some(user.id), "complete_checkpoint", "work_order", Some(id), &checkpoint_name).await;
    state.events.emit(Topic::Flowtrak, "checkpoint.completed", None, &dto);
    if work_order.status == models::WorkOrderStatus::Completed {
        info!("Work order {} completed", id);
        state.events.emit(Topic::Flowtrak, "work_order.completed", None, &dto);
    }
    Ok(Json(dto))
}

fn complete_checkpoint_docs(op: TransformOperation) -> TransformOperation {
    op.description("Complete the next pending checkpoint of a work order.")
        .tag("flowtrak")
        .response::<200, Json<WorkOrderDto>>()
        .response_with::<400, (), _>(|res| {
            res.description("Work order finished, checkpoint done or earlier checkpoints pending!")
        })
        .response_with::<404, (), _>(|res| res.description("The work order or checkpoint does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("The checkpoint belongs to another department!"))
        .security_requirement("SessionToken")
}

async fn list_comments(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<Json<Vec<CommentDto>>> {
    state.session_require()?;

    if state.db.get_work_order_by_id(id).await?.is_none() {
        return Err(ServiceError::NotFound);
    }

    let comments = state.db.get_comments(id).await?;
    Ok(Json(comments.iter().map(CommentDto::from).collect()))
}

fn list_comments_docs(op: TransformOperation) -> TransformOperation {
    op.description("List the comments of a work order, oldest first.")
        .tag("flowtrak")
        .response::<200, Json<Vec<CommentDto>>>()
        .response_with::<404, (), _>(|res| res.description("The requested work order does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .security_requirement("SessionToken")
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct CreateCommentDto {
    pub body: String,
}

async fn create_comment(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<CreateCommentDto>,
) -> ServiceResult<Json<CommentDto>> {
    let user = state.session_require()?;
    let form = form.0;

    Validator::new()
        .required_text("body", &form.body, MAX_NOTE_LEN)
        .finish()?;

    if state.db.get_work_order_by_id(id).await?.is_none() {
        return Err(ServiceError::NotFound);
    }

    let comment = state.db.create_comment(id, user.id, form.body.trim()).await?;
    let dto = CommentDto::from(&comment);

    state.events.emit(
        Topic::Flowtrak,
        "comment.created",
        None,
        &serde_json::json!({ "work_order_id": id, "comment": &dto }),
    );
    Ok(Json(dto))
}

fn create_comment_docs(op: TransformOperation) -> TransformOperation {
    op.description("Comment on a work order.")
        .tag("flowtrak")
        .response::<200, Json<CommentDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input!"))
        .response_with::<404, (), _>(|res| res.description("The requested work order does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .security_requirement("SessionToken")
}

async fn delete_comment(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<StatusCode> {
    let user = state.session_require()?;

    let comment = state
        .db
        .get_comment_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;

    if comment.author_id != Some(user.id) && !user.role.satisfies(Role::Manager) {
        return Err(ServiceError::Forbidden);
    }

    state.db.delete_comment(id).await?;

    log_activity(&mut state.db, Some(user.id), "delete", "comment", Some(id), "").await;
    state.events.emit(
        Topic::Flowtrak,
        "comment.deleted",
        None,
        &serde_json::json!({ "work_order_id": comment.work_order_id, "id": id }),
    );
    Ok(StatusCode::NO_CONTENT)
}

fn delete_comment_docs(op: TransformOperation) -> TransformOperation {
    op.description("Delete a comment. Only its author or a manager may do this.")
        .tag("flowtrak")
        .response_with::<204, (), _>(|res| res.description("The comment was successfully deleted!"))
        .response_with::<404, (), _>(|res| res.description("The requested comment does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement("SessionToken")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, department_id: Option<u64>) -> models::User {
        models::User {
            id: 1,
            username: "somchai".to_owned(),
            name: "Somchai".to_owned(),
            role,
            department_id,
            created_at: Utc::now(),
        }
    }

    fn checkpoint(department_id: Option<u64>) -> models::Checkpoint {
        pending_checkpoints(vec![("Quality check".to_owned(), department_id)]).remove(0)
    }

    #[test]
    fn department_members_complete_their_checkpoints() {
        assert!(may_complete(&user(Role::Staff, Some(3)), &checkpoint(Some(3))));
        assert!(!may_complete(&user(Role::Staff, Some(4)), &checkpoint(Some(3))));
        assert!(!may_complete(&user(Role::Kitchen, None), &checkpoint(Some(3))));
    }

    #[test]
    fn managers_complete_any_checkpoint() {
        assert!(may_complete(&user(Role::Manager, None), &checkpoint(Some(3))));
        assert!(may_complete(&user(Role::Admin, Some(9)), &checkpoint(Some(3))));
    }

    #[test]
    fn unassigned_checkpoints_are_open_to_everyone() {
        assert!(may_complete(&user(Role::Kitchen, None), &checkpoint(None)));
    }

    #[test]
    fn checkpoints_are_numbered_in_order() {
        let checkpoints = pending_checkpoints(vec![
            ("Contract".to_owned(), None),
            ("Tasting".to_owned(), Some(2)),
        ]);
        let positions: Vec<i32> = checkpoints.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1]);
        assert!(checkpoints
            .iter()
            .all(|c| c.status == models::CheckpointStatus::Pending));
    }
}
