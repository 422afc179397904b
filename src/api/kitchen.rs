use aide::axum::routing::get_with;
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::Json;
use schemars::JsonSchema;
use serde::Serialize;

use crate::database::AppState;
use crate::error::ServiceResult;
use crate::models;
use crate::request_state::RequestState;

use super::orders::OrderItemDto;

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route("/kitchen/queue", get_with(get_queue, get_queue_docs))
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct KitchenTicketDto {
    pub item: OrderItemDto,
    pub session_id: u64,
    pub table_name: String,
    pub ordered_at: String,
}

impl From<&models::KitchenTicket> for KitchenTicketDto {
    fn from(value: &models::KitchenTicket) -> Self {
        Self {
            item: OrderItemDto::from(&value.item),
            session_id: value.session_id,
            table_name: value.table_name.to_owned(),
            ordered_at: value.ordered_at.to_rfc3339(),
        }
    }
}

async fn get_queue(mut state: RequestState) -> ServiceResult<Json<Vec<KitchenTicketDto>>> {
    state.session_require_kitchen()?;

    let queue = state.db.get_kitchen_queue().await?;
    Ok(Json(queue.iter().map(KitchenTicketDto::from).collect()))
}

fn get_queue_docs(op: TransformOperation) -> TransformOperation {
    op.description("All items the kitchen still has to serve, oldest order first.")
        .tag("kitchen")
        .response::<200, Json<Vec<KitchenTicketDto>>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["kitchen"])
}
