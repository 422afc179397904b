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

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route("/flowtrak/dashboard", get_with(get_dashboard, get_dashboard_docs))
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct DepartmentLoadDto {
    /// `None` collects work orders without a department
    pub department_id: Option<u64>,
    pub department_name: Option<String>,
    /// Open and in progress work orders
    pub open: i64,
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct DashboardDto {
    pub open: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub cancelled: i64,
    /// Unfinished work orders past their due date
    pub overdue: i64,
    pub by_department: Vec<DepartmentLoadDto>,
}

impl From<&models::WorkOrderDashboard> for DashboardDto {
    fn from(value: &models::WorkOrderDashboard) -> Self {
        Self {
            open: value.open,
            in_progress: value.in_progress,
            completed: value.completed,
            cancelled: value.cancelled,
            overdue: value.overdue,
            by_department: value
                .by_department
                .iter()
                .map(|d| DepartmentLoadDto {
                    department_id: d.department_id,
                    department_name: d.department_name.to_owned(),
                    open: d.open,
                })
                .collect(),
        }
    }
}

async fn get_dashboard(mut state: RequestState) -> ServiceResult<Json<DashboardDto>> {
    state.session_require()?;

    let dashboard = state.db.get_work_order_dashboard().await?;
    Ok(Json(DashboardDto::from(&dashboard)))
}

fn get_dashboard_docs(op: TransformOperation) -> TransformOperation {
    op.description("Work order counts per status and department.")
        .tag("flowtrak")
        .response::<200, Json<DashboardDto>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .security_requirement("SessionToken")
}
