use super::common::success_response;
use crate::{
    entities::report::Model as Report, errors::ServiceError, services::reports::ReportQuery,
    ApiResponse, AppState,
};
use axum::{
    extract::{Query, State},
    Json,
};

#[utoipa::path(
    get,
    path = "/api/v1/reports",
    summary = "List reports",
    description = "Stored route stops, earliest scheduled first.",
    params(ReportQuery),
    responses(
        (status = 200, description = "Reports retrieved", body = ApiResponse<Vec<Report>>),
    ),
    tag = "reports"
)]
pub async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<ApiResponse<Vec<Report>>>, ServiceError> {
    let reports = state.services.reports.list_reports(&query).await?;
    Ok(success_response(reports))
}
