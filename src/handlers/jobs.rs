use super::common::success_response;
use crate::{
    errors::ServiceError,
    jobs::{JobKind, JobRun},
    services::{
        dispatch_sync::AutoImportOutcome,
        imports::{ImportOrdersRequest, ImportSummary},
        reports::{FetchReportsOutcome, FetchReportsRequest},
    },
    ApiResponse, AppState,
};
use axum::{extract::State, Json};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AutoImportRequest {
    /// Defaults to today (UTC)
    pub date_from: Option<NaiveDate>,
    /// Defaults to `date_from`
    pub date_to: Option<NaiveDate>,
}

impl AutoImportRequest {
    pub fn range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let from = self.date_from.unwrap_or(today);
        (from, self.date_to.unwrap_or(from))
    }
}

/// Import raw dispatch orders
#[utoipa::path(
    post,
    path = "/api/v1/jobs/import-bulk-orders",
    summary = "Import bulk orders",
    description = "Imports raw orders as pending_review work orders, skipping order numbers that already exist.",
    request_body = ImportOrdersRequest,
    responses(
        (status = 200, description = "Import finished", body = ApiResponse<ImportSummary>),
        (status = 400, description = "No valid orders provided", body = crate::errors::ErrorResponse),
        (status = 409, description = "Import already running", body = crate::errors::ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn import_bulk_orders(
    State(state): State<AppState>,
    Json(payload): Json<ImportOrdersRequest>,
) -> Result<Json<ApiResponse<ImportSummary>>, ServiceError> {
    let orders = payload.orders.unwrap_or_default();
    let imports = state.services.imports.clone();
    let summary = state
        .services
        .jobs
        .run(JobKind::ImportBulkOrders, imports.import_orders(&orders))
        .await?;
    Ok(success_response(summary))
}

/// Sync the day's routes into reports
#[utoipa::path(
    post,
    path = "/api/v1/jobs/fetch-reports",
    summary = "Fetch reports",
    description = "Fetches routes and completion details for a date and upserts them into reports.",
    request_body(content = FetchReportsRequest, description = "Optional; the date defaults to today"),
    responses(
        (status = 200, description = "Reports synced", body = ApiResponse<FetchReportsOutcome>),
        (status = 409, description = "Job already running", body = crate::errors::ErrorResponse),
        (status = 502, description = "Dispatch API failed", body = crate::errors::ErrorResponse),
        (status = 503, description = "Dispatch API unavailable", body = crate::errors::ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn fetch_reports(
    State(state): State<AppState>,
    payload: Option<Json<FetchReportsRequest>>,
) -> Result<Json<ApiResponse<FetchReportsOutcome>>, ServiceError> {
    let date = payload.and_then(|Json(req)| req.date);
    let reports = state.services.reports.clone();
    let outcome = state
        .services
        .jobs
        .run(JobKind::FetchReports, reports.fetch_reports(date))
        .await?;
    Ok(success_response(outcome))
}

/// Import every completed order in a date range
#[utoipa::path(
    post,
    path = "/api/v1/jobs/auto-import",
    summary = "Auto-import completed orders",
    request_body(content = AutoImportRequest, description = "Optional; the range defaults to today"),
    responses(
        (status = 200, description = "Auto-import finished", body = ApiResponse<AutoImportOutcome>),
        (status = 400, description = "Invalid date range", body = crate::errors::ErrorResponse),
        (status = 409, description = "Job already running", body = crate::errors::ErrorResponse),
        (status = 502, description = "Dispatch API failed", body = crate::errors::ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn auto_import(
    State(state): State<AppState>,
    payload: Option<Json<AutoImportRequest>>,
) -> Result<Json<ApiResponse<AutoImportOutcome>>, ServiceError> {
    let request = payload.map(|Json(req)| req).unwrap_or_default();
    let (from, to) = request.range(Utc::now().date_naive());
    let sync = state.services.dispatch_sync.clone();
    let outcome = state
        .services
        .jobs
        .run(JobKind::AutoImport, sync.auto_import(from, to))
        .await?;
    Ok(success_response(outcome))
}

#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    summary = "Job board",
    description = "Latest run of each job.",
    responses(
        (status = 200, description = "Job runs", body = ApiResponse<Vec<JobRun>>),
    ),
    tag = "jobs"
)]
pub async fn list_jobs(State(state): State<AppState>) -> Json<ApiResponse<Vec<JobRun>>> {
    success_response(state.services.jobs.snapshot())
}
