use super::common::success_response;
use crate::{
    entities::attendance_count::Model as AttendanceCount,
    errors::ServiceError,
    services::attendance::{AttendanceQuery, GroupCount, RecordCountsRequest},
    ApiResponse, AppState,
};
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AttendanceCounts {
    pub date: NaiveDate,
    /// Keyed by group id
    pub counts: BTreeMap<String, GroupCount>,
}

#[utoipa::path(
    get,
    path = "/api/v1/attendance/counts",
    summary = "Attendance counts",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Counts per group", body = ApiResponse<AttendanceCounts>),
    ),
    tag = "attendance"
)]
pub async fn get_counts(
    State(state): State<AppState>,
    Query(query): Query<AttendanceQuery>,
) -> Result<Json<ApiResponse<AttendanceCounts>>, ServiceError> {
    let groups = query.group_ids();
    let counts = state
        .services
        .attendance
        .counts_for_date(query.date, &groups)
        .await?;
    Ok(success_response(AttendanceCounts {
        date: query.date,
        counts,
    }))
}

#[utoipa::path(
    put,
    path = "/api/v1/attendance/counts",
    summary = "Record attendance counts",
    request_body = RecordCountsRequest,
    responses(
        (status = 200, description = "Counts stored", body = ApiResponse<AttendanceCount>),
        (status = 400, description = "Completed exceeds total", body = crate::errors::ErrorResponse),
    ),
    tag = "attendance"
)]
pub async fn record_counts(
    State(state): State<AppState>,
    Json(payload): Json<RecordCountsRequest>,
) -> Result<Json<ApiResponse<AttendanceCount>>, ServiceError> {
    let stored = state.services.attendance.record_counts(payload).await?;
    Ok(success_response(stored))
}
