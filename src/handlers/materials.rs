use super::common::{non_blank, success_response};
use crate::{
    errors::ServiceError,
    services::materials::{MaterialsQuery, MaterialsRequirement},
    ApiResponse, AppState,
};
use axum::{
    extract::{Query, State},
    Json,
};

/// Materials to load for a day's routes
#[utoipa::path(
    get,
    path = "/api/v1/materials",
    summary = "Materials requirement",
    description = "Parses `(qty) TYPE` entries from the notes of every routed order on a date.",
    params(MaterialsQuery),
    responses(
        (status = 200, description = "Materials computed", body = ApiResponse<MaterialsRequirement>),
        (status = 502, description = "Dispatch API failed", body = crate::errors::ErrorResponse),
        (status = 503, description = "Dispatch API unavailable", body = crate::errors::ErrorResponse),
    ),
    tag = "materials"
)]
pub async fn materials_requirement(
    State(state): State<AppState>,
    Query(query): Query<MaterialsQuery>,
) -> Result<Json<ApiResponse<MaterialsRequirement>>, ServiceError> {
    let driver_serial = non_blank(&query.driver_serial);
    let requirement = state
        .services
        .materials
        .requirements_for_date(query.date, driver_serial.as_deref())
        .await?;
    Ok(success_response(requirement))
}
