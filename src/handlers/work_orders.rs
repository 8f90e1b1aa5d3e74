use super::common::{non_blank, parse_status_filter, success_response};
use crate::{
    errors::ServiceError,
    services::work_orders::{
        SortDirection, SortField, StatusCounts, UpdateNotesRequest, UpdateStatusRequest,
        WorkOrderDetail, WorkOrderFilter, WorkOrderSort, WorkOrderView,
    },
    ApiResponse, AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Query string for the work order list and its status counts.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListWorkOrdersQuery {
    /// A status, or `all`. `flagged` includes `flagged_followup`.
    pub status: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub driver: Option<String>,
    pub location: Option<String>,
    pub order_no: Option<String>,
    pub dispatch_status: Option<String>,
    /// Matches order number, driver or location
    pub search: Option<String>,
    pub sort: Option<SortField>,
    pub direction: Option<SortDirection>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl ListWorkOrdersQuery {
    pub fn filter(&self) -> Result<WorkOrderFilter, ServiceError> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(ServiceError::BadRequest(
                    "date_from must not be after date_to".to_string(),
                ));
            }
        }
        Ok(WorkOrderFilter {
            status: parse_status_filter(&self.status)?,
            date_from: self.date_from,
            date_to: self.date_to,
            driver: non_blank(&self.driver),
            location: non_blank(&self.location),
            order_no: non_blank(&self.order_no),
            dispatch_status: non_blank(&self.dispatch_status),
            search: non_blank(&self.search),
        })
    }

    pub fn sort(&self) -> WorkOrderSort {
        WorkOrderSort {
            field: self.sort.unwrap_or_default(),
            direction: self.direction.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct FlaggedCount {
    pub count: u64,
}

/// List work orders
#[utoipa::path(
    get,
    path = "/api/v1/work-orders",
    summary = "List work orders",
    description = "Filtered, sorted and paginated work orders. Defaults to newest end time first.",
    params(ListWorkOrdersQuery),
    responses(
        (status = 200, description = "Work orders retrieved", body = ApiResponse<PaginatedResponse<WorkOrderView>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "work-orders"
)]
pub async fn list_work_orders(
    State(state): State<AppState>,
    Query(query): Query<ListWorkOrdersQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<WorkOrderView>>>, ServiceError> {
    let filter = query.filter()?;
    let page = state
        .services
        .work_orders
        .list_work_orders(&filter, query.sort(), query.page, query.limit)
        .await?;
    Ok(success_response(page))
}

/// Counts per status under the current filters
#[utoipa::path(
    get,
    path = "/api/v1/work-orders/status-counts",
    summary = "Status counts",
    description = "Per-status totals using every list filter except status.",
    params(ListWorkOrdersQuery),
    responses(
        (status = 200, description = "Counts computed", body = ApiResponse<StatusCounts>),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse),
    ),
    tag = "work-orders"
)]
pub async fn status_counts(
    State(state): State<AppState>,
    Query(query): Query<ListWorkOrdersQuery>,
) -> Result<Json<ApiResponse<StatusCounts>>, ServiceError> {
    let filter = query.filter()?;
    let counts = state.services.work_orders.status_counts(&filter).await?;
    Ok(success_response(counts))
}

#[utoipa::path(
    get,
    path = "/api/v1/work-orders/flagged-count",
    summary = "Flagged badge count",
    responses(
        (status = 200, description = "Flagged and follow-up work orders", body = ApiResponse<FlaggedCount>),
    ),
    tag = "work-orders"
)]
pub async fn flagged_count(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<FlaggedCount>>, ServiceError> {
    let count = state.services.work_orders.flagged_count().await?;
    Ok(success_response(FlaggedCount { count }))
}

/// Get a work order with its raw dispatch payloads
#[utoipa::path(
    get,
    path = "/api/v1/work-orders/{id}",
    summary = "Get work order",
    params(("id" = Uuid, Path, description = "Work order ID")),
    responses(
        (status = 200, description = "Work order retrieved", body = ApiResponse<WorkOrderDetail>),
        (status = 404, description = "Work order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "work-orders"
)]
pub async fn get_work_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<WorkOrderDetail>>, ServiceError> {
    let detail = state.services.work_orders.get_work_order(id).await?;
    Ok(success_response(detail))
}

/// Change the review status
#[utoipa::path(
    put,
    path = "/api/v1/work-orders/{id}/status",
    summary = "Update work order status",
    description = "Moves the work order to a new status and records who made the change.",
    params(("id" = Uuid, Path, description = "Work order ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<WorkOrderView>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Work order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Transition not allowed", body = crate::errors::ErrorResponse),
    ),
    tag = "work-orders"
)]
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<WorkOrderView>>, ServiceError> {
    let view = state.services.work_orders.update_status(id, payload).await?;
    Ok(success_response(view))
}

#[utoipa::path(
    put,
    path = "/api/v1/work-orders/{id}/notes",
    summary = "Update work order notes",
    params(("id" = Uuid, Path, description = "Work order ID")),
    request_body = UpdateNotesRequest,
    responses(
        (status = 200, description = "Notes updated", body = ApiResponse<WorkOrderView>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Work order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "work-orders"
)]
pub async fn update_notes(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateNotesRequest>,
) -> Result<Json<ApiResponse<WorkOrderView>>, ServiceError> {
    let view = state.services.work_orders.update_notes(id, payload).await?;
    Ok(success_response(view))
}

#[utoipa::path(
    delete,
    path = "/api/v1/work-orders/{id}",
    summary = "Delete work order",
    params(("id" = Uuid, Path, description = "Work order ID")),
    responses(
        (status = 204, description = "Work order deleted"),
        (status = 404, description = "Work order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "work-orders"
)]
pub async fn delete_work_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.work_orders.delete_work_order(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::WorkOrderStatus;
    use assert_matches::assert_matches;

    #[test]
    fn query_builds_trimmed_filter() {
        let query = ListWorkOrdersQuery {
            status: Some("flagged".into()),
            driver: Some("  ana ".into()),
            location: Some("".into()),
            ..Default::default()
        };
        let filter = query.filter().unwrap();
        assert_eq!(filter.status, Some(WorkOrderStatus::Flagged));
        assert_eq!(filter.driver.as_deref(), Some("ana"));
        assert_eq!(filter.location, None);
    }

    #[test]
    fn inverted_date_range_is_rejected() {
        let query = ListWorkOrdersQuery {
            date_from: NaiveDate::from_ymd_opt(2024, 3, 9),
            date_to: NaiveDate::from_ymd_opt(2024, 3, 1),
            ..Default::default()
        };
        assert_matches!(query.filter(), Err(ServiceError::BadRequest(_)));
    }

    #[test]
    fn sort_defaults_to_end_time_desc() {
        let sort = ListWorkOrdersQuery::default().sort();
        assert_eq!(sort.field, SortField::EndTime);
        assert_eq!(sort.direction, SortDirection::Desc);
    }
}
