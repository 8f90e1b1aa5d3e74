use super::common::success_response;
use crate::{
    errors::ServiceError,
    services::dispatch_sync::{OrdersWithCompletion, SearchWithCompletionRequest},
    ApiResponse, AppState,
};
use axum::{extract::State, Json};

/// One search page with completion details merged in
#[utoipa::path(
    post,
    path = "/api/v1/dispatch/orders-with-completion",
    summary = "Search orders with completion details",
    description = "Searches dispatch orders in a date range and attaches each order's completion details. \
                   Pass the returned after_tag to fetch the next page.",
    request_body = SearchWithCompletionRequest,
    responses(
        (status = 200, description = "Search page", body = ApiResponse<OrdersWithCompletion>),
        (status = 400, description = "Invalid date range", body = crate::errors::ErrorResponse),
        (status = 502, description = "Dispatch API failed", body = crate::errors::ErrorResponse),
        (status = 503, description = "Dispatch API unavailable", body = crate::errors::ErrorResponse),
    ),
    tag = "dispatch"
)]
pub async fn orders_with_completion(
    State(state): State<AppState>,
    Json(payload): Json<SearchWithCompletionRequest>,
) -> Result<Json<ApiResponse<OrdersWithCompletion>>, ServiceError> {
    let page = state
        .services
        .dispatch_sync
        .search_with_completion(
            payload.date_from,
            payload.date_to,
            payload.after_tag,
            payload.previously_collected,
        )
        .await?;
    Ok(success_response(page))
}
