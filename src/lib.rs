//! FieldOps API Library
//!
//! Work order review, dispatch API imports and the supporting reports,
//! materials and attendance services behind the FieldOps dashboard.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod dispatch;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod middleware_helpers;
pub mod migrator;
pub mod normalize;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use utoipa::ToSchema;

use crate::{db::DbPool, dispatch::DispatchApi, events::EventSender};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: config::AppConfig,
    pub event_sender: Option<Arc<EventSender>>,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DbPool>,
        config: config::AppConfig,
        event_sender: Option<Arc<EventSender>>,
        dispatch: Arc<dyn DispatchApi>,
    ) -> Self {
        let services =
            handlers::AppServices::new(db.clone(), event_sender.clone(), dispatch, &config);
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    use handlers::{attendance, dispatch, jobs, materials, reports, work_orders};

    Router::new()
        // Work order review
        .route("/work-orders", get(work_orders::list_work_orders))
        .route("/work-orders/status-counts", get(work_orders::status_counts))
        .route("/work-orders/flagged-count", get(work_orders::flagged_count))
        .route(
            "/work-orders/:id",
            get(work_orders::get_work_order).delete(work_orders::delete_work_order),
        )
        .route("/work-orders/:id/status", put(work_orders::update_status))
        .route("/work-orders/:id/notes", put(work_orders::update_notes))
        // Jobs
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/import-bulk-orders", post(jobs::import_bulk_orders))
        .route("/jobs/fetch-reports", post(jobs::fetch_reports))
        .route("/jobs/auto-import", post(jobs::auto_import))
        // Dispatch search
        .route(
            "/dispatch/orders-with-completion",
            post(dispatch::orders_with_completion),
        )
        // Reports, materials, attendance
        .route("/reports", get(reports::list_reports))
        .route("/materials", get(materials::materials_requirement))
        .route(
            "/attendance/counts",
            get(attendance::get_counts).put(attendance::record_counts),
        )
}

/// Full application router without CORS, which the server binary adds from
/// configuration.
pub fn app_router(state: AppState) -> Router {
    let health = health::health_routes_with_state(
        state.db.clone(),
        state.services.dispatch.clone(),
    );

    Router::<AppState>::new()
        .route("/", get(|| async { "fieldops-api up" }))
        .route(
            "/metrics",
            get(|| async move {
                match metrics::metrics_handler().await {
                    Ok(body) => (StatusCode::OK, body),
                    Err(_) => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        String::from("metrics error"),
                    ),
                }
            }),
        )
        .route(
            "/metrics/json",
            get(|| async move { Json(metrics::metrics_json_handler().await) }),
        )
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
        .nest("/health", health)
        .merge(openapi::swagger_ui())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
}
