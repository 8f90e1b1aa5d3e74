/*!
 * # Health Check Module
 *
 * Endpoints for monitoring the service:
 *
 * - Basic health check (`/health`) - cached up/down status
 * - Readiness check (`/health/ready`) - re-checks the database and the dispatch circuit
 * - Liveness check (`/health/live`) - the process is alive
 * - Detailed health check (`/health/details`) - per-component detail
 */

use crate::{db::DbPool, dispatch::DispatchApi};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
    Degraded,
}

impl HealthStatus {
    fn status_code(self) -> StatusCode {
        match self {
            HealthStatus::Up | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Health check detail
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthDetail {
    pub status: HealthStatus,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Overall health information
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub details: BTreeMap<String, HealthDetail>,
}

/// Health check state
#[derive(Clone)]
pub struct HealthState {
    pub db_pool: Arc<DbPool>,
    pub dispatch: Arc<dyn DispatchApi>,
    pub health_cache: Arc<RwLock<HealthInfo>>,
    pub start_time: SystemTime,
}

/// The database is required; an open dispatch circuit only degrades the
/// service since stored work orders stay reviewable.
pub fn overall_status(details: &BTreeMap<String, HealthDetail>) -> HealthStatus {
    if details.values().any(|d| d.status == HealthStatus::Down) {
        HealthStatus::Down
    } else if details.values().any(|d| d.status == HealthStatus::Degraded) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Up
    }
}

impl HealthState {
    pub fn new(db_pool: Arc<DbPool>, dispatch: Arc<dyn DispatchApi>) -> Self {
        Self {
            db_pool,
            dispatch,
            health_cache: Arc::new(RwLock::new(HealthInfo {
                status: HealthStatus::Up,
                version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp: Utc::now(),
                uptime_seconds: 0,
                details: BTreeMap::new(),
            })),
            start_time: SystemTime::now(),
        }
    }

    /// Calculate system uptime
    pub fn uptime(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or(Duration::from_secs(0))
            .as_secs()
    }

    /// Update health status
    pub async fn update_health(&self) {
        let db_detail = match self.db_pool.ping().await {
            Ok(_) => HealthDetail {
                status: HealthStatus::Up,
                message: None,
                timestamp: Utc::now(),
            },
            Err(e) => {
                error!("Database health check failed: {}", e);
                HealthDetail {
                    status: HealthStatus::Down,
                    message: Some("database unreachable".to_string()),
                    timestamp: Utc::now(),
                }
            }
        };

        let dispatch_detail = match self.dispatch.circuit_snapshot() {
            Some(snapshot) if snapshot.state != "Closed" => HealthDetail {
                status: HealthStatus::Degraded,
                message: Some(format!(
                    "circuit {} ({} rejected calls)",
                    snapshot.state, snapshot.rejected_calls
                )),
                timestamp: Utc::now(),
            },
            _ => HealthDetail {
                status: HealthStatus::Up,
                message: None,
                timestamp: Utc::now(),
            },
        };

        let mut health = self.health_cache.write().await;
        health.timestamp = Utc::now();
        health.uptime_seconds = self.uptime();
        health.details.insert("database".to_string(), db_detail);
        health.details.insert("dispatch".to_string(), dispatch_detail);
        health.status = overall_status(&health.details);
    }
}

/// Returns build and version information
pub async fn version_info() -> impl IntoResponse {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "commit": option_env!("GIT_HASH").unwrap_or("unknown"),
    }))
}

/// Basic health check endpoint
pub async fn health_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    debug!("Health check endpoint called");
    let health = state.health_cache.read().await;

    (
        health.status.status_code(),
        Json(json!({
            "status": health.status,
            "version": health.version,
            "timestamp": health.timestamp,
        })),
    )
}

/// Readiness check endpoint
pub async fn readiness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    state.update_health().await;
    let health = state.health_cache.read().await;

    (
        health.status.status_code(),
        Json(json!({
            "ready": health.status != HealthStatus::Down,
            "status": health.status,
            "timestamp": health.timestamp,
        })),
    )
}

/// Liveness check endpoint
pub async fn liveness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "alive": true,
            "uptime_seconds": state.uptime(),
            "timestamp": Utc::now(),
        })),
    )
}

/// Detailed health check endpoint
pub async fn detailed_health(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    state.update_health().await;
    let health = state.health_cache.read().await;

    (health.status.status_code(), Json(health.clone()))
}

/// Run periodic health checks
pub async fn run_health_checker(state: Arc<HealthState>, every: Duration) {
    let mut interval = tokio::time::interval(every);

    loop {
        interval.tick().await;
        state.update_health().await;

        let health = state.health_cache.read().await;
        if health.status != HealthStatus::Up {
            warn!("System health is not optimal: {:?}", health.status);

            for (name, detail) in &health.details {
                if detail.status != HealthStatus::Up {
                    warn!("Component {name} is not healthy: {:?}", detail.status);
                }
            }
        }
    }
}

/// Creates router with health check endpoints (with HealthState)
pub fn health_routes_with_state(db_pool: Arc<DbPool>, dispatch: Arc<dyn DispatchApi>) -> Router {
    let health_state = Arc::new(HealthState::new(db_pool, dispatch));

    tokio::spawn(run_health_checker(
        health_state.clone(),
        Duration::from_secs(30),
    ));

    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
        .route("/details", get(detailed_health))
        .route("/version", get(version_info))
        .with_state(health_state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(status: HealthStatus) -> HealthDetail {
        HealthDetail {
            status,
            message: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn any_down_component_takes_the_service_down() {
        let mut details = BTreeMap::new();
        details.insert("database".to_string(), detail(HealthStatus::Down));
        details.insert("dispatch".to_string(), detail(HealthStatus::Up));
        assert_eq!(overall_status(&details), HealthStatus::Down);
    }

    #[test]
    fn open_circuit_only_degrades() {
        let mut details = BTreeMap::new();
        details.insert("database".to_string(), detail(HealthStatus::Up));
        details.insert("dispatch".to_string(), detail(HealthStatus::Degraded));
        assert_eq!(overall_status(&details), HealthStatus::Degraded);
        assert_eq!(HealthStatus::Degraded.status_code(), StatusCode::OK);
    }
}
