#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use fieldops_api::{
    config::AppConfig,
    db,
    dispatch::{DispatchApi, DispatchClient},
    events,
    services::imports::ImportSummary,
    AppState,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::MockServer;

/// Application router backed by a throwaway SQLite file and a mock dispatch API.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub dispatch: MockServer,
    _db_dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Like [`TestApp::new`], letting the caller adjust the config before
    /// services are built.
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let db_dir = TempDir::new().expect("temp dir for test database");
        let db_path = db_dir.path().join("fieldops_test.db");
        let dispatch_server = MockServer::start().await;

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.cors_allow_any_origin = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.dispatch.base_url = dispatch_server.uri();
        cfg.dispatch.api_key = Some("test-key".to_string());
        cfg.dispatch.batch_delay_ms = 0;
        adjust(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = events::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let dispatch: Arc<dyn DispatchApi> =
            Arc::new(DispatchClient::new(&cfg.dispatch).expect("dispatch client for tests"));
        let state = AppState::new(Arc::new(pool), cfg, Some(Arc::new(event_sender)), dispatch);
        let router = fieldops_api::app_router(state.clone());

        Self {
            router,
            state,
            dispatch: dispatch_server,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Imports `orders` straight through the service.
    pub async fn seed_orders(&self, orders: Vec<Value>) -> ImportSummary {
        self.state
            .services
            .imports
            .import_orders(&orders)
            .await
            .expect("seed orders")
    }

    /// Id of the stored work order with `order_no`.
    pub async fn work_order_id(&self, order_no: &str) -> String {
        let response = self
            .request(
                Method::GET,
                &format!("/api/v1/work-orders?order_no={}", order_no),
                None,
            )
            .await;
        let body = response_json(response).await;
        body["data"]["items"][0]["id"]
            .as_str()
            .unwrap_or_else(|| panic!("no work order {} in {}", order_no, body))
            .to_string()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("response body is JSON")
}

/// Search-shaped dispatch order, optionally with its completion attached.
pub fn dispatch_order(order_no: &str, date: &str, driver: &str, location: &str) -> Value {
    json!({
        "data": {
            "orderNo": order_no,
            "date": date,
            "location": { "locationName": location },
            "notes": format!("Service visit for {}", location),
        },
        "scheduleInformation": { "driverName": driver, "driverId": "D-1" }
    })
}

/// Completion entry for a visit on `date` that ran 14:00 to 15:30 UTC.
pub fn completion_entry(order_no: &str, status: &str, date: &str) -> Value {
    json!({
        "orderNo": order_no,
        "success": true,
        "data": {
            "status": status,
            "startTime": { "utcTime": format!("{}T14:00:00Z", date) },
            "endTime": { "utcTime": format!("{}T15:30:00Z", date) },
            "form": {
                "note": "All good",
                "images": [{ "url": format!("https://img.example/{}.jpg", order_no) }]
            }
        }
    })
}

pub fn completed_order(order_no: &str, date: &str, driver: &str, location: &str) -> Value {
    let mut order = dispatch_order(order_no, date, driver, location);
    order["completion_response"] = json!({
        "orders": [completion_entry(order_no, "success", date)]
    });
    order
}
