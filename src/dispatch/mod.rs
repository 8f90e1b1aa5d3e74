/*!
 * # Dispatch API client
 *
 * Thin async client for the OptimoRoute-compatible routing/dispatch API plus the
 * sequential batch runner used to stay under its per-call limits.
 *
 * Every call carries the API key as the `key` query parameter and goes through a
 * shared [`CircuitBreaker`]. Services depend on the [`DispatchApi`] trait so tests
 * can point them at a mock server or a fake.
 */

pub mod batch;
pub mod circuit_breaker;
pub mod types;

pub use batch::{run_in_batches, BatchStats};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot};
pub use types::*;

use crate::config::DispatchConfig;
use crate::errors::ServiceError;
use crate::metrics::{self, names};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, instrument, warn};

#[async_trait]
pub trait DispatchApi: Send + Sync {
    /// Planned routes and stops for one day.
    async fn get_routes(&self, date: NaiveDate) -> Result<RoutesResponse, ServiceError>;

    /// Completion details for up to 500 order numbers.
    async fn get_completion_details(
        &self,
        order_nos: &[String],
    ) -> Result<OrdersEnvelope, ServiceError>;

    /// Full order data for up to 500 order numbers.
    async fn get_orders(&self, order_nos: &[String]) -> Result<OrdersEnvelope, ServiceError>;

    /// One page of orders in a date range. Pass the previous page's `after_tag`
    /// to continue.
    async fn search_orders(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        after_tag: Option<String>,
    ) -> Result<SearchOrdersResponse, ServiceError>;

    fn circuit_snapshot(&self) -> Option<CircuitBreakerSnapshot> {
        None
    }
}

/// reqwest-backed [`DispatchApi`].
#[derive(Clone)]
pub struct DispatchClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    breaker: Arc<CircuitBreaker>,
}

impl DispatchClient {
    pub fn new(config: &DispatchConfig) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .gzip(true)
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("Failed to build dispatch HTTP client: {}", e))
            })?;

        let breaker = CircuitBreaker::new(
            "dispatch",
            CircuitBreakerConfig {
                failure_threshold: config.circuit_breaker_failure_threshold.max(1),
                timeout: std::time::Duration::from_secs(config.circuit_breaker_timeout_secs),
                success_threshold: 1,
            },
        );

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            breaker: Arc::new(breaker),
        })
    }

    fn key(&self) -> Result<&str, ServiceError> {
        self.api_key.as_deref().ok_or_else(|| {
            ServiceError::ServiceUnavailable("dispatch API key is not configured".to_string())
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    /// Sends `request`, rejecting non-2xx responses, and decodes the JSON body.
    async fn send<T>(&self, endpoint: &'static str, request: RequestBuilder) -> Result<T, ServiceError>
    where
        T: DeserializeOwned,
    {
        metrics::increment_counter(names::DISPATCH_CALLS);
        let started = Instant::now();

        let result = self
            .breaker
            .call(|| async move {
                let response = request.send().await.map_err(|e| {
                    ServiceError::ExternalServiceError(format!("{} request failed: {}", endpoint, e))
                })?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ServiceError::ExternalApiError(format!(
                        "{} returned HTTP {}: {}",
                        endpoint,
                        status.as_u16(),
                        body.chars().take(200).collect::<String>()
                    )));
                }

                response.json::<T>().await.map_err(|e| {
                    ServiceError::ExternalApiError(format!(
                        "{} returned an unreadable body: {}",
                        endpoint, e
                    ))
                })
            })
            .await;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::observe_histogram(names::DISPATCH_LATENCY, elapsed_ms);
        match &result {
            Ok(_) => debug!(endpoint, elapsed_ms, "Dispatch call succeeded"),
            Err(e) => {
                metrics::increment_counter(names::DISPATCH_FAILURES);
                error!(endpoint, elapsed_ms, error = %e, "Dispatch call failed");
            }
        }
        result
    }
}

fn require_success(endpoint: &str, success: bool) -> Result<(), ServiceError> {
    if success {
        Ok(())
    } else {
        Err(ServiceError::ExternalApiError(format!(
            "{} reported an unsuccessful operation",
            endpoint
        )))
    }
}

#[async_trait]
impl DispatchApi for DispatchClient {
    #[instrument(skip(self), fields(date = %date))]
    async fn get_routes(&self, date: NaiveDate) -> Result<RoutesResponse, ServiceError> {
        let key = self.key()?;
        let date = date.format("%Y-%m-%d").to_string();
        let request = self
            .http
            .get(self.url("get_routes"))
            .query(&[("key", key), ("date", date.as_str())]);

        let routes: RoutesResponse = self.send("get_routes", request).await?;
        require_success("get_routes", routes.success)?;
        Ok(routes)
    }

    #[instrument(skip(self, order_nos), fields(orders = order_nos.len()))]
    async fn get_completion_details(
        &self,
        order_nos: &[String],
    ) -> Result<OrdersEnvelope, ServiceError> {
        if order_nos.is_empty() {
            return Ok(OrdersEnvelope {
                success: true,
                orders: Vec::new(),
            });
        }
        let key = self.key()?;
        let request = self
            .http
            .post(self.url("get_completion_details"))
            .query(&[("key", key)])
            .json(&OrderRefsRequest::new(order_nos));

        let envelope: OrdersEnvelope = self.send("get_completion_details", request).await?;
        if !envelope.success {
            // Per-order entries still carry their own success flag
            warn!("get_completion_details reported an unsuccessful operation");
        }
        Ok(envelope)
    }

    #[instrument(skip(self, order_nos), fields(orders = order_nos.len()))]
    async fn get_orders(&self, order_nos: &[String]) -> Result<OrdersEnvelope, ServiceError> {
        if order_nos.is_empty() {
            return Ok(OrdersEnvelope {
                success: true,
                orders: Vec::new(),
            });
        }
        let key = self.key()?;
        let request = self
            .http
            .post(self.url("get_orders"))
            .query(&[("key", key)])
            .json(&OrderRefsRequest::new(order_nos));

        let envelope: OrdersEnvelope = self.send("get_orders", request).await?;
        if !envelope.success {
            warn!("get_orders reported an unsuccessful operation");
        }
        Ok(envelope)
    }

    #[instrument(skip(self), fields(from = %from, to = %to))]
    async fn search_orders(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        after_tag: Option<String>,
    ) -> Result<SearchOrdersResponse, ServiceError> {
        let key = self.key()?;
        let body = SearchOrdersRequest {
            date_range: DateRange {
                from: from.format("%Y-%m-%d").to_string(),
                to: to.format("%Y-%m-%d").to_string(),
            },
            include_order_data: true,
            include_schedule_information: true,
            after_tag,
        };
        let request = self
            .http
            .post(self.url("search_orders"))
            .query(&[("key", key)])
            .json(&body);

        let page: SearchOrdersResponse = self.send("search_orders", request).await?;
        require_success("search_orders", page.success)?;
        Ok(page)
    }

    fn circuit_snapshot(&self) -> Option<CircuitBreakerSnapshot> {
        Some(self.breaker.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, key: Option<&str>) -> DispatchClient {
        DispatchClient::new(&DispatchConfig {
            base_url: server.uri(),
            api_key: key.map(str::to_string),
            ..Default::default()
        })
        .unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    #[tokio::test]
    async fn get_routes_sends_key_and_date() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/get_routes"))
            .and(query_param("key", "secret"))
            .and(query_param("date", "2024-03-05"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "routes": [{"driverName": "Kim", "stops": [{"id": "1", "orderNo": "A"}]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let routes = client_for(&server, Some("secret")).get_routes(day()).await.unwrap();
        assert_eq!(routes.order_numbers(), vec!["A"]);
    }

    #[tokio::test]
    async fn unsuccessful_routes_is_an_external_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/get_routes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
            .mount(&server)
            .await;

        let result = client_for(&server, Some("k")).get_routes(day()).await;
        assert_matches!(result, Err(ServiceError::ExternalApiError(_)));
    }

    #[tokio::test]
    async fn non_2xx_is_an_external_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/get_completion_details"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let result = client_for(&server, Some("k"))
            .get_completion_details(&["A".to_string()])
            .await;
        assert_matches!(result, Err(ServiceError::ExternalApiError(msg)) if msg.contains("500"));
    }

    #[tokio::test]
    async fn completion_details_posts_order_refs() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/get_completion_details"))
            .and(query_param("key", "k"))
            .and(body_partial_json(json!({"orders": [{"orderNo": "A"}, {"orderNo": "B"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "orders": [{"orderNo": "A", "success": true, "data": {"status": "success"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let envelope = client_for(&server, Some("k"))
            .get_completion_details(&["A".to_string(), "B".to_string()])
            .await
            .unwrap();
        assert_eq!(envelope.orders.len(), 1);
    }

    #[tokio::test]
    async fn missing_key_fails_fast() {
        let server = MockServer::start().await;
        let result = client_for(&server, None).get_routes(day()).await;
        assert_matches!(result, Err(ServiceError::ServiceUnavailable(_)));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn breaker_opens_after_repeated_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/get_routes"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = DispatchClient::new(&DispatchConfig {
            base_url: server.uri(),
            api_key: Some("k".into()),
            circuit_breaker_failure_threshold: 2,
            ..Default::default()
        })
        .unwrap();

        let _ = client.get_routes(day()).await;
        let _ = client.get_routes(day()).await;
        let result = client.get_routes(day()).await;
        assert_matches!(result, Err(ServiceError::CircuitBreakerOpen));
        assert_eq!(client.circuit_snapshot().unwrap().state, "Open");
    }
}
