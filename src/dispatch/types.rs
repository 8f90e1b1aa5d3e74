//! Wire types for the OptimoRoute-compatible dispatch API.
//!
//! Order and completion entries are kept as raw `serde_json::Value` because they
//! are stored verbatim and later read through [`crate::normalize`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stops with this order number are depot start/end markers.
pub const PLACEHOLDER_ORDER_NO: &str = "-";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutesResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(default)]
    pub driver_serial: Option<String>,
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub stops: Vec<RouteStop>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStop {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub order_no: Option<String>,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub scheduled_at_dt: Option<String>,
}

impl RouteStop {
    /// Order number of a real customer stop; `None` for depot markers and
    /// stops without an id.
    pub fn order_no(&self) -> Option<&str> {
        self.id.as_ref()?;
        match self.order_no.as_deref() {
            Some(PLACEHOLDER_ORDER_NO) | None => None,
            Some(no) if no.trim().is_empty() => None,
            Some(no) => Some(no),
        }
    }
}

impl RoutesResponse {
    /// Order numbers of every real stop, in route order.
    pub fn order_numbers(&self) -> Vec<String> {
        self.routes
            .iter()
            .flat_map(|route| route.stops.iter())
            .filter_map(|stop| stop.order_no().map(str::to_string))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRef {
    pub order_no: String,
}

/// Body for `get_completion_details` and `get_orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRefsRequest {
    pub orders: Vec<OrderRef>,
}

impl OrderRefsRequest {
    pub fn new(order_nos: &[String]) -> Self {
        Self {
            orders: order_nos
                .iter()
                .map(|no| OrderRef {
                    order_no: no.clone(),
                })
                .collect(),
        }
    }
}

/// Response of `get_completion_details` and `get_orders`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrdersEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub orders: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOrdersRequest {
    pub date_range: DateRange,
    pub include_order_data: bool,
    pub include_schedule_information: bool,
    #[serde(rename = "after_tag", skip_serializing_if = "Option::is_none")]
    pub after_tag: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOrdersResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub orders: Vec<Value>,
    #[serde(default)]
    pub after_tag: Option<String>,
}

/// Key used to join a completion entry back to its order: `orderNo`, else `id`.
pub fn completion_key(entry: &Value) -> Option<String> {
    crate::normalize::first_string(entry, &["/orderNo", "/id"])
}

/// A completion entry counts only when the API marked it successful and sent data.
pub fn completion_is_usable(entry: &Value) -> bool {
    entry.get("success").and_then(Value::as_bool).unwrap_or(false)
        && entry.get("data").map(|d| !d.is_null()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn placeholder_and_idless_stops_are_skipped() {
        let routes: RoutesResponse = serde_json::from_value(json!({
            "success": true,
            "routes": [{
                "driverSerial": "7",
                "driverName": "Sam",
                "stops": [
                    {"id": "s1", "orderNo": "-"},
                    {"id": "s2", "orderNo": "A-1", "locationName": "Shop #3"},
                    {"orderNo": "A-2"},
                    {"id": "s4", "orderNo": "A-3"}
                ]
            }]
        }))
        .unwrap();

        assert_eq!(routes.order_numbers(), vec!["A-1", "A-3"]);
        assert_eq!(routes.routes[0].driver_serial.as_deref(), Some("7"));
    }

    #[test]
    fn search_request_uses_camel_case_with_after_tag() {
        let body = serde_json::to_value(SearchOrdersRequest {
            date_range: DateRange {
                from: "2024-01-01".into(),
                to: "2024-01-02".into(),
            },
            include_order_data: true,
            include_schedule_information: true,
            after_tag: Some("t1".into()),
        })
        .unwrap();

        assert_eq!(body["dateRange"]["from"], "2024-01-01");
        assert_eq!(body["includeOrderData"], true);
        assert_eq!(body["includeScheduleInformation"], true);
        assert_eq!(body["after_tag"], "t1");
    }

    #[test]
    fn completion_usability() {
        assert!(completion_is_usable(&json!({"success": true, "data": {}})));
        assert!(!completion_is_usable(&json!({"success": false, "data": {}})));
        assert!(!completion_is_usable(&json!({"success": true})));
        assert_eq!(
            completion_key(&json!({"id": "x9"})).as_deref(),
            Some("x9")
        );
    }
}
