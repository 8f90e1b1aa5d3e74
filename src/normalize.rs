/*!
 * # Payload normalization
 *
 * The dispatch API, the bulk importer and older stored rows all hand us orders in
 * slightly different shapes: camelCase vs snake_case keys, data nested under
 * `searchResponse` or `search_response`, completion details inline or wrapped in
 * an `orders` array. Everything here is a pure function over `serde_json::Value`
 * that picks the first usable value from a fixed list of JSON pointers.
 */

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

pub const UNKNOWN_DRIVER: &str = "Unknown Driver";
pub const UNKNOWN_LOCATION: &str = "Unknown Location";

const ORDER_NO_PATHS: &[&str] = &[
    "/order_no",
    "/orderNo",
    "/data/orderNo",
    "/searchResponse/data/orderNo",
    "/search_response/data/orderNo",
    "/completionDetails/orderNo",
];

const SERVICE_DATE_PATHS: &[&str] = &[
    "/service_date",
    "/data/date",
    "/searchResponse/data/date",
    "/search_response/data/date",
];

const DRIVER_NAME_PATHS: &[&str] = &[
    "/driver_name",
    "/driver/name",
    "/scheduleInformation/driverName",
    "/searchResponse/scheduleInformation/driverName",
    "/search_response/scheduleInformation/driverName",
    "/searchResponse/data/driver/name",
    "/search_response/data/driver/name",
];

const LOCATION_NAME_PATHS: &[&str] = &[
    "/location_name",
    "/location/name",
    "/location/locationName",
    "/data/location/name",
    "/data/location/locationName",
    "/searchResponse/data/location/name",
    "/searchResponse/data/location/locationName",
    "/search_response/data/location/name",
    "/search_response/data/location/locationName",
];

const END_TIME_PATHS: &[&str] = &[
    "/end_time",
    "/completionDetails/data/endTime/utcTime",
    "/completionDetails/data/endTime/localTime",
    "/completion_response/orders/0/data/endTime/utcTime",
    "/completion_response/orders/0/data/endTime/localTime",
];

const DISPATCH_STATUS_PATHS: &[&str] = &[
    "/completionDetails/data/status",
    "/completion_response/orders/0/data/status",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Order payload must be a JSON object")]
    NotAnObject,
    #[error("Order has no order number")]
    MissingOrderNo,
}

/// Returns the first pointer that resolves to a non-blank string (numbers are
/// accepted and rendered as text).
pub fn first_string(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|pointer| string_at(value, pointer))
}

fn string_at(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_null<'a>(value: &'a Value, pointer: &str) -> Option<&'a Value> {
    value.pointer(pointer).filter(|v| !v.is_null())
}

pub fn extract_order_no(order: &Value) -> Option<String> {
    first_string(order, ORDER_NO_PATHS)
}

pub fn extract_service_date(order: &Value) -> Option<NaiveDate> {
    SERVICE_DATE_PATHS
        .iter()
        .filter_map(|pointer| string_at(order, pointer))
        .find_map(|raw| parse_service_date(&raw))
}

pub fn extract_driver_name(order: &Value) -> String {
    first_string(order, DRIVER_NAME_PATHS).unwrap_or_else(|| UNKNOWN_DRIVER.to_string())
}

pub fn extract_location_name(order: &Value) -> String {
    first_string(order, LOCATION_NAME_PATHS).unwrap_or_else(|| UNKNOWN_LOCATION.to_string())
}

pub fn extract_end_time(order: &Value) -> Option<DateTime<Utc>> {
    END_TIME_PATHS
        .iter()
        .filter_map(|pointer| string_at(order, pointer))
        .find_map(|raw| parse_timestamp(&raw))
}

pub fn extract_dispatch_status(order: &Value) -> Option<String> {
    first_string(order, DISPATCH_STATUS_PATHS)
}

/// Accepts `YYYY-MM-DD` or anything that starts with one (RFC 3339 timestamps).
pub fn parse_service_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            raw.get(..10)
                .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        })
}

/// RFC 3339, or a naive date-time which is taken to be UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Column values derived from one raw order, ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedOrder {
    pub order_no: String,
    pub service_date: Option<NaiveDate>,
    pub driver_name: String,
    pub location_name: String,
    pub end_time: Option<DateTime<Utc>>,
    pub dispatch_status: Option<String>,
    pub search_response: Value,
    pub completion_response: Option<Value>,
}

impl NormalizedOrder {
    pub fn from_raw(order: &Value) -> Result<Self, NormalizeError> {
        if !order.is_object() {
            return Err(NormalizeError::NotAnObject);
        }
        let order_no = extract_order_no(order).ok_or(NormalizeError::MissingOrderNo)?;

        let search_response = non_null(order, "/search_response")
            .cloned()
            .unwrap_or_else(|| order.clone());
        let completion_response = non_null(order, "/completion_response")
            .or_else(|| non_null(order, "/completionDetails"))
            .cloned();

        Ok(Self {
            order_no,
            service_date: extract_service_date(order),
            driver_name: extract_driver_name(order),
            location_name: extract_location_name(order),
            end_time: extract_end_time(order),
            dispatch_status: extract_dispatch_status(order),
            search_response,
            completion_response,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DriverRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

/// Fields read out of a stored `search_response`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchView {
    pub service_notes: Option<String>,
    pub additional_notes: Option<String>,
    pub location: Option<Value>,
    pub driver: Option<DriverRef>,
}

impl SearchView {
    pub fn from_search(search: &Value) -> Self {
        let driver = first_string(search, &["/scheduleInformation/driverName"]).map(|name| {
            DriverRef {
                id: first_string(search, &["/scheduleInformation/driverId"]),
                name,
            }
        });

        Self {
            service_notes: first_string(search, &["/data/notes"]),
            additional_notes: first_string(search, &["/data/customField1"]),
            location: non_null(search, "/data/location").cloned(),
            driver,
        }
    }
}

/// Fields read out of a stored `completion_response` (`{orders:[entry]}`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionView {
    pub tech_notes: Option<String>,
    pub images: Vec<String>,
    pub signature_url: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl CompletionView {
    pub fn from_completion(completion: Option<&Value>) -> Self {
        let Some(entry) = completion.and_then(|c| non_null(c, "/orders/0/data")) else {
            return Self::default();
        };

        let images = entry
            .pointer("/form/images")
            .and_then(Value::as_array)
            .map(|images| {
                images
                    .iter()
                    .filter_map(|img| string_at(img, "/url"))
                    .collect()
            })
            .unwrap_or_default();

        let time = |which: &str| {
            string_at(entry, &format!("/{which}/utcTime"))
                .or_else(|| string_at(entry, &format!("/{which}/localTime")))
                .and_then(|raw| parse_timestamp(&raw))
        };

        Self {
            tech_notes: first_string(entry, &["/form/note"]),
            images,
            signature_url: first_string(entry, &["/form/signature/url"]),
            start_time: time("startTime"),
            end_time: time("endTime"),
        }
    }

    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }
}

/// `"Xh Ym"` for the whole minutes between `start` and `end`.
pub fn format_duration(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<String> {
    let minutes = (end - start).num_minutes();
    if minutes < 0 {
        return None;
    }
    Some(format!("{}h {}m", minutes / 60, minutes % 60))
}

/// The most meaningful date for display: completion end, completion start,
/// service date, then import time.
pub fn best_date(
    completion: &CompletionView,
    service_date: Option<NaiveDate>,
    imported_at: DateTime<Utc>,
) -> DateTime<Utc> {
    completion
        .end_time
        .or(completion.start_time)
        .or_else(|| {
            service_date
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
        .unwrap_or(imported_at)
}
