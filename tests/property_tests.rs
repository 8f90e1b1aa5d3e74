//! Property-based tests for payload normalization, pagination and the status
//! workflow.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use fieldops_api::{
    entities::WorkOrderStatus,
    normalize::{
        extract_driver_name, extract_order_no, format_duration, parse_service_date,
        NormalizedOrder, UNKNOWN_DRIVER,
    },
    services::{
        reports::customer_group,
        work_orders::{total_pages, PageRequest},
    },
};
use proptest::prelude::*;
use serde_json::{json, Value};

fn order_number_strategy() -> impl Strategy<Value = String> {
    "[A-Z]{1,4}-[0-9]{1,8}"
}

fn status_strategy() -> impl Strategy<Value = WorkOrderStatus> {
    prop::sample::select(WorkOrderStatus::ALL.to_vec())
}

/// Wraps `order_no` in each of the payload shapes the importer accepts.
fn shaped(order_no: &str, shape: u8) -> Value {
    match shape % 5 {
        0 => json!({ "order_no": order_no }),
        1 => json!({ "orderNo": order_no }),
        2 => json!({ "data": { "orderNo": order_no } }),
        3 => json!({ "searchResponse": { "data": { "orderNo": order_no } } }),
        _ => json!({ "search_response": { "data": { "orderNo": order_no } } }),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn order_number_is_found_in_every_shape(order_no in order_number_strategy(), shape in 0u8..5) {
        let payload = shaped(&order_no, shape);
        prop_assert_eq!(extract_order_no(&payload), Some(order_no.clone()));

        let normalized = NormalizedOrder::from_raw(&payload).unwrap();
        prop_assert_eq!(normalized.order_no, order_no);
    }

    #[test]
    fn blank_driver_names_fall_back(spaces in "[ \t]{0,4}") {
        let payload = json!({ "order_no": "A-1", "driver_name": spaces });
        prop_assert_eq!(extract_driver_name(&payload), UNKNOWN_DRIVER);
    }

    #[test]
    fn service_date_survives_a_time_suffix(days in 0i64..20_000, hour in 0u32..24) {
        let date = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap() + Duration::days(days);
        let raw = format!("{}T{:02}:15:00Z", date.format("%Y-%m-%d"), hour);
        prop_assert_eq!(parse_service_date(&raw), Some(date));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn page_request_stays_in_bounds(
        page in proptest::option::of(0u64..10_000),
        limit in proptest::option::of(0u64..10_000),
        max in 1u64..500,
    ) {
        let default = max.min(10);
        let request = PageRequest::new(page, limit, default, max);
        prop_assert!(request.page >= 1);
        prop_assert!(request.limit >= 1 && request.limit <= max);
    }

    #[test]
    fn total_pages_covers_every_item(total in 0u64..100_000, limit in 1u64..500) {
        let pages = total_pages(total, limit);
        prop_assert!(pages >= 1);
        prop_assert!(pages * limit >= total);
        prop_assert!(total == 0 || (pages - 1) * limit < total);
    }

    #[test]
    fn duration_text_matches_minutes(minutes in 0i64..10_000) {
        let start = Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap();
        let text = format_duration(start, start + Duration::minutes(minutes)).unwrap();
        prop_assert_eq!(text, format!("{}h {}m", minutes / 60, minutes % 60));
    }
}

proptest! {
    #[test]
    fn reapplying_a_status_is_always_allowed(status in status_strategy()) {
        prop_assert!(status.can_transition_to(status));
    }

    #[test]
    fn status_text_round_trips(status in status_strategy()) {
        let text = status.to_string();
        prop_assert_eq!(text.parse::<WorkOrderStatus>().unwrap(), status);
        prop_assert!(!status.label().contains('_'));
    }

    #[test]
    fn customer_group_is_text_before_the_hash(name in "[A-Za-z][A-Za-z ]{0,19}", store in 0u32..10_000) {
        let group = customer_group(&format!("{} #{}", name, store));
        prop_assert_eq!(group, Some(name.trim().to_string()));
    }
}

#[test]
fn payloads_without_an_order_number_are_rejected() {
    for payload in [json!({}), json!({"data": {"notes": "x"}}), json!("A-1"), json!([1])] {
        assert!(NormalizedOrder::from_raw(&payload).is_err());
    }
}
