mod common;

use axum::http::{Method, StatusCode};
use common::{completion_entry, response_json, TestApp};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

fn routes_body() -> Value {
    json!({
        "success": true,
        "routes": [
            {
                "driverSerial": "11",
                "driverName": "Kim Ode",
                "stops": [
                    { "id": "depot", "orderNo": "-" },
                    {
                        "id": "s1",
                        "orderNo": "R-10",
                        "locationName": "Acme Dental #4",
                        "scheduledAtDt": "2024-06-03 09:00:00"
                    },
                    {
                        "id": "s2",
                        "orderNo": "R-11",
                        "locationName": "City Library",
                        "scheduledAtDt": "2024-06-03 11:00:00"
                    }
                ]
            },
            {
                "driverSerial": "12",
                "driverName": "Lee Ward",
                "stops": [
                    { "orderNo": "R-99", "locationName": "Unassigned" },
                    {
                        "id": "s3",
                        "orderNo": "R-12",
                        "locationName": "Acme Dental #9",
                        "scheduledAtDt": "2024-06-03 10:00:00"
                    }
                ]
            }
        ]
    })
}

async fn mount_routes(app: &TestApp) {
    Mock::given(method("GET"))
        .and(path("/get_routes"))
        .and(query_param("date", "2024-06-03"))
        .respond_with(ResponseTemplate::new(200).set_body_json(routes_body()))
        .mount(&app.dispatch)
        .await;
}

#[tokio::test]
async fn fetch_reports_upserts_one_row_per_stop() {
    let app = TestApp::new().await;
    mount_routes(&app).await;
    Mock::given(method("POST"))
        .and(path("/get_completion_details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "orders": [completion_entry("R-10", "success", "2024-06-03")]
        })))
        .mount(&app.dispatch)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/jobs/fetch-reports",
            Some(json!({"date": "2024-06-03"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = response_json(response).await;
    assert_eq!(outcome["data"]["updated"], 3);
    assert_eq!(outcome["data"]["message"], "Successfully updated 3 reports");

    let reports = response_json(
        app.request(Method::GET, "/api/v1/reports?date=2024-06-03", None)
            .await,
    )
    .await;
    let rows = reports["data"].as_array().unwrap();
    let order_nos: Vec<&str> = rows.iter().map(|r| r["order_no"].as_str().unwrap()).collect();
    assert_eq!(order_nos, vec!["R-10", "R-12", "R-11"]);

    assert_eq!(rows[0]["status"], "success");
    assert_eq!(rows[0]["end_time"], "2024-06-03T15:30:00Z");
    assert_eq!(rows[0]["cust_group"], "Acme Dental");
    assert_eq!(rows[0]["tech_name"], "Kim Ode");
    assert_eq!(rows[0]["dispatch_status"], "Planned");
    assert_eq!(rows[1]["status"], "Scheduled");
    assert_eq!(rows[1]["tech_name"], "Lee Ward");
    assert!(rows[2]["cust_group"].is_null());
}

#[tokio::test]
async fn second_fetch_updates_rows_in_place() {
    let app = TestApp::new().await;
    mount_routes(&app).await;
    Mock::given(method("POST"))
        .and(path("/get_completion_details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "orders": []
        })))
        .up_to_n_times(1)
        .mount(&app.dispatch)
        .await;
    Mock::given(method("POST"))
        .and(path("/get_completion_details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "orders": [completion_entry("R-11", "failed", "2024-06-03")]
        })))
        .mount(&app.dispatch)
        .await;

    let reports = app.state.services.reports.clone();
    let date = chrono::NaiveDate::from_ymd_opt(2024, 6, 3);
    reports.fetch_reports(date).await.unwrap();
    reports.fetch_reports(date).await.unwrap();

    let failed = response_json(
        app.request(
            Method::GET,
            "/api/v1/reports?date=2024-06-03&status=failed",
            None,
        )
        .await,
    )
    .await;
    assert_eq!(failed["data"].as_array().unwrap().len(), 1);
    assert_eq!(failed["data"][0]["order_no"], "R-11");

    let all = response_json(app.request(Method::GET, "/api/v1/reports", None).await).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn empty_route_day_reports_nothing_to_update() {
    let app = TestApp::new().await;
    Mock::given(method("GET"))
        .and(path("/get_routes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "routes": []
        })))
        .mount(&app.dispatch)
        .await;

    let outcome = response_json(
        app.request(
            Method::POST,
            "/api/v1/jobs/fetch-reports",
            Some(json!({"date": "2024-06-04"})),
        )
        .await,
    )
    .await;
    assert_eq!(outcome["data"]["updated"], 0);
    assert_eq!(outcome["data"]["message"], "No reports to update");
}

#[tokio::test]
async fn materials_sum_quantities_from_order_notes() {
    let app = TestApp::new().await;
    mount_routes(&app).await;
    Mock::given(method("POST"))
        .and(path("/get_orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "orders": [
                { "data": { "orderNo": "R-10", "notes": "(2) FREEZER, (0) COOLER, (1) G2063B" } },
                { "data": { "orderNo": "R-11", "notes": "(3) FREEZER" } },
                { "data": { "orderNo": "R-12" } }
            ]
        })))
        .mount(&app.dispatch)
        .await;

    let response = app
        .request(Method::GET, "/api/v1/materials?date=2024-06-03", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let requirement = &body["data"];

    assert_eq!(requirement["technician_name"], "Multiple Drivers");
    assert_eq!(requirement["order_count"], 3);
    assert_eq!(
        requirement["totals"],
        json!([
            { "type": "FREEZER", "quantity": 5 },
            { "type": "G2063B", "quantity": 1 }
        ])
    );
    assert_eq!(
        requirement["raw_notes"][1],
        "R-11: (3) FREEZER"
    );
    assert_eq!(requirement["items"][0]["driver_serial"], "11");
}

#[tokio::test]
async fn materials_for_one_driver_name_the_technician() {
    let app = TestApp::new().await;
    mount_routes(&app).await;
    Mock::given(method("POST"))
        .and(path("/get_orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "orders": [{ "data": { "orderNo": "R-12", "notes": "(4) COOLER" } }]
        })))
        .expect(1)
        .mount(&app.dispatch)
        .await;

    let body = response_json(
        app.request(
            Method::GET,
            "/api/v1/materials?date=2024-06-03&driver_serial=12",
            None,
        )
        .await,
    )
    .await;
    assert_eq!(body["data"]["technician_name"], "Lee Ward");
    assert_eq!(body["data"]["totals"][0]["quantity"], 4);
}
