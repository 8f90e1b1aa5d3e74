use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fieldops_api::{
    normalize::NormalizedOrder,
    services::materials::{parse_materials_from_notes, totals_by_type},
    services::work_orders::WorkOrderView,
};
use serde_json::{json, Value};

fn raw_order(i: usize) -> Value {
    json!({
        "data": {
            "orderNo": format!("WO-{:06}", i),
            "date": "2024-03-05",
            "location": { "locationName": format!("Store #{}", i % 250) },
            "notes": "(2) FREEZER, (1) COOLER"
        },
        "scheduleInformation": { "driverName": "Kim Ode", "driverId": "7" },
        "completion_response": {
            "orders": [{
                "orderNo": format!("WO-{:06}", i),
                "success": true,
                "data": {
                    "status": "success",
                    "startTime": { "utcTime": "2024-03-05T14:00:00Z" },
                    "endTime": { "utcTime": "2024-03-05T15:10:00Z" },
                    "form": { "note": "done", "images": [{ "url": "https://img.example/1.jpg" }] }
                }
            }]
        }
    })
}

// Normalizing a batch of raw dispatch orders, as the importer does
fn normalize_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_orders");

    for size in [1usize, 50, 500].iter() {
        let orders: Vec<Value> = (0..*size).map(raw_order).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &orders, |b, orders| {
            b.iter(|| {
                orders
                    .iter()
                    .filter_map(|o| NormalizedOrder::from_raw(black_box(o)).ok())
                    .count()
            });
        });
    }

    group.finish();
}

// Building the list view from a stored row
fn view_benchmark(c: &mut Criterion) {
    use chrono::Utc;
    use fieldops_api::entities::{work_order, WorkOrderStatus};

    let raw = raw_order(1);
    let normalized = match NormalizedOrder::from_raw(&raw) {
        Ok(n) => n,
        Err(e) => panic!("benchmark fixture must normalize: {}", e),
    };
    let now = Utc::now();
    let model = work_order::Model {
        id: uuid::Uuid::new_v4(),
        order_no: normalized.order_no,
        status: WorkOrderStatus::PendingReview,
        timestamp: now,
        service_date: normalized.service_date,
        end_time: normalized.end_time,
        driver_name: normalized.driver_name,
        location_name: normalized.location_name,
        dispatch_status: normalized.dispatch_status,
        notes: None,
        qc_notes: None,
        resolution_notes: None,
        duration: None,
        lds: None,
        approved_user: None,
        approved_at: None,
        flagged_user: None,
        flagged_at: None,
        resolved_user: None,
        resolved_at: None,
        rejected_user: None,
        rejected_at: None,
        search_response: normalized.search_response,
        completion_response: normalized.completion_response,
        created_at: now,
        updated_at: now,
    };

    c.bench_function("work_order_view", |b| {
        b.iter(|| WorkOrderView::from(black_box(&model)))
    });
}

fn materials_benchmark(c: &mut Criterion) {
    let notes = "(0) COOLER, (15) FREEZER, (2) G2063B, (2) G2563B, (4) SIGN KIT";

    c.bench_function("parse_materials", |b| {
        b.iter(|| {
            let items = parse_materials_from_notes(black_box(notes), "WO-1", Some("7"));
            totals_by_type(&items)
        });
    });
}

criterion_group!(
    benches,
    normalize_benchmark,
    view_benchmark,
    materials_benchmark
);
criterion_main!(benches);
