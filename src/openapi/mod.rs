use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "FieldOps API",
        version = "1.0.0",
        description = r#"
# FieldOps Work Order API

Backend for reviewing field-service work orders imported from the dispatch (route planning) API.

## Features

- **Work Order Review**: list, filter and sort imported work orders, then approve, flag, resolve or reject them
- **Imports**: deduplicated bulk import of raw dispatch orders
- **Dispatch Search**: search dispatch orders with their completion details attached
- **Reports**: daily route schedule synced into a reports table
- **Materials**: material requirements parsed from order notes
- **Attendance**: per-group daily completed/total counts

## Actors

There is no authentication layer. Status changes take an optional `actor` string, recorded as
`system` when absent.

## Error Handling

Failures use a single error body:

```json
{
  "error": "Conflict",
  "message": "Invalid status transition from rejected to approved",
  "request_id": "req-abc123xyz",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

## Pagination

`GET /work-orders` takes `page` (default 1) and `limit` (default 10, max 100). A page past the end
returns the last page.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "work-orders", description = "Work order review endpoints"),
        (name = "jobs", description = "Import and sync jobs"),
        (name = "dispatch", description = "Dispatch API search"),
        (name = "reports", description = "Route reports"),
        (name = "materials", description = "Materials requirement planning"),
        (name = "attendance", description = "Group attendance counts")
    ),
    paths(
        // Work orders
        crate::handlers::work_orders::list_work_orders,
        crate::handlers::work_orders::status_counts,
        crate::handlers::work_orders::flagged_count,
        crate::handlers::work_orders::get_work_order,
        crate::handlers::work_orders::update_status,
        crate::handlers::work_orders::update_notes,
        crate::handlers::work_orders::delete_work_order,

        // Jobs
        crate::handlers::jobs::import_bulk_orders,
        crate::handlers::jobs::fetch_reports,
        crate::handlers::jobs::auto_import,
        crate::handlers::jobs::list_jobs,

        // Dispatch
        crate::handlers::dispatch::orders_with_completion,

        // Reports, materials, attendance
        crate::handlers::reports::list_reports,
        crate::handlers::materials::materials_requirement,
        crate::handlers::attendance::get_counts,
        crate::handlers::attendance::record_counts,
    ),
    components(
        schemas(
            crate::entities::WorkOrderStatus,
            crate::services::work_orders::SortField,
            crate::services::work_orders::SortDirection,
            crate::services::work_orders::WorkOrderView,
            crate::services::work_orders::WorkOrderDetail,
            crate::services::work_orders::StatusCounts,
            crate::services::work_orders::UpdateStatusRequest,
            crate::services::work_orders::UpdateNotesRequest,
            crate::normalize::DriverRef,
            crate::services::imports::ImportOrdersRequest,
            crate::services::imports::ImportSummary,
            crate::services::dispatch_sync::SearchWithCompletionRequest,
            crate::services::dispatch_sync::OrdersWithCompletion,
            crate::services::dispatch_sync::AutoImportOutcome,
            crate::services::reports::FetchReportsOutcome,
            crate::services::materials::MaterialsRequirement,
            crate::services::attendance::RecordCountsRequest,
            crate::jobs::JobRun,
            crate::jobs::JobKind,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
