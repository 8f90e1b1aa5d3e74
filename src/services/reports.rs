use crate::{
    db::DbPool,
    dispatch::{
        completion_is_usable, completion_key, run_in_batches, BatchStats, DispatchApi,
        RoutesResponse,
    },
    entities::report::{self, Entity as ReportEntity, Model as ReportModel},
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::{self, names},
    normalize::first_string,
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    sea_query::{NullOrdering, OnConflict},
    ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Status stored for stops without a completion yet.
pub const SCHEDULED_STATUS: &str = "Scheduled";
/// Dispatch-side status stamped on every fetched stop.
pub const PLANNED_DISPATCH_STATUS: &str = "Planned";

const UPSERT_CHUNK: usize = 500;

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct FetchReportsRequest {
    /// Route date; today (UTC) when omitted
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FetchReportsOutcome {
    pub date: NaiveDate,
    pub updated: usize,
    pub message: String,
    pub batch_stats: BatchStats,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ReportQuery {
    pub date: Option<NaiveDate>,
    pub status: Option<String>,
    pub tech_name: Option<String>,
}

/// `"Dollar General #1234"` -> `"Dollar General"`; only names containing `#`
/// have a group.
pub fn customer_group(cust_name: &str) -> Option<String> {
    if !cust_name.contains('#') {
        return None;
    }
    cust_name
        .split('#')
        .next()
        .map(|group| group.trim().to_string())
}

/// One report row per real stop, deduplicated by order number (last wins).
pub fn build_report_rows(
    routes: &RoutesResponse,
    completions: &HashMap<String, Value>,
    org_id: &str,
    report_date: NaiveDate,
    fetched_at: DateTime<Utc>,
) -> Vec<ReportModel> {
    let mut rows: Vec<ReportModel> = Vec::new();
    let mut index_by_order: HashMap<String, usize> = HashMap::new();

    for route in &routes.routes {
        for stop in &route.stops {
            let Some(order_no) = stop.order_no() else {
                continue;
            };
            let completion = completions.get(order_no);
            let cust_name = stop.location_name.clone().filter(|n| !n.trim().is_empty());

            let row = ReportModel {
                id: Uuid::new_v4(),
                org_id: org_id.to_string(),
                order_no: order_no.to_string(),
                status: completion
                    .and_then(|data| first_string(data, &["/status"]))
                    .unwrap_or_else(|| SCHEDULED_STATUS.to_string()),
                dispatch_status: Some(PLANNED_DISPATCH_STATUS.to_string()),
                scheduled_time: stop.scheduled_at_dt.clone(),
                end_time: completion.and_then(|data| first_string(data, &["/endTime/utcTime"])),
                cust_group: cust_name.as_deref().and_then(customer_group),
                cust_name,
                tech_name: route.driver_name.clone(),
                region: None,
                report_date,
                fetched_at,
            };

            match index_by_order.get(order_no) {
                Some(&i) => rows[i] = row,
                None => {
                    index_by_order.insert(order_no.to_string(), rows.len());
                    rows.push(row);
                }
            }
        }
    }
    rows
}

/// Syncs the daily route schedule into `reports`.
#[derive(Clone)]
pub struct ReportService {
    db_pool: Arc<DbPool>,
    dispatch: Arc<dyn DispatchApi>,
    event_sender: Option<Arc<EventSender>>,
    org_id: String,
    batch_size: usize,
    batch_delay: Duration,
}

impl ReportService {
    pub fn new(
        db_pool: Arc<DbPool>,
        dispatch: Arc<dyn DispatchApi>,
        event_sender: Option<Arc<EventSender>>,
        org_id: String,
        batch_size: usize,
        batch_delay: Duration,
    ) -> Self {
        Self {
            db_pool,
            dispatch,
            event_sender,
            org_id,
            batch_size,
            batch_delay,
        }
    }

    /// Fetches routes for `date` (default today), joins completion details and
    /// upserts one row per stop on `order_no`.
    #[instrument(skip(self), fields(date = ?date))]
    pub async fn fetch_reports(
        &self,
        date: Option<NaiveDate>,
    ) -> Result<FetchReportsOutcome, ServiceError> {
        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        let fetched_at = Utc::now();

        let routes = self.dispatch.get_routes(date).await?;
        let order_nos = routes.order_numbers();
        info!(stops = order_nos.len(), "Fetched routes");

        let (envelopes, batch_stats) =
            run_in_batches(&order_nos, self.batch_size, self.batch_delay, |chunk| async move {
                self.dispatch.get_completion_details(chunk).await
            })
            .await;
        if batch_stats.failed_batches > 0 {
            warn!(
                failed = batch_stats.failed_batches,
                "Skipping completion detail batches that failed"
            );
        }

        let completions: HashMap<String, Value> = envelopes
            .into_iter()
            .flat_map(|envelope| envelope.orders)
            .filter(completion_is_usable)
            .filter_map(|mut entry| {
                let key = completion_key(&entry)?;
                entry.get_mut("data").map(Value::take).map(|data| (key, data))
            })
            .collect();

        let rows = build_report_rows(&routes, &completions, &self.org_id, date, fetched_at);
        if rows.is_empty() {
            return Ok(FetchReportsOutcome {
                date,
                updated: 0,
                message: "No reports to update".to_string(),
                batch_stats,
            });
        }

        let updated = rows.len();
        self.upsert(rows).await?;

        metrics::increment_counter_by(names::REPORTS_UPSERTED, updated as u64);
        info!(updated, "Reports upserted");
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::ReportsSynced { date, updated })
                .await;
        }

        Ok(FetchReportsOutcome {
            date,
            updated,
            message: format!("Successfully updated {} reports", updated),
            batch_stats,
        })
    }

    async fn upsert(&self, rows: Vec<ReportModel>) -> Result<(), ServiceError> {
        use report::Column;
        let db = &*self.db_pool;

        for chunk in rows.chunks(UPSERT_CHUNK) {
            let models = chunk.iter().cloned().map(|row| report::ActiveModel {
                id: Set(row.id),
                org_id: Set(row.org_id),
                order_no: Set(row.order_no),
                status: Set(row.status),
                dispatch_status: Set(row.dispatch_status),
                scheduled_time: Set(row.scheduled_time),
                end_time: Set(row.end_time),
                cust_name: Set(row.cust_name),
                cust_group: Set(row.cust_group),
                tech_name: Set(row.tech_name),
                region: Set(row.region),
                report_date: Set(row.report_date),
                fetched_at: Set(row.fetched_at),
            });

            ReportEntity::insert_many(models)
                .on_conflict(
                    OnConflict::column(Column::OrderNo)
                        .update_columns([
                            Column::OrgId,
                            Column::Status,
                            Column::DispatchStatus,
                            Column::ScheduledTime,
                            Column::EndTime,
                            Column::CustName,
                            Column::CustGroup,
                            Column::TechName,
                            Column::Region,
                            Column::ReportDate,
                            Column::FetchedAt,
                        ])
                        .to_owned(),
                )
                .exec_without_returning(db)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to upsert reports");
                    ServiceError::DatabaseError(e)
                })?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_reports(&self, query: &ReportQuery) -> Result<Vec<ReportModel>, ServiceError> {
        use report::Column;

        let mut select = ReportEntity::find();
        if let Some(date) = query.date {
            select = select.filter(Column::ReportDate.eq(date));
        }
        if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
            select = select.filter(Column::Status.eq(status));
        }
        if let Some(tech) = query.tech_name.as_deref().filter(|s| !s.is_empty()) {
            select = select.filter(Column::TechName.eq(tech));
        }

        select
            .order_by_with_nulls(Column::ScheduledTime, Order::Asc, NullOrdering::Last)
            .order_by_asc(Column::OrderNo)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::DatabaseError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn routes() -> RoutesResponse {
        serde_json::from_value(json!({
            "success": true,
            "routes": [
                {
                    "driverName": "Ana",
                    "stops": [
                        {"id": "d", "orderNo": "-"},
                        {"id": "1", "orderNo": "A-1", "locationName": "Dollar General #1234", "scheduledAtDt": "2024-03-05 09:00"},
                        {"id": "2", "orderNo": "A-2", "locationName": "Corner Shop"}
                    ]
                },
                {
                    "driverName": "Ben",
                    "stops": [{"id": "3", "orderNo": "A-1", "locationName": "Menards #5678"}]
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn customer_group_splits_on_hash() {
        assert_eq!(
            customer_group("Dollar General #1234").as_deref(),
            Some("Dollar General")
        );
        assert_eq!(customer_group("Corner Shop"), None);
        assert_eq!(customer_group("#12").as_deref(), Some(""));
    }

    #[test]
    fn rows_use_completion_status_and_dedupe_last_wins() {
        let mut completions = HashMap::new();
        completions.insert(
            "A-2".to_string(),
            json!({"status": "success", "endTime": {"utcTime": "2024-03-05T15:00:00Z"}}),
        );
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();

        let rows = build_report_rows(&routes(), &completions, "org", date, Utc::now());
        assert_eq!(rows.len(), 2);

        let a1 = rows.iter().find(|r| r.order_no == "A-1").unwrap();
        assert_eq!(a1.tech_name.as_deref(), Some("Ben"));
        assert_eq!(a1.cust_group.as_deref(), Some("Menards"));
        assert_eq!(a1.status, SCHEDULED_STATUS);
        assert_eq!(a1.dispatch_status.as_deref(), Some(PLANNED_DISPATCH_STATUS));

        let a2 = rows.iter().find(|r| r.order_no == "A-2").unwrap();
        assert_eq!(a2.status, "success");
        assert_eq!(a2.end_time.as_deref(), Some("2024-03-05T15:00:00Z"));
        assert_eq!(a2.cust_group, None);
        assert_eq!(a2.org_id, "org");
    }
}
