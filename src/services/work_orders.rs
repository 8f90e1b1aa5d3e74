use crate::{
    db::DbPool,
    entities::work_order::{
        self, ActiveModel as WorkOrderActiveModel, Attribution, Entity as WorkOrderEntity,
        Model as WorkOrderModel, WorkOrderStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::{self, names},
    normalize::{best_date, format_duration, CompletionView, DriverRef, SearchView},
    PaginatedResponse,
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    sea_query::{Expr, Func, LikeExpr, NullOrdering, SimpleExpr},
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, IntoSimpleExpr, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_ACTOR: &str = "system";

/// Filters shared by the listing and the status counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderFilter {
    /// `flagged` also matches `flagged_followup`
    pub status: Option<WorkOrderStatus>,
    /// Inclusive lower bound on service_date
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on service_date
    pub date_to: Option<NaiveDate>,
    pub driver: Option<String>,
    pub location: Option<String>,
    pub order_no: Option<String>,
    pub dispatch_status: Option<String>,
    /// Matches order number, driver or location
    pub search: Option<String>,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SortField {
    OrderNo,
    ServiceDate,
    #[default]
    EndTime,
    Driver,
    Location,
    Status,
    Timestamp,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkOrderSort {
    pub field: SortField,
    pub direction: SortDirection,
}

/// Resolved page/limit for a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    /// Page is at least 1; limit falls back to `default_limit` and is held to
    /// `1..=max_limit`.
    pub fn new(page: Option<u64>, limit: Option<u64>, default_limit: u64, max_limit: u64) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, max_limit.max(1)),
        }
    }
}

pub fn total_pages(total: u64, limit: u64) -> u64 {
    total.div_ceil(limit.max(1)).max(1)
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: WorkOrderStatus,
    /// Who made the change; defaults to "system"
    #[validate(length(max = 255, message = "Actor must be at most 255 characters"))]
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateNotesRequest {
    #[validate(length(max = 10000))]
    pub notes: Option<String>,
    #[validate(length(max = 10000))]
    pub qc_notes: Option<String>,
    #[validate(length(max = 10000))]
    pub resolution_notes: Option<String>,
}

/// Display-ready work order built from the stored row and its raw payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WorkOrderView {
    pub id: Uuid,
    pub order_no: String,
    pub status: WorkOrderStatus,
    pub status_label: String,
    pub timestamp: DateTime<Utc>,
    pub service_date: Option<NaiveDate>,
    pub end_time: Option<DateTime<Utc>>,
    /// Completion end, completion start, service date, then import time
    pub best_date: DateTime<Utc>,
    pub driver_name: String,
    pub location_name: String,
    pub dispatch_status: Option<String>,
    pub driver: Option<DriverRef>,
    #[schema(value_type = Option<Object>)]
    pub location: Option<Value>,
    pub service_notes: Option<String>,
    pub additional_notes: Option<String>,
    pub tech_notes: Option<String>,
    pub notes: String,
    pub qc_notes: String,
    pub resolution_notes: String,
    pub duration: Option<String>,
    pub lds: String,
    pub has_images: bool,
    pub images: Vec<String>,
    pub signature_url: Option<String>,
    /// Who moved the order into its current status
    pub attribution: Option<Attribution>,
}

impl From<&WorkOrderModel> for WorkOrderView {
    fn from(model: &WorkOrderModel) -> Self {
        let search = SearchView::from_search(&model.search_response);
        let completion = CompletionView::from_completion(model.completion_response.as_ref());

        let duration = model
            .duration
            .clone()
            .filter(|d| !d.trim().is_empty())
            .or_else(|| match (completion.start_time, completion.end_time) {
                (Some(start), Some(end)) => format_duration(start, end),
                _ => None,
            });

        Self {
            id: model.id,
            order_no: model.order_no.clone(),
            status: model.status,
            status_label: model.status.label(),
            timestamp: model.timestamp,
            service_date: model.service_date,
            end_time: model.end_time,
            best_date: best_date(&completion, model.service_date, model.timestamp),
            driver_name: model.driver_name.clone(),
            location_name: model.location_name.clone(),
            dispatch_status: model.dispatch_status.clone(),
            driver: search.driver,
            location: search.location,
            service_notes: search.service_notes,
            additional_notes: search.additional_notes,
            tech_notes: completion.tech_notes.clone(),
            notes: model.notes.clone().unwrap_or_default(),
            qc_notes: model.qc_notes.clone().unwrap_or_default(),
            resolution_notes: model.resolution_notes.clone().unwrap_or_default(),
            duration,
            lds: model.lds.clone().unwrap_or_default(),
            has_images: completion.has_images(),
            images: completion.images,
            signature_url: completion.signature_url,
            attribution: model.attribution(),
        }
    }
}

/// Single work order with its raw dispatch payloads.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkOrderDetail {
    #[serde(flatten)]
    pub view: WorkOrderView,
    #[schema(value_type = Object)]
    pub search_response: Value,
    #[schema(value_type = Option<Object>)]
    pub completion_response: Option<Value>,
}

impl From<WorkOrderModel> for WorkOrderDetail {
    fn from(model: WorkOrderModel) -> Self {
        Self {
            view: WorkOrderView::from(&model),
            search_response: model.search_response,
            completion_response: model.completion_response,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusCounts {
    pub all: u64,
    pub pending_review: u64,
    pub approved: u64,
    /// Includes flagged_followup
    pub flagged: u64,
    pub resolved: u64,
    pub rejected: u64,
}

impl StatusCounts {
    fn add(&mut self, status: WorkOrderStatus, count: u64) {
        self.all += count;
        match status {
            WorkOrderStatus::PendingReview => self.pending_review += count,
            WorkOrderStatus::Approved => self.approved += count,
            WorkOrderStatus::Flagged | WorkOrderStatus::FlaggedFollowup => self.flagged += count,
            WorkOrderStatus::Resolved => self.resolved += count,
            WorkOrderStatus::Rejected => self.rejected += count,
        }
    }
}

fn lower(column: work_order::Column) -> SimpleExpr {
    Func::lower(Expr::col(column)).into()
}

/// `%needle%` with the LIKE wildcards in `needle` escaped by a backslash.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn contains(column: work_order::Column, needle: &str) -> SimpleExpr {
    Expr::col(column).like(LikeExpr::new(like_pattern(needle)).escape('\\'))
}

/// Case-insensitive substring match.
fn contains_ci(column: work_order::Column, needle: &str) -> SimpleExpr {
    Expr::expr(lower(column))
        .like(LikeExpr::new(like_pattern(&needle.to_lowercase())).escape('\\'))
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn apply_filter(
    mut query: Select<WorkOrderEntity>,
    filter: &WorkOrderFilter,
    include_status: bool,
) -> Select<WorkOrderEntity> {
    use work_order::Column;

    if include_status {
        if let Some(status) = filter.status {
            query = if status == WorkOrderStatus::Flagged {
                query.filter(
                    Column::Status.is_in([WorkOrderStatus::Flagged, WorkOrderStatus::FlaggedFollowup]),
                )
            } else {
                query.filter(Column::Status.eq(status))
            };
        }
    }
    if let Some(from) = filter.date_from {
        query = query.filter(Column::ServiceDate.gte(from));
    }
    if let Some(to) = filter.date_to {
        query = query.filter(Column::ServiceDate.lte(to));
    }
    if let Some(driver) = non_blank(&filter.driver) {
        query = query.filter(contains_ci(Column::DriverName, driver));
    }
    if let Some(location) = non_blank(&filter.location) {
        query = query.filter(contains_ci(Column::LocationName, location));
    }
    if let Some(order_no) = non_blank(&filter.order_no) {
        query = query.filter(contains(Column::OrderNo, order_no));
    }
    if let Some(dispatch_status) = non_blank(&filter.dispatch_status) {
        query = query.filter(Column::DispatchStatus.eq(dispatch_status));
    }
    if let Some(search) = non_blank(&filter.search) {
        query = query.filter(
            Condition::any()
                .add(contains_ci(Column::OrderNo, search))
                .add(contains_ci(Column::DriverName, search))
                .add(contains_ci(Column::LocationName, search)),
        );
    }
    query
}

fn apply_sort(query: Select<WorkOrderEntity>, sort: WorkOrderSort) -> Select<WorkOrderEntity> {
    use work_order::Column;

    let order = match sort.direction {
        SortDirection::Asc => Order::Asc,
        SortDirection::Desc => Order::Desc,
    };
    let expr: SimpleExpr = match sort.field {
        SortField::OrderNo => Column::OrderNo.into_simple_expr(),
        SortField::ServiceDate => Column::ServiceDate.into_simple_expr(),
        SortField::EndTime => Column::EndTime.into_simple_expr(),
        SortField::Driver => lower(Column::DriverName),
        SortField::Location => lower(Column::LocationName),
        SortField::Status => Column::Status.into_simple_expr(),
        SortField::Timestamp => Column::Timestamp.into_simple_expr(),
    };

    let query = query.order_by_with_nulls(expr, order, NullOrdering::Last);
    if sort.field == SortField::OrderNo {
        query
    } else {
        query.order_by_asc(Column::OrderNo)
    }
}

/// Review workflow over imported work orders.
#[derive(Clone)]
pub struct WorkOrderService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    default_page_size: u64,
    max_page_size: u64,
}

impl WorkOrderService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        default_page_size: u64,
        max_page_size: u64,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            default_page_size,
            max_page_size,
        }
    }

    pub fn page_request(&self, page: Option<u64>, limit: Option<u64>) -> PageRequest {
        PageRequest::new(page, limit, self.default_page_size, self.max_page_size)
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event).await;
        }
    }

    /// Filtered, sorted page of work orders. A page past the end returns the
    /// last page.
    #[instrument(skip(self, filter), fields(page = ?page, limit = ?limit, sort = %sort.field))]
    pub async fn list_work_orders(
        &self,
        filter: &WorkOrderFilter,
        sort: WorkOrderSort,
        page: Option<u64>,
        limit: Option<u64>,
    ) -> Result<PaginatedResponse<WorkOrderView>, ServiceError> {
        let db = &*self.db_pool;
        let request = self.page_request(page, limit);

        let query = apply_sort(apply_filter(WorkOrderEntity::find(), filter, true), sort);
        let paginator = query.paginate(db, request.limit);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count work orders");
            ServiceError::DatabaseError(e)
        })?;
        let total_pages = total_pages(total, request.limit);
        let page = request.page.min(total_pages);

        let models = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(error = %e, "Failed to fetch work orders page");
            ServiceError::DatabaseError(e)
        })?;

        Ok(PaginatedResponse {
            items: models.iter().map(WorkOrderView::from).collect(),
            total,
            page,
            limit: request.limit,
            total_pages,
        })
    }

    /// Per-status counts under every filter except status.
    #[instrument(skip(self, filter))]
    pub async fn status_counts(&self, filter: &WorkOrderFilter) -> Result<StatusCounts, ServiceError> {
        use work_order::Column;
        let db = &*self.db_pool;

        let rows: Vec<(String, i64)> = apply_filter(WorkOrderEntity::find(), filter, false)
            .select_only()
            .column(Column::Status)
            .column_as(Column::Id.count(), "count")
            .group_by(Column::Status)
            .into_tuple()
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to count work orders by status");
                ServiceError::DatabaseError(e)
            })?;

        let mut counts = StatusCounts::default();
        for (raw, count) in rows {
            match raw.parse::<WorkOrderStatus>() {
                Ok(status) => counts.add(status, count.max(0) as u64),
                Err(_) => error!(status = %raw, "Unknown work order status in database"),
            }
        }
        Ok(counts)
    }

    /// Badge count: flagged plus flagged_followup.
    #[instrument(skip(self))]
    pub async fn flagged_count(&self) -> Result<u64, ServiceError> {
        WorkOrderEntity::find()
            .filter(
                work_order::Column::Status
                    .is_in([WorkOrderStatus::Flagged, WorkOrderStatus::FlaggedFollowup]),
            )
            .count(&*self.db_pool)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    async fn find_model(&self, id: Uuid) -> Result<WorkOrderModel, ServiceError> {
        WorkOrderEntity::find_by_id(id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(work_order_id = %id, error = %e, "Failed to load work order");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Work order {} not found", id)))
    }

    #[instrument(skip(self), fields(work_order_id = %id))]
    pub async fn get_work_order(&self, id: Uuid) -> Result<WorkOrderDetail, ServiceError> {
        self.find_model(id).await.map(WorkOrderDetail::from)
    }

    /// Moves a work order to `request.status`, stamping who did it.
    ///
    /// Re-applying the current status changes nothing.
    #[instrument(skip(self, request), fields(work_order_id = %id, new_status = %request.status))]
    pub async fn update_status(
        &self,
        id: Uuid,
        request: UpdateStatusRequest,
    ) -> Result<WorkOrderView, ServiceError> {
        request.validate()?;
        let model = self.find_model(id).await?;
        let old_status = model.status;
        let new_status = request.status;

        if old_status == new_status {
            return Ok(WorkOrderView::from(&model));
        }
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidTransition {
                from: old_status.to_string(),
                to: new_status.to_string(),
            });
        }

        let actor = non_blank(&request.actor).unwrap_or(DEFAULT_ACTOR).to_string();
        let order_no = model.order_no.clone();

        let mut active: WorkOrderActiveModel = model.into();
        active.status = Set(new_status);
        active.stamp_attribution(new_status, &actor, Utc::now());

        let updated = active.update(&*self.db_pool).await.map_err(|e| {
            error!(work_order_id = %id, error = %e, "Failed to update work order status");
            ServiceError::DatabaseError(e)
        })?;

        metrics::increment_counter(names::STATUS_CHANGES);
        info!(
            order_no = %order_no,
            from = %old_status,
            to = %new_status,
            actor = %actor,
            "Work order status updated"
        );
        self.emit(Event::WorkOrderStatusChanged {
            work_order_id: id,
            order_no,
            old_status: old_status.to_string(),
            new_status: new_status.to_string(),
            actor,
        })
        .await;

        Ok(WorkOrderView::from(&updated))
    }

    /// Writes only the note fields present in `request`.
    #[instrument(skip(self, request), fields(work_order_id = %id))]
    pub async fn update_notes(
        &self,
        id: Uuid,
        request: UpdateNotesRequest,
    ) -> Result<WorkOrderView, ServiceError> {
        request.validate()?;
        let model = self.find_model(id).await?;

        if request.notes.is_none() && request.qc_notes.is_none() && request.resolution_notes.is_none()
        {
            return Ok(WorkOrderView::from(&model));
        }

        let mut active: WorkOrderActiveModel = model.into();
        if let Some(notes) = request.notes {
            active.notes = Set(Some(notes));
        }
        if let Some(qc_notes) = request.qc_notes {
            active.qc_notes = Set(Some(qc_notes));
        }
        if let Some(resolution_notes) = request.resolution_notes {
            active.resolution_notes = Set(Some(resolution_notes));
        }

        let updated = active.update(&*self.db_pool).await.map_err(|e| {
            error!(work_order_id = %id, error = %e, "Failed to update work order notes");
            ServiceError::DatabaseError(e)
        })?;

        self.emit(Event::WorkOrderNotesUpdated(id)).await;
        Ok(WorkOrderView::from(&updated))
    }

    #[instrument(skip(self), fields(work_order_id = %id))]
    pub async fn delete_work_order(&self, id: Uuid) -> Result<(), ServiceError> {
        let model = self.find_model(id).await?;

        WorkOrderEntity::delete_by_id(id)
            .exec(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(work_order_id = %id, error = %e, "Failed to delete work order");
                ServiceError::DatabaseError(e)
            })?;

        info!(order_no = %model.order_no, "Work order deleted");
        self.emit(Event::WorkOrderDeleted {
            work_order_id: id,
            order_no: model.order_no,
        })
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_request_clamps() {
        assert_eq!(
            PageRequest::new(None, None, 10, 100),
            PageRequest { page: 1, limit: 10 }
        );
        assert_eq!(
            PageRequest::new(Some(0), Some(0), 10, 100),
            PageRequest { page: 1, limit: 1 }
        );
        assert_eq!(
            PageRequest::new(Some(3), Some(1_000), 10, 100),
            PageRequest { page: 3, limit: 100 }
        );
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("WO-1"), "%WO-1%");
        assert_eq!(like_pattern("WO_1"), "%WO\\_1%");
        assert_eq!(like_pattern("50%"), "%50\\%%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn total_pages_is_at_least_one() {
        assert_eq!(total_pages(0, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
    }

    #[test]
    fn sort_parameters_parse_from_text() {
        assert_eq!("end_time".parse::<SortField>().unwrap(), SortField::EndTime);
        assert_eq!("asc".parse::<SortDirection>().unwrap(), SortDirection::Asc);
        assert_eq!(WorkOrderSort::default().field, SortField::EndTime);
        assert_eq!(WorkOrderSort::default().direction, SortDirection::Desc);
    }

    #[test]
    fn view_computes_duration_and_defaults() {
        let now = Utc::now();
        let model = WorkOrderModel {
            id: Uuid::new_v4(),
            order_no: "W-1".into(),
            status: WorkOrderStatus::PendingReview,
            timestamp: now,
            service_date: None,
            end_time: None,
            driver_name: "Lee".into(),
            location_name: "Depot".into(),
            dispatch_status: Some("success".into()),
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
            search_response: json!({"data": {"notes": "(1) Mat"}}),
            completion_response: Some(json!({"orders": [{"data": {
                "startTime": {"utcTime": "2024-01-01T08:00:00Z"},
                "endTime": {"utcTime": "2024-01-01T10:05:00Z"}
            }}]})),
            created_at: now,
            updated_at: now,
        };

        let view = WorkOrderView::from(&model);
        assert_eq!(view.duration.as_deref(), Some("2h 5m"));
        assert_eq!(view.notes, "");
        assert_eq!(view.status_label, "Pending Review");
        assert_eq!(view.service_notes.as_deref(), Some("(1) Mat"));
        assert!(!view.has_images);
        assert!(view.attribution.is_none());
        assert_eq!(view.best_date.to_rfc3339(), "2024-01-01T10:05:00+00:00");
    }

    #[test]
    fn status_counts_fold_followup_into_flagged() {
        let mut counts = StatusCounts::default();
        counts.add(WorkOrderStatus::Flagged, 2);
        counts.add(WorkOrderStatus::FlaggedFollowup, 3);
        counts.add(WorkOrderStatus::Approved, 1);
        assert_eq!(counts.flagged, 5);
        assert_eq!(counts.all, 6);
    }
}
