use crate::{
    db::DbPool,
    entities::work_order::{
        self, ActiveModel as WorkOrderActiveModel, Entity as WorkOrderEntity, WorkOrderStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::{self, names},
    normalize::NormalizedOrder,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, QueryFilter, Set, SqlErr};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ImportOrdersRequest {
    /// Raw orders in any of the supported dispatch shapes
    #[serde(default)]
    #[schema(value_type = Option<Vec<Object>>)]
    pub orders: Option<Vec<Value>>,
}

/// Result of an import run; `success` means no order failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ImportSummary {
    pub success: bool,
    pub total: usize,
    pub imported: usize,
    pub duplicates: usize,
    pub errors: usize,
    pub error_details: Vec<String>,
}

enum Outcome {
    Imported(Uuid),
    Duplicate,
}

/// Imports raw dispatch orders as `pending_review` work orders, deduplicated by
/// order number.
#[derive(Clone)]
pub struct ImportService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl ImportService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Processes `orders` one at a time. Existing order numbers (including
    /// repeats inside `orders`) count as duplicates; anything that fails is
    /// counted and described instead of aborting the run.
    #[instrument(skip(self, orders), fields(total = orders.len()))]
    pub async fn import_orders(&self, orders: &[Value]) -> Result<ImportSummary, ServiceError> {
        if orders.is_empty() {
            return Err(ServiceError::ValidationError(
                "No valid orders provided".to_string(),
            ));
        }

        info!("Processing {} orders for import", orders.len());
        let mut summary = ImportSummary {
            total: orders.len(),
            ..Default::default()
        };
        let mut seen: HashSet<String> = HashSet::new();

        for (index, raw) in orders.iter().enumerate() {
            let normalized = match NormalizedOrder::from_raw(raw) {
                Ok(normalized) => normalized,
                Err(e) => {
                    summary.errors += 1;
                    summary.error_details.push(format!("order #{}: {}", index + 1, e));
                    continue;
                }
            };

            if !seen.insert(normalized.order_no.clone()) {
                summary.duplicates += 1;
                continue;
            }

            let order_no = normalized.order_no.clone();
            match self.import_one(normalized).await {
                Ok(Outcome::Imported(id)) => {
                    summary.imported += 1;
                    if let Some(sender) = &self.event_sender {
                        sender
                            .send_or_log(Event::WorkOrderImported {
                                work_order_id: id,
                                order_no,
                            })
                            .await;
                    }
                }
                Ok(Outcome::Duplicate) => summary.duplicates += 1,
                Err(e) => {
                    warn!(order_no = %order_no, error = %e, "Failed to import order");
                    summary.errors += 1;
                    summary.error_details.push(format!("{}: {}", order_no, e));
                }
            }
        }

        summary.success = summary.errors == 0;

        metrics::increment_counter_by(names::IMPORT_IMPORTED, summary.imported as u64);
        metrics::increment_counter_by(names::IMPORT_DUPLICATES, summary.duplicates as u64);
        metrics::increment_counter_by(names::IMPORT_ERRORS, summary.errors as u64);
        info!(
            imported = summary.imported,
            duplicates = summary.duplicates,
            errors = summary.errors,
            "Import complete"
        );

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::ImportCompleted {
                    imported: summary.imported,
                    duplicates: summary.duplicates,
                    errors: summary.errors,
                })
                .await;
        }

        Ok(summary)
    }

    async fn import_one(&self, order: NormalizedOrder) -> Result<Outcome, ServiceError> {
        let db = &*self.db_pool;

        let existing = WorkOrderEntity::find()
            .filter(work_order::Column::OrderNo.eq(order.order_no.as_str()))
            .one(db)
            .await
            .map_err(|e| {
                error!(order_no = %order.order_no, error = %e, "Failed to check for existing order");
                ServiceError::DatabaseError(e)
            })?;
        if existing.is_some() {
            return Ok(Outcome::Duplicate);
        }

        let now = Utc::now();
        let id = Uuid::new_v4();
        let active = WorkOrderActiveModel {
            id: Set(id),
            order_no: Set(order.order_no),
            status: Set(WorkOrderStatus::PendingReview),
            timestamp: Set(now),
            service_date: Set(order.service_date),
            end_time: Set(order.end_time),
            driver_name: Set(order.driver_name),
            location_name: Set(order.location_name),
            dispatch_status: Set(order.dispatch_status),
            notes: Set(None),
            qc_notes: Set(None),
            resolution_notes: Set(None),
            duration: Set(None),
            lds: Set(None),
            approved_user: Set(None),
            approved_at: Set(None),
            flagged_user: Set(None),
            flagged_at: Set(None),
            resolved_user: Set(None),
            resolved_at: Set(None),
            rejected_user: Set(None),
            rejected_at: Set(None),
            search_response: Set(order.search_response),
            completion_response: Set(order.completion_response),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match active.insert(db).await {
            Ok(_) => Ok(Outcome::Imported(id)),
            // Lost a race with a concurrent import of the same order
            Err(e) if is_unique_violation(&e) => Ok(Outcome::Duplicate),
            Err(e) => Err(ServiceError::DatabaseError(e)),
        }
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
