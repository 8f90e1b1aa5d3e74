use crate::{
    db::DbPool,
    entities::attendance_count::{self, Entity as AttendanceEntity, Model as AttendanceModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{sea_query::OnConflict, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GroupCount {
    pub completed: i32,
    pub total: i32,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AttendanceQuery {
    pub date: NaiveDate,
    /// Comma separated group ids
    pub groups: Option<String>,
}

impl AttendanceQuery {
    pub fn group_ids(&self) -> Vec<String> {
        self.groups
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[validate(schema(function = "validate_counts"))]
pub struct RecordCountsRequest {
    #[validate(length(min = 1, max = 128))]
    pub group_id: String,
    pub date: NaiveDate,
    #[validate(range(min = 0))]
    pub total_count: i32,
    #[validate(range(min = 0))]
    pub completed_count: i32,
}

fn validate_counts(req: &RecordCountsRequest) -> Result<(), ValidationError> {
    if req.completed_count > req.total_count {
        return Err(ValidationError::new("completed_exceeds_total"));
    }
    Ok(())
}

#[derive(Clone)]
pub struct AttendanceService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl AttendanceService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Counts per group for `date`. Requested groups without a stored row
    /// report zeros; with no groups requested every stored row is returned.
    #[instrument(skip(self))]
    pub async fn counts_for_date(
        &self,
        date: NaiveDate,
        groups: &[String],
    ) -> Result<BTreeMap<String, GroupCount>, ServiceError> {
        let rows = AttendanceEntity::find()
            .filter(attendance_count::Column::Date.eq(date))
            .all(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to load attendance counts");
                ServiceError::DatabaseError(e)
            })?;

        let mut counts: BTreeMap<String, GroupCount> = groups
            .iter()
            .map(|g| (g.clone(), GroupCount::default()))
            .collect();
        let requested_only = !groups.is_empty();

        for row in rows {
            if requested_only && !counts.contains_key(&row.group_id) {
                continue;
            }
            counts.insert(
                row.group_id,
                GroupCount {
                    completed: row.completed_count,
                    total: row.total_count,
                },
            );
        }
        Ok(counts)
    }

    /// Upserts the counts for one group and day.
    #[instrument(skip(self), fields(group_id = %req.group_id, date = %req.date))]
    pub async fn record_counts(
        &self,
        req: RecordCountsRequest,
    ) -> Result<AttendanceModel, ServiceError> {
        req.validate()?;
        let db = &*self.db_pool;
        use attendance_count::Column;

        let row = attendance_count::ActiveModel {
            id: Set(Uuid::new_v4()),
            group_id: Set(req.group_id.clone()),
            date: Set(req.date),
            total_count: Set(req.total_count),
            completed_count: Set(req.completed_count),
            updated_at: Set(Utc::now()),
        };

        AttendanceEntity::insert(row)
            .on_conflict(
                OnConflict::columns([Column::GroupId, Column::Date])
                    .update_columns([Column::TotalCount, Column::CompletedCount, Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to record attendance counts");
                ServiceError::DatabaseError(e)
            })?;

        let stored = AttendanceEntity::find()
            .filter(Column::GroupId.eq(req.group_id.as_str()))
            .filter(Column::Date.eq(req.date))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::InternalError("attendance row missing after upsert".to_string())
            })?;

        info!(
            total = stored.total_count,
            completed = stored.completed_count,
            "Attendance counts recorded"
        );
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::AttendanceRecorded {
                    group_id: stored.group_id.clone(),
                    date: stored.date,
                })
                .await;
        }
        Ok(stored)
    }
}
