use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Review status of a work order.
///
/// Stored as its snake_case name. `FromStr`/`Display` use the same text so query
/// strings, JSON bodies and database rows agree.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkOrderStatus {
    #[sea_orm(string_value = "pending_review")]
    PendingReview,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "flagged")]
    Flagged,
    #[sea_orm(string_value = "flagged_followup")]
    FlaggedFollowup,
    #[sea_orm(string_value = "resolved")]
    Resolved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

/// Which attribution columns a status writes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributionSlot {
    Approved,
    Flagged,
    Resolved,
    Rejected,
}

impl WorkOrderStatus {
    pub const ALL: [WorkOrderStatus; 6] = [
        WorkOrderStatus::PendingReview,
        WorkOrderStatus::Approved,
        WorkOrderStatus::Flagged,
        WorkOrderStatus::FlaggedFollowup,
        WorkOrderStatus::Resolved,
        WorkOrderStatus::Rejected,
    ];

    /// Statuses reachable from `self` in one step.
    pub fn allowed_transitions(self) -> &'static [WorkOrderStatus] {
        use WorkOrderStatus::*;
        match self {
            PendingReview => &[Approved, Flagged],
            Flagged => &[Approved, Resolved, Rejected, FlaggedFollowup],
            FlaggedFollowup => &[Approved, Resolved, Rejected],
            Approved => &[PendingReview, Flagged],
            Resolved => &[Approved, Flagged],
            Rejected => &[PendingReview, Approved],
        }
    }

    /// Re-applying the current status is accepted.
    pub fn can_transition_to(self, next: WorkOrderStatus) -> bool {
        self == next || self.allowed_transitions().contains(&next)
    }

    /// "pending_review" -> "Pending Review"
    pub fn label(self) -> String {
        self.as_ref()
            .split('_')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn counts_as_flagged(self) -> bool {
        matches!(
            self,
            WorkOrderStatus::Flagged | WorkOrderStatus::FlaggedFollowup
        )
    }

    pub fn attribution_slot(self) -> Option<AttributionSlot> {
        match self {
            WorkOrderStatus::PendingReview => None,
            WorkOrderStatus::Approved => Some(AttributionSlot::Approved),
            WorkOrderStatus::Flagged | WorkOrderStatus::FlaggedFollowup => {
                Some(AttributionSlot::Flagged)
            }
            WorkOrderStatus::Resolved => Some(AttributionSlot::Resolved),
            WorkOrderStatus::Rejected => Some(AttributionSlot::Rejected),
        }
    }
}

impl Default for WorkOrderStatus {
    fn default() -> Self {
        WorkOrderStatus::PendingReview
    }
}

/// Who moved the order into its current status, and when.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Attribution {
    pub user: String,
    pub at: Option<DateTime<Utc>>,
}

/// The `work_orders` table.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "work_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Dispatch order number; dedup key for imports.
    #[sea_orm(unique)]
    pub order_no: String,

    pub status: WorkOrderStatus,

    /// When the order was imported.
    pub timestamp: DateTime<Utc>,

    pub service_date: Option<NaiveDate>,
    pub end_time: Option<DateTime<Utc>>,
    pub driver_name: String,
    pub location_name: String,
    pub dispatch_status: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub qc_notes: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub resolution_notes: Option<String>,

    pub duration: Option<String>,
    pub lds: Option<String>,

    pub approved_user: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub flagged_user: Option<String>,
    pub flagged_at: Option<DateTime<Utc>>,
    pub resolved_user: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub rejected_user: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,

    #[sea_orm(column_type = "Json")]
    pub search_response: Json,
    #[sea_orm(column_type = "Json", nullable)]
    pub completion_response: Option<Json>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Attribution for the current status only; stale pairs from earlier
    /// statuses are never reported.
    pub fn attribution(&self) -> Option<Attribution> {
        let (user, at) = match self.status.attribution_slot()? {
            AttributionSlot::Approved => (&self.approved_user, self.approved_at),
            AttributionSlot::Flagged => (&self.flagged_user, self.flagged_at),
            AttributionSlot::Resolved => (&self.resolved_user, self.resolved_at),
            AttributionSlot::Rejected => (&self.rejected_user, self.rejected_at),
        };
        user.as_ref().map(|user| Attribution {
            user: user.clone(),
            at,
        })
    }
}

impl ActiveModel {
    /// Writes `actor`/`at` into the attribution pair that belongs to `status`.
    pub fn stamp_attribution(&mut self, status: WorkOrderStatus, actor: &str, at: DateTime<Utc>) {
        let user = Set(Some(actor.to_string()));
        let when = Set(Some(at));
        match status.attribution_slot() {
            Some(AttributionSlot::Approved) => {
                self.approved_user = user;
                self.approved_at = when;
            }
            Some(AttributionSlot::Flagged) => {
                self.flagged_user = user;
                self.flagged_at = when;
            }
            Some(AttributionSlot::Resolved) => {
                self.resolved_user = user;
                self.resolved_at = when;
            }
            Some(AttributionSlot::Rejected) => {
                self.rejected_user = user;
                self.rejected_at = when;
            }
            None => {}
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();
        if insert && self.created_at.is_not_set() {
            self.created_at = Set(now);
        }
        self.updated_at = Set(now);
        Ok(self)
    }
}
