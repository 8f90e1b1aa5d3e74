use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One scheduled stop as last seen on the dispatch routes, upserted by `order_no`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "reports")]
#[schema(as = Report)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub org_id: String,
    #[sea_orm(unique)]
    pub order_no: String,
    /// Completion status, or "Scheduled" when nothing was reported yet
    pub status: String,
    pub dispatch_status: Option<String>,
    pub scheduled_time: Option<String>,
    pub end_time: Option<String>,
    pub cust_name: Option<String>,
    /// Customer name up to the first `#`
    pub cust_group: Option<String>,
    pub tech_name: Option<String>,
    pub region: Option<String>,
    pub report_date: NaiveDate,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {}
