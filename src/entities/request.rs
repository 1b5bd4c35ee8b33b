use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A branch's material request to the central warehouse.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub branch_id: Uuid,
    pub status: RequestStatus,
    pub notes: Option<String>,
    pub processed_by_id: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub request_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,

    #[sea_orm(string_value = "APPROVED")]
    Approved,

    #[sea_orm(string_value = "SHIPPED")]
    Shipped,

    #[sea_orm(string_value = "RECEIVED")]
    Received,

    #[sea_orm(string_value = "REJECTED")]
    Rejected,
}

impl RequestStatus {
    /// PENDING -> APPROVED -> SHIPPED -> RECEIVED, or PENDING -> REJECTED.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Pending, RequestStatus::Approved)
                | (RequestStatus::Pending, RequestStatus::Rejected)
                | (RequestStatus::Approved, RequestStatus::Shipped)
                | (RequestStatus::Shipped, RequestStatus::Received)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Received | RequestStatus::Rejected)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "PENDING"),
            RequestStatus::Approved => write!(f, "APPROVED"),
            RequestStatus::Shipped => write!(f, "SHIPPED"),
            RequestStatus::Received => write!(f, "RECEIVED"),
            RequestStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::request_item::Entity")]
    Items,
    #[sea_orm(
        belongs_to = "super::branch::Entity",
        from = "Column::BranchId",
        to = "super::branch::Column::Id"
    )]
    Branch,
}

impl Related<super::request_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl Related<super::branch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Branch.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
