use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Outbound delivery of prepared food from a branch to a school, tracked by
/// the number of reusable containers sent and returned.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "distributions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub branch_id: Uuid,
    pub school_id: Uuid,
    pub courier_name: String,
    pub container_count: i32,
    pub returned_container: i32,
    pub status: DistributionStatus,
    pub sent_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub created_by_id: Uuid,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistributionStatus {
    /// Sent, nothing returned yet
    #[sea_orm(string_value = "DIKIRIM")]
    Dikirim,

    /// Some containers returned
    #[sea_orm(string_value = "WADAH_KEMBALI_SEBAGIAN")]
    WadahKembaliSebagian,

    /// Every container returned
    #[sea_orm(string_value = "SELESAI")]
    Selesai,
}

impl DistributionStatus {
    /// Derives the status from the returned and sent container counts.
    /// Returns `None` when `returned` is outside `0..=sent`.
    pub fn from_counts(returned: i32, sent: i32) -> Option<Self> {
        if returned < 0 || returned > sent {
            return None;
        }
        Some(if returned == sent {
            DistributionStatus::Selesai
        } else if returned == 0 {
            DistributionStatus::Dikirim
        } else {
            DistributionStatus::WadahKembaliSebagian
        })
    }
}

impl fmt::Display for DistributionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionStatus::Dikirim => write!(f, "DIKIRIM"),
            DistributionStatus::WadahKembaliSebagian => write!(f, "WADAH_KEMBALI_SEBAGIAN"),
            DistributionStatus::Selesai => write!(f, "SELESAI"),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::branch::Entity",
        from = "Column::BranchId",
        to = "super::branch::Column::Id"
    )]
    Branch,
    #[sea_orm(
        belongs_to = "super::school::Entity",
        from = "Column::SchoolId",
        to = "super::school::Column::Id"
    )]
    School,
}

impl Related<super::branch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Branch.def()
    }
}

impl Related<super::school::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::School.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 5, Some(DistributionStatus::Dikirim))]
    #[case(3, 5, Some(DistributionStatus::WadahKembaliSebagian))]
    #[case(5, 5, Some(DistributionStatus::Selesai))]
    #[case(6, 5, None)]
    #[case(-1, 5, None)]
    fn status_follows_returned_count(
        #[case] returned: i32,
        #[case] sent: i32,
        #[case] expected: Option<DistributionStatus>,
    ) {
        assert_eq!(DistributionStatus::from_counts(returned, sent), expected);
    }

    #[test]
    fn partial_status_serializes_with_underscores() {
        assert_eq!(
            serde_json::to_string(&DistributionStatus::WadahKembaliSebagian).unwrap(),
            "\"WADAH_KEMBALI_SEBAGIAN\""
        );
    }
}
