use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub branch_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Actor role. The legacy role names issued by the authentication module are
/// accepted as aliases when decoding tokens.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum Role {
    #[sea_orm(string_value = "CENTRAL_ADMIN")]
    #[serde(rename = "CENTRAL_ADMIN", alias = "ADMIN_PUSAT")]
    CentralAdmin,

    #[sea_orm(string_value = "BRANCH_ADMIN")]
    #[serde(rename = "BRANCH_ADMIN", alias = "ADMIN_CABANG")]
    BranchAdmin,

    #[sea_orm(string_value = "COURIER")]
    #[serde(rename = "COURIER", alias = "KURIR")]
    Courier,
}

impl Role {
    /// Roles whose every capability is bound to the actor's own branch
    pub fn requires_branch(&self) -> bool {
        matches!(self, Role::BranchAdmin | Role::Courier)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::CentralAdmin => write!(f, "CENTRAL_ADMIN"),
            Role::BranchAdmin => write!(f, "BRANCH_ADMIN"),
            Role::Courier => write!(f, "COURIER"),
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
}

impl Related<super::branch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Branch.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
