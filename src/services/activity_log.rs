//! Append-only audit trail.
//!
//! Every mutating operation calls [`record`] with the same transaction it uses
//! for the business change, so a failed audit insert aborts the change itself.

use crate::entities::log_activity;
use crate::errors::ServiceError;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use tracing::debug;
use uuid::Uuid;

/// Action tags written to `log_activities.action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityAction {
    CreateRequest,
    ApproveRequest,
    ShipRequest,
    ReceiveRequest,
    RejectRequest,
    StockOpname,
    DistributionSent,
    DistributionReturnUpdate,
    CreateBranch,
    UpdateBranch,
    DeleteBranch,
    CreateMaterial,
    UpdateMaterial,
    DeleteMaterial,
    CreateSchool,
    CreateUser,
}

pub async fn record<C>(
    conn: &C,
    actor_id: Uuid,
    action: ActivityAction,
    details: Value,
) -> Result<log_activity::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let entry = log_activity::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(actor_id),
        action: Set(action.to_string()),
        details: Set(details),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)?;

    debug!(actor_id = %actor_id, action = %action, "activity recorded");
    Ok(entry)
}
