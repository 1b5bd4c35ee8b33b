//! Per (material, branch) quantity ledger.
//!
//! All functions take the caller's connection or transaction so that ledger
//! changes commit or roll back together with the business event that caused
//! them. Decrements are a single conditional `UPDATE ... WHERE qty >= n`, so
//! concurrent shipments against the same row serialize on the row and can
//! never drive it negative.

use crate::auth::Role;
use crate::entities::stock::{self, Entity as StockEntity};
use crate::errors::ServiceError;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

/// Result of an absolute (opname) write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SetOutcome {
    /// Quantity already matched; nothing was written.
    Unchanged(stock::Model),
    /// No record existed; one was created.
    Initialized(stock::Model),
    /// An existing record was overwritten.
    Adjusted {
        stock: stock::Model,
        previous: Decimal,
    },
}

impl SetOutcome {
    pub fn stock(&self) -> &stock::Model {
        match self {
            SetOutcome::Unchanged(stock) | SetOutcome::Initialized(stock) => stock,
            SetOutcome::Adjusted { stock, .. } => stock,
        }
    }

    pub fn into_stock(self) -> stock::Model {
        match self {
            SetOutcome::Unchanged(stock) | SetOutcome::Initialized(stock) => stock,
            SetOutcome::Adjusted { stock, .. } => stock,
        }
    }
}

pub async fn get_stock<C>(
    conn: &C,
    material_id: Uuid,
    branch_id: Uuid,
) -> Result<Option<stock::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    StockEntity::find()
        .filter(stock::Column::MaterialId.eq(material_id))
        .filter(stock::Column::BranchId.eq(branch_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

async fn require_stock<C>(
    conn: &C,
    material_id: Uuid,
    branch_id: Uuid,
) -> Result<stock::Model, ServiceError>
where
    C: ConnectionTrait,
{
    get_stock(conn, material_id, branch_id).await?.ok_or_else(|| {
        ServiceError::InternalError(format!(
            "stock row for material {} at branch {} vanished after write",
            material_id, branch_id
        ))
    })
}

/// Adds `qty` to the record, creating it when absent.
pub async fn increment<C>(
    conn: &C,
    material_id: Uuid,
    branch_id: Uuid,
    qty: Decimal,
) -> Result<stock::Model, ServiceError>
where
    C: ConnectionTrait,
{
    if qty.is_sign_negative() {
        return Err(ServiceError::InvalidInput(format!(
            "increment must not be negative, got {}",
            qty
        )));
    }

    let now = Utc::now();
    let row = stock::ActiveModel {
        id: Set(Uuid::new_v4()),
        material_id: Set(material_id),
        branch_id: Set(branch_id),
        qty: Set(qty),
        created_at: Set(now),
        updated_at: Set(now),
    };

    StockEntity::insert(row)
        .on_conflict(
            OnConflict::columns([stock::Column::MaterialId, stock::Column::BranchId])
                .value(
                    stock::Column::Qty,
                    Expr::col((StockEntity, stock::Column::Qty)).add(qty),
                )
                .value(stock::Column::UpdatedAt, Expr::value(now))
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(ServiceError::db_error)?;

    debug!(%material_id, %branch_id, %qty, "stock incremented");
    require_stock(conn, material_id, branch_id).await
}

/// Removes `qty` from an existing record. Fails with `InsufficientStock`
/// when the record is missing or holds less than `qty`.
pub async fn decrement<C>(
    conn: &C,
    material_id: Uuid,
    branch_id: Uuid,
    qty: Decimal,
) -> Result<stock::Model, ServiceError>
where
    C: ConnectionTrait,
{
    if qty.is_sign_negative() {
        return Err(ServiceError::InvalidInput(format!(
            "decrement must not be negative, got {}",
            qty
        )));
    }

    let result = StockEntity::update_many()
        .col_expr(stock::Column::Qty, Expr::col(stock::Column::Qty).sub(qty))
        .col_expr(stock::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(stock::Column::MaterialId.eq(material_id))
        .filter(stock::Column::BranchId.eq(branch_id))
        .filter(stock::Column::Qty.gte(qty))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        let available = get_stock(conn, material_id, branch_id)
            .await?
            .map(|s| s.qty)
            .unwrap_or(Decimal::ZERO);
        warn!(%material_id, %branch_id, requested = %qty, %available, "stock decrement refused");
        return Err(ServiceError::InsufficientStock(format!(
            "requested {}, available {}",
            qty, available
        )));
    }

    debug!(%material_id, %branch_id, %qty, "stock decremented");
    require_stock(conn, material_id, branch_id).await
}

/// Signed adjustment: positive deltas increment, negative deltas decrement.
pub async fn adjust<C>(
    conn: &C,
    material_id: Uuid,
    branch_id: Uuid,
    delta: Decimal,
) -> Result<stock::Model, ServiceError>
where
    C: ConnectionTrait,
{
    if delta.is_sign_negative() {
        decrement(conn, material_id, branch_id, -delta).await
    } else {
        increment(conn, material_id, branch_id, delta).await
    }
}

/// Overwrites the quantity of a record. Only central admins may create a
/// record this way; everyone else can only correct stock that already
/// arrived through a request.
pub async fn set_absolute<C>(
    conn: &C,
    material_id: Uuid,
    branch_id: Uuid,
    qty: Decimal,
    actor_role: Role,
) -> Result<SetOutcome, ServiceError>
where
    C: ConnectionTrait,
{
    if qty.is_sign_negative() {
        return Err(ServiceError::InvalidInput(format!(
            "stock quantity must not be negative, got {}",
            qty
        )));
    }

    let current = get_stock(conn, material_id, branch_id).await?;

    match current {
        None if actor_role != Role::CentralAdmin => Err(ServiceError::Forbidden(
            "no stock record exists yet for this branch; stock must first arrive through a request"
                .to_string(),
        )),
        Some(existing) if existing.qty == qty => Ok(SetOutcome::Unchanged(existing)),
        Some(existing) => {
            let previous = existing.qty;
            let mut row: stock::ActiveModel = existing.into();
            row.qty = Set(qty);
            row.updated_at = Set(Utc::now());
            let stock = row.update(conn).await.map_err(ServiceError::db_error)?;
            Ok(SetOutcome::Adjusted { stock, previous })
        }
        None => {
            let now = Utc::now();
            let row = stock::ActiveModel {
                id: Set(Uuid::new_v4()),
                material_id: Set(material_id),
                branch_id: Set(branch_id),
                qty: Set(qty),
                created_at: Set(now),
                updated_at: Set(now),
            };
            // A concurrent initialization of the same pair collapses into an overwrite.
            StockEntity::insert(row)
                .on_conflict(
                    OnConflict::columns([stock::Column::MaterialId, stock::Column::BranchId])
                        .update_columns([stock::Column::Qty, stock::Column::UpdatedAt])
                        .to_owned(),
                )
                .exec_without_returning(conn)
                .await
                .map_err(ServiceError::db_error)?;
            let stock = require_stock(conn, material_id, branch_id).await?;
            Ok(SetOutcome::Initialized(stock))
        }
    }
}
