//! Stock listing and physical counts (stock opname).

use crate::auth::{authorize, Actor, Operation};
use crate::common::{PageRequest, Paginated};
use crate::entities::{
    branch,
    material,
    stock::{self, Entity as StockEntity},
};
use crate::errors::ServiceError;
use crate::services::activity_log::{self, ActivityAction};
use crate::services::stock_ledger::{self, SetOutcome};
use crate::services::directory;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, JoinType, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Select, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StockOpname {
    pub branch_id: Uuid,
    pub material_id: Uuid,
    pub qty: Decimal,
    #[validate(length(min = 1, max = 255, message = "A reason for the count is required"))]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockFilter {
    pub branch_id: Option<Uuid>,
    pub search: Option<String>,
}

/// Stock row joined with its material and branch.
#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult)]
pub struct StockView {
    pub id: Uuid,
    pub material_id: Uuid,
    pub branch_id: Uuid,
    pub qty: Decimal,
    pub updated_at: DateTime<Utc>,
    pub material_name: String,
    pub unit: String,
    pub branch_name: String,
    pub is_center: bool,
}

#[derive(Clone)]
pub struct StockService {
    db_pool: Arc<DatabaseConnection>,
}

impl StockService {
    pub fn new(db_pool: Arc<DatabaseConnection>) -> Self {
        Self { db_pool }
    }

    /// Overwrites a branch's quantity with a physical count. A count equal to
    /// the recorded quantity writes nothing, not even an audit entry.
    #[instrument(skip(self, input), fields(actor = %actor.id, branch_id = %input.branch_id))]
    pub async fn opname(
        &self,
        actor: &Actor,
        input: StockOpname,
    ) -> Result<stock::Model, ServiceError> {
        authorize(actor, Operation::StockOpname, Some(input.branch_id)).into_result()?;
        input.validate()?;

        if input.qty.is_sign_negative() {
            return Err(ServiceError::InvalidInput(
                "Counted quantity must not be negative".to_string(),
            ));
        }

        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;

        let material = directory::find_material(&txn, input.material_id).await?;
        if !material.is_active {
            return Err(ServiceError::InvalidInput(format!(
                "Material '{}' is inactive",
                material.name
            )));
        }
        let branch = directory::find_branch(&txn, input.branch_id).await?;
        if !branch.is_active {
            return Err(ServiceError::InvalidInput(format!(
                "Branch '{}' is inactive",
                branch.name
            )));
        }

        let outcome = stock_ledger::set_absolute(
            &txn,
            input.material_id,
            input.branch_id,
            input.qty,
            actor.role,
        )
        .await?;

        let (previous, kind) = match &outcome {
            SetOutcome::Unchanged(_) => {
                txn.commit().await.map_err(ServiceError::db_error)?;
                return Ok(outcome.into_stock());
            }
            SetOutcome::Initialized(_) => (Decimal::ZERO, "INITIALIZATION"),
            SetOutcome::Adjusted { previous, .. } => (*previous, "ADJUSTMENT"),
        };

        activity_log::record(
            &txn,
            actor.id,
            ActivityAction::StockOpname,
            json!({
                "branch": branch.name,
                "material": material.name,
                "reason": input.reason,
                "changes": {
                    "from": previous,
                    "to": input.qty,
                    "difference": input.qty - previous,
                    "type": kind,
                },
            }),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(material = %material.name, from = %previous, to = %input.qty, kind, "stock counted");

        Ok(outcome.into_stock())
    }

    /// Lists stock with the central warehouse first, then by material name.
    #[instrument(skip(self, filter), fields(actor = %actor.id))]
    pub async fn find_all(
        &self,
        actor: &Actor,
        filter: StockFilter,
        page: PageRequest,
    ) -> Result<Paginated<StockView>, ServiceError> {
        let branch_id = actor.scope_branch(filter.branch_id);
        authorize(actor, Operation::ViewStock, branch_id).into_result()?;

        let mut query = stock_view_query();
        if let Some(branch_id) = branch_id {
            query = query.filter(stock::Column::BranchId.eq(branch_id));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query = query.filter(
                Expr::expr(Func::lower(Expr::col((material::Entity, material::Column::Name))))
                    .like(format!("%{}%", search.to_lowercase())),
            );
        }

        let page_index = page.index()?;
        let paginator = query
            .order_by_desc(branch::Column::IsCenter)
            .order_by_asc(material::Column::Name)
            .into_model::<StockView>()
            .paginate(&*self.db_pool, page.limit);
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let data = paginator
            .fetch_page(page_index)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(Paginated::new(data, total, page))
    }

    #[instrument(skip(self), fields(actor = %actor.id))]
    pub async fn find_one(&self, actor: &Actor, stock_id: Uuid) -> Result<StockView, ServiceError> {
        let view = stock_view_query()
            .filter(stock::Column::Id.eq(stock_id))
            .into_model::<StockView>()
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Stock {} not found", stock_id)))?;

        authorize(actor, Operation::ViewStock, Some(view.branch_id)).into_result()?;
        Ok(view)
    }
}

fn stock_view_query() -> Select<StockEntity> {
    StockEntity::find()
        .select_only()
        .column(stock::Column::Id)
        .column(stock::Column::MaterialId)
        .column(stock::Column::BranchId)
        .column(stock::Column::Qty)
        .column(stock::Column::UpdatedAt)
        .column_as(material::Column::Name, "material_name")
        .column_as(material::Column::Unit, "unit")
        .column_as(branch::Column::Name, "branch_name")
        .column_as(branch::Column::IsCenter, "is_center")
        .join(JoinType::InnerJoin, stock::Relation::Material.def())
        .join(JoinType::InnerJoin, stock::Relation::Branch.def())
}
