//! Meal deliveries from a branch kitchen to schools and the return of their
//! food containers.

use crate::auth::{authorize, Actor, Operation};
use crate::common::{date_range, PageRequest, Paginated};
use crate::entities::distribution::{self, DistributionStatus, Entity as DistributionEntity};
use crate::errors::ServiceError;
use crate::services::activity_log::{self, ActivityAction};
use crate::services::directory;
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewDistribution {
    pub school_id: Uuid,
    #[validate(length(min = 1, max = 100, message = "Courier name must be 1-100 characters"))]
    pub courier_name: String,
    #[validate(range(min = 1, message = "At least one container must be sent"))]
    pub container_count: i32,
}

impl NewDistribution {
    /// Surrounding whitespace never counts towards the courier name.
    fn trimmed(mut self) -> Self {
        self.courier_name = self.courier_name.trim().to_string();
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistributionFilter {
    pub school_id: Option<Uuid>,
    pub status: Option<DistributionStatus>,
    pub date: Option<NaiveDate>,
}

#[derive(Clone)]
pub struct DistributionService {
    db_pool: Arc<DatabaseConnection>,
}

impl DistributionService {
    pub fn new(db_pool: Arc<DatabaseConnection>) -> Self {
        Self { db_pool }
    }

    /// Records a delivery leaving the actor's branch.
    #[instrument(skip(self, input), fields(actor = %actor.id))]
    pub async fn create(
        &self,
        actor: &Actor,
        input: NewDistribution,
    ) -> Result<distribution::Model, ServiceError> {
        authorize(actor, Operation::CreateDistribution, actor.branch_id).into_result()?;
        let input = input.trimmed();
        input.validate()?;

        let branch_id = actor
            .branch_id
            .ok_or_else(|| ServiceError::Forbidden("Actor is not assigned to a branch".to_string()))?;

        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;

        let branch = directory::find_branch(&txn, branch_id).await?;
        if !branch.is_active {
            return Err(ServiceError::Forbidden(format!(
                "Branch '{}' is inactive",
                branch.name
            )));
        }
        let school = directory::find_school(&txn, input.school_id).await?;
        if !school.is_active {
            return Err(ServiceError::InvalidInput(format!(
                "School '{}' is inactive",
                school.name
            )));
        }

        let distribution = distribution::ActiveModel {
            id: Set(Uuid::new_v4()),
            branch_id: Set(branch_id),
            school_id: Set(school.id),
            courier_name: Set(input.courier_name),
            container_count: Set(input.container_count),
            returned_container: Set(0),
            status: Set(DistributionStatus::Dikirim),
            sent_at: Set(Utc::now()),
            returned_at: Set(None),
            created_by_id: Set(actor.id),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        activity_log::record(
            &txn,
            actor.id,
            ActivityAction::DistributionSent,
            json!({
                "distributionId": distribution.id,
                "school": school.name,
                "containers": distribution.container_count,
                "courier": distribution.courier_name,
            }),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(distribution_id = %distribution.id, school = %school.name, "distribution sent");

        Ok(distribution)
    }

    /// Sets the cumulative number of returned containers and re-derives the
    /// status from it.
    #[instrument(skip(self), fields(actor = %actor.id))]
    pub async fn update_return(
        &self,
        actor: &Actor,
        distribution_id: Uuid,
        returned_container: i32,
    ) -> Result<distribution::Model, ServiceError> {
        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;

        let existing = DistributionEntity::find_by_id(distribution_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Distribution {} not found", distribution_id))
            })?;

        authorize(
            actor,
            Operation::UpdateDistributionReturn,
            Some(existing.branch_id),
        )
        .into_result()?;

        let sent = existing.container_count;
        let status = DistributionStatus::from_counts(returned_container, sent).ok_or_else(|| {
            ServiceError::InvalidInput(format!(
                "Returned containers must be between 0 and {}, got {}",
                sent, returned_container
            ))
        })?;

        let mut row: distribution::ActiveModel = existing.into();
        row.returned_container = Set(returned_container);
        row.status = Set(status);
        row.returned_at = Set((status == DistributionStatus::Selesai).then(Utc::now));
        let distribution = row.update(&txn).await.map_err(ServiceError::db_error)?;

        activity_log::record(
            &txn,
            actor.id,
            ActivityAction::DistributionReturnUpdate,
            json!({
                "distributionId": distribution.id,
                "sent": sent,
                "returned": returned_container,
                "status": status,
            }),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(distribution_id = %distribution.id, %status, "container return updated");

        Ok(distribution)
    }

    /// Lists deliveries newest first, branch admins scoped to their own branch.
    #[instrument(skip(self, filter), fields(actor = %actor.id))]
    pub async fn find_all(
        &self,
        actor: &Actor,
        filter: DistributionFilter,
        page: PageRequest,
    ) -> Result<Paginated<distribution::Model>, ServiceError> {
        let branch_id = actor.scope_branch(None);
        authorize(actor, Operation::ViewDistribution, branch_id).into_result()?;

        let mut query = DistributionEntity::find();
        if let Some(branch_id) = branch_id {
            query = query.filter(distribution::Column::BranchId.eq(branch_id));
        }
        if let Some(school_id) = filter.school_id {
            query = query.filter(distribution::Column::SchoolId.eq(school_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(distribution::Column::Status.eq(status));
        }
        if let Some(date) = filter.date {
            let (from, until) = date_range(date, date)?;
            query = query
                .filter(distribution::Column::SentAt.gte(from))
                .filter(distribution::Column::SentAt.lt(until));
        }

        let page_index = page.index()?;
        let paginator = query
            .order_by_desc(distribution::Column::SentAt)
            .paginate(&*self.db_pool, page.limit);
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let data = paginator
            .fetch_page(page_index)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(Paginated::new(data, total, page))
    }

    #[instrument(skip(self), fields(actor = %actor.id))]
    pub async fn find_one(
        &self,
        actor: &Actor,
        distribution_id: Uuid,
    ) -> Result<distribution::Model, ServiceError> {
        let distribution = DistributionEntity::find_by_id(distribution_id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Distribution {} not found", distribution_id))
            })?;

        authorize(actor, Operation::ViewDistribution, Some(distribution.branch_id)).into_result()?;
        Ok(distribution)
    }
}
