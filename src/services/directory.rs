//! Branch, material, school and user directory.
//!
//! The lookups are free functions over any connection so the request and
//! stock services can call them inside their own transactions. Mutations go
//! through [`DirectoryService`], which enforces the integrity rules: unique
//! names, a single center branch, and no hard delete while other rows still
//! reference the record.

use crate::auth::{authorize, Actor, Operation, Role};
use crate::entities::{
    branch::{self, Entity as BranchEntity},
    distribution::{self, Entity as DistributionEntity},
    material::{self, Entity as MaterialEntity},
    request::{self, Entity as RequestEntity},
    request_item::{self, Entity as RequestItemEntity},
    school::{self, Entity as SchoolEntity},
    stock::{self, Entity as StockEntity},
    user::{self, Entity as UserEntity},
};
use crate::errors::ServiceError;
use crate::services::activity_log::{self, ActivityAction};
use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

pub async fn find_branch<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<branch::Model, ServiceError> {
    BranchEntity::find_by_id(id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Branch {} not found", id)))
}

pub async fn find_center_branch<C: ConnectionTrait>(
    conn: &C,
) -> Result<branch::Model, ServiceError> {
    BranchEntity::find()
        .filter(branch::Column::IsCenter.eq(true))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound("Central warehouse branch is not configured".to_string()))
}

pub async fn find_material<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<material::Model, ServiceError> {
    MaterialEntity::find_by_id(id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Material {} not found", id)))
}

pub async fn find_school<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<school::Model, ServiceError> {
    SchoolEntity::find_by_id(id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("School {} not found", id)))
}

/// Active branch admins of a branch, the recipients of request notifications.
pub async fn branch_admins<C: ConnectionTrait>(
    conn: &C,
    branch_id: Uuid,
) -> Result<Vec<user::Model>, ServiceError> {
    UserEntity::find()
        .filter(user::Column::BranchId.eq(branch_id))
        .filter(user::Column::Role.eq(Role::BranchAdmin))
        .filter(user::Column::IsActive.eq(true))
        .order_by_asc(user::Column::Name)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewBranch {
    #[validate(length(min = 1, max = 100, message = "Branch name must be 1-100 characters"))]
    pub name: String,
    pub address: Option<String>,
    #[serde(default)]
    pub is_center: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewMaterial {
    #[validate(length(min = 1, max = 100, message = "Material name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 20, message = "Unit must be 1-20 characters"))]
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewSchool {
    #[validate(length(min = 1, max = 150, message = "School name must be 1-150 characters"))]
    pub name: String,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewUser {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub role: Role,
    pub branch_id: Option<Uuid>,
}

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

impl NewBranch {
    fn trimmed(mut self) -> Self {
        trim_in_place(&mut self.name);
        self
    }
}

impl NewMaterial {
    fn trimmed(mut self) -> Self {
        trim_in_place(&mut self.name);
        trim_in_place(&mut self.unit);
        self
    }
}

impl NewSchool {
    fn trimmed(mut self) -> Self {
        trim_in_place(&mut self.name);
        self
    }
}

impl NewUser {
    fn trimmed(mut self) -> Self {
        trim_in_place(&mut self.name);
        self.email = self.email.trim().to_lowercase();
        self
    }
}

/// Service for maintaining the directory records the core depends on
#[derive(Clone)]
pub struct DirectoryService {
    db_pool: Arc<DatabaseConnection>,
}

impl DirectoryService {
    pub fn new(db_pool: Arc<DatabaseConnection>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self, input), fields(actor = %actor.id))]
    pub async fn register_branch(
        &self,
        actor: &Actor,
        input: NewBranch,
    ) -> Result<branch::Model, ServiceError> {
        authorize(actor, Operation::ManageDirectory, None).into_result()?;
        let input = input.trimmed();
        input.validate()?;
        let name = input.name.clone();
        let is_center = input.is_center;

        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;

        let duplicate = BranchEntity::find()
            .filter(Expr::expr(Func::lower(Expr::col(branch::Column::Name))).eq(name.to_lowercase()))
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if duplicate.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Branch name '{}' is already in use",
                name
            )));
        }

        if is_center {
            let existing_center = BranchEntity::find()
                .filter(branch::Column::IsCenter.eq(true))
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?;
            if let Some(center) = existing_center {
                return Err(ServiceError::Conflict(format!(
                    "Branch '{}' is already the central warehouse",
                    center.name
                )));
            }
        }

        let now = Utc::now();
        let branch = branch::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.clone()),
            address: Set(input.address),
            is_center: Set(is_center),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        // A concurrent registration got past the checks above first.
        .map_err(|e| {
            ServiceError::unique_conflict(e, || {
                if is_center {
                    format!("Branch '{}' conflicts with an existing name or central warehouse", name)
                } else {
                    format!("Branch name '{}' is already in use", name)
                }
            })
        })?;

        activity_log::record(
            &txn,
            actor.id,
            ActivityAction::CreateBranch,
            json!({ "branchId": branch.id, "name": branch.name, "isCenter": branch.is_center }),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(branch_id = %branch.id, "branch registered");
        Ok(branch)
    }

    #[instrument(skip(self), fields(actor = %actor.id))]
    pub async fn set_branch_active(
        &self,
        actor: &Actor,
        branch_id: Uuid,
        active: bool,
    ) -> Result<branch::Model, ServiceError> {
        authorize(actor, Operation::ManageDirectory, None).into_result()?;

        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;
        let existing = find_branch(&txn, branch_id).await?;

        let mut row: branch::ActiveModel = existing.into();
        row.is_active = Set(active);
        row.updated_at = Set(Utc::now());
        let branch = row.update(&txn).await.map_err(ServiceError::db_error)?;

        activity_log::record(
            &txn,
            actor.id,
            ActivityAction::UpdateBranch,
            json!({ "branchId": branch.id, "isActive": active }),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(branch)
    }

    /// Hard delete, only while nothing references the branch.
    #[instrument(skip(self), fields(actor = %actor.id))]
    pub async fn remove_branch(&self, actor: &Actor, branch_id: Uuid) -> Result<(), ServiceError> {
        authorize(actor, Operation::ManageDirectory, None).into_result()?;

        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;
        let branch = find_branch(&txn, branch_id).await?;

        let users = UserEntity::find()
            .filter(user::Column::BranchId.eq(branch_id))
            .count(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let stocks = StockEntity::find()
            .filter(stock::Column::BranchId.eq(branch_id))
            .count(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let requests = RequestEntity::find()
            .filter(request::Column::BranchId.eq(branch_id))
            .count(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let distributions = DistributionEntity::find()
            .filter(distribution::Column::BranchId.eq(branch_id))
            .count(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        if users + stocks + requests + distributions > 0 {
            warn!(%branch_id, users, stocks, requests, distributions, "branch removal refused");
            return Err(ServiceError::Conflict(format!(
                "Branch '{}' still has {} users, {} stock records, {} requests and {} distributions; deactivate it instead",
                branch.name, users, stocks, requests, distributions
            )));
        }

        BranchEntity::delete_by_id(branch_id)
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        activity_log::record(
            &txn,
            actor.id,
            ActivityAction::DeleteBranch,
            json!({ "branchId": branch_id, "name": branch.name }),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(%branch_id, "branch removed");
        Ok(())
    }

    #[instrument(skip(self, input), fields(actor = %actor.id))]
    pub async fn register_material(
        &self,
        actor: &Actor,
        input: NewMaterial,
    ) -> Result<material::Model, ServiceError> {
        authorize(actor, Operation::ManageDirectory, None).into_result()?;
        let input = input.trimmed();
        input.validate()?;
        let name = input.name.clone();

        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;

        let duplicate = MaterialEntity::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(material::Column::Name))).eq(name.to_lowercase()),
            )
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if let Some(existing) = duplicate {
            return Err(ServiceError::Conflict(format!(
                "Material '{}' already exists",
                existing.name
            )));
        }

        let now = Utc::now();
        let material = material::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.clone()),
            unit: Set(input.unit),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            ServiceError::unique_conflict(e, || format!("Material '{}' already exists", name))
        })?;

        activity_log::record(
            &txn,
            actor.id,
            ActivityAction::CreateMaterial,
            json!({ "materialId": material.id, "name": material.name, "unit": material.unit }),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(material_id = %material.id, "material registered");
        Ok(material)
    }

    #[instrument(skip(self), fields(actor = %actor.id))]
    pub async fn set_material_active(
        &self,
        actor: &Actor,
        material_id: Uuid,
        active: bool,
    ) -> Result<material::Model, ServiceError> {
        authorize(actor, Operation::ManageDirectory, None).into_result()?;

        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;
        let existing = find_material(&txn, material_id).await?;

        let mut row: material::ActiveModel = existing.into();
        row.is_active = Set(active);
        row.updated_at = Set(Utc::now());
        let material = row.update(&txn).await.map_err(ServiceError::db_error)?;

        activity_log::record(
            &txn,
            actor.id,
            ActivityAction::UpdateMaterial,
            json!({ "materialId": material.id, "isActive": active }),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(material)
    }

    /// Hard delete, only while no stock record or request item references the material.
    #[instrument(skip(self), fields(actor = %actor.id))]
    pub async fn remove_material(
        &self,
        actor: &Actor,
        material_id: Uuid,
    ) -> Result<(), ServiceError> {
        authorize(actor, Operation::ManageDirectory, None).into_result()?;

        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;
        let material = find_material(&txn, material_id).await?;

        let stocks = StockEntity::find()
            .filter(stock::Column::MaterialId.eq(material_id))
            .count(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let request_items = RequestItemEntity::find()
            .filter(request_item::Column::MaterialId.eq(material_id))
            .count(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        if stocks + request_items > 0 {
            warn!(%material_id, stocks, request_items, "material removal refused");
            return Err(ServiceError::Conflict(format!(
                "Material '{}' is referenced by {} stock records and {} request items; deactivate it instead",
                material.name, stocks, request_items
            )));
        }

        MaterialEntity::delete_by_id(material_id)
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        activity_log::record(
            &txn,
            actor.id,
            ActivityAction::DeleteMaterial,
            json!({ "materialId": material_id, "name": material.name }),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(%material_id, "material removed");
        Ok(())
    }

    #[instrument(skip(self, input), fields(actor = %actor.id))]
    pub async fn register_school(
        &self,
        actor: &Actor,
        input: NewSchool,
    ) -> Result<school::Model, ServiceError> {
        authorize(actor, Operation::ManageDirectory, None).into_result()?;
        let input = input.trimmed();
        input.validate()?;

        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;

        let school = school::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            address: Set(input.address),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        activity_log::record(
            &txn,
            actor.id,
            ActivityAction::CreateSchool,
            json!({ "schoolId": school.id, "name": school.name }),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(school)
    }

    #[instrument(skip(self, input), fields(actor = %actor.id))]
    pub async fn register_user(
        &self,
        actor: &Actor,
        input: NewUser,
    ) -> Result<user::Model, ServiceError> {
        authorize(actor, Operation::ManageDirectory, None).into_result()?;
        let input = input.trimmed();
        input.validate()?;

        if input.role.requires_branch() && input.branch_id.is_none() {
            return Err(ServiceError::InvalidInput(format!(
                "{} users must be assigned to a branch",
                input.role
            )));
        }

        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;

        if let Some(branch_id) = input.branch_id {
            find_branch(&txn, branch_id).await?;
        }

        let email = input.email.clone();
        let taken = UserEntity::find()
            .filter(user::Column::Email.eq(email.clone()))
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if taken.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let user = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            email: Set(email.clone()),
            role: Set(input.role),
            branch_id: Set(input.branch_id),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            ServiceError::unique_conflict(e, || format!("Email '{}' is already registered", email))
        })?;

        activity_log::record(
            &txn,
            actor.id,
            ActivityAction::CreateUser,
            json!({ "userId": user.id, "role": user.role, "branchId": user.branch_id }),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(user)
    }
}
