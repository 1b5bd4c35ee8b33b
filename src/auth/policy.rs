//! Capability checks evaluated before any mutation or read.
//!
//! `authorize` is a pure function of the actor, the operation and the branch
//! the operation targets, so every role rule lives in one table instead of
//! being scattered through the services.

use super::{Actor, Role};
use crate::errors::ServiceError;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operation {
    CreateRequest,
    ViewRequest,
    ApproveRequest,
    RejectRequest,
    ShipRequest,
    ReceiveRequest,
    StockOpname,
    ViewStock,
    CreateDistribution,
    ViewDistribution,
    UpdateDistributionReturn,
    ManageDirectory,
}

impl Operation {
    /// Operations a branch admin may perform, but only against their own branch.
    fn is_branch_scoped(&self) -> bool {
        matches!(
            self,
            Operation::CreateRequest
                | Operation::ViewRequest
                | Operation::ReceiveRequest
                | Operation::StockOpname
                | Operation::ViewStock
                | Operation::CreateDistribution
                | Operation::ViewDistribution
                | Operation::UpdateDistributionReturn
        )
    }

    /// Operations that originate at a branch and are never performed centrally.
    fn is_branch_only(&self) -> bool {
        matches!(
            self,
            Operation::CreateRequest
                | Operation::CreateDistribution
                | Operation::UpdateDistributionReturn
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> Result<(), ServiceError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(ServiceError::Forbidden(reason)),
        }
    }
}

pub fn authorize(actor: &Actor, operation: Operation, target_branch: Option<Uuid>) -> Decision {
    if actor.role.requires_branch() && actor.branch_id.is_none() {
        return Decision::Deny(format!(
            "{} {} is not assigned to any branch",
            actor.role, actor.id
        ));
    }

    match actor.role {
        Role::CentralAdmin => {
            if operation.is_branch_only() {
                Decision::Deny(format!("{operation} can only be performed by a branch admin"))
            } else {
                Decision::Allow
            }
        }
        Role::BranchAdmin => {
            if !operation.is_branch_scoped() {
                return Decision::Deny(format!("branch admins may not perform {operation}"));
            }
            match (operation, target_branch) {
                // Creation always lands on the actor's own branch
                (Operation::CreateRequest | Operation::CreateDistribution, None) => Decision::Allow,
                (_, Some(target)) if Some(target) == actor.branch_id => Decision::Allow,
                (_, Some(_)) => Decision::Deny(format!(
                    "{operation} denied: the data belongs to another branch"
                )),
                (_, None) => Decision::Deny(format!("{operation} requires a target branch")),
            }
        }
        Role::Courier => Decision::Deny(format!("couriers may not perform {operation}")),
    }
}
