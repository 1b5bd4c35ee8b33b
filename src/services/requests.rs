//! Material request lifecycle.
//!
//! PENDING -> APPROVED -> SHIPPED -> RECEIVED, or PENDING -> REJECTED. Each
//! transition runs in one transaction together with its ledger changes and its
//! audit entry. The status change itself is a conditional update on the
//! expected current status, so of two concurrent callers only one can win.

use crate::auth::{authorize, Actor, Operation};
use crate::common::{date_range, PageRequest, Paginated};
use crate::entities::{
    material::{self, Entity as MaterialEntity},
    request::{self, Entity as RequestEntity, RequestStatus},
    request_item::{self, Entity as RequestItemEntity},
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::activity_log::{self, ActivityAction};
use crate::services::{directory, request_code, stock_ledger};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRequestItem {
    pub material_id: Uuid,
    pub qty: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewRequest {
    #[validate(length(min = 1, message = "A request needs at least one item"))]
    pub items: Vec<NewRequestItem>,
    pub notes: Option<String>,
}

/// Approved quantity for one item. Items left out are granted in full.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ItemApproval {
    pub item_id: Uuid,
    pub qty_approved: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub branch_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestWithItems {
    #[serde(flatten)]
    pub request: request::Model,
    pub items: Vec<request_item::Model>,
}

/// Service driving requests through their lifecycle
#[derive(Clone)]
pub struct RequestService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl RequestService {
    pub fn new(db_pool: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Opens a PENDING request for the actor's own branch.
    #[instrument(skip(self, input), fields(actor = %actor.id))]
    pub async fn create(
        &self,
        actor: &Actor,
        input: NewRequest,
    ) -> Result<RequestWithItems, ServiceError> {
        authorize(actor, Operation::CreateRequest, actor.branch_id).into_result()?;
        input.validate()?;

        let branch_id = actor
            .branch_id
            .ok_or_else(|| ServiceError::Forbidden("Actor is not assigned to a branch".to_string()))?;

        if let Some(item) = input.items.iter().find(|item| item.qty <= Decimal::ZERO) {
            return Err(ServiceError::InvalidInput(format!(
                "Quantity for material {} must be greater than zero",
                item.material_id
            )));
        }

        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;

        let branch = directory::find_branch(&txn, branch_id).await?;
        if !branch.is_active {
            return Err(ServiceError::Forbidden(format!(
                "Branch '{}' is inactive",
                branch.name
            )));
        }

        for item in &input.items {
            directory::find_material(&txn, item.material_id).await?;
        }

        let now = Utc::now();
        let code = request_code::next_request_code(&txn, now.date_naive()).await?;

        let request = request::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code),
            branch_id: Set(branch_id),
            status: Set(RequestStatus::Pending),
            notes: Set(input.notes.filter(|n| !n.trim().is_empty())),
            processed_by_id: Set(None),
            processed_at: Set(None),
            request_date: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        let mut items = Vec::with_capacity(input.items.len());
        for item in input.items {
            let saved = request_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                request_id: Set(request.id),
                material_id: Set(item.material_id),
                qty: Set(item.qty),
                qty_approved: Set(None),
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::db_error)?;
            items.push(saved);
        }

        activity_log::record(
            &txn,
            actor.id,
            ActivityAction::CreateRequest,
            json!({
                "requestId": request.id,
                "code": request.code,
                "itemCount": items.len(),
            }),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(request_id = %request.id, code = %request.code, "request created");

        Ok(RequestWithItems { request, items })
    }

    /// Approves a PENDING request, optionally trimming per-item quantities.
    #[instrument(skip(self, approvals), fields(actor = %actor.id))]
    pub async fn approve(
        &self,
        actor: &Actor,
        request_id: Uuid,
        approvals: Vec<ItemApproval>,
    ) -> Result<RequestWithItems, ServiceError> {
        authorize(actor, Operation::ApproveRequest, None).into_result()?;

        if let Some(approval) = approvals.iter().find(|a| a.qty_approved.is_sign_negative()) {
            return Err(ServiceError::InvalidInput(format!(
                "Approved quantity for item {} must not be negative",
                approval.item_id
            )));
        }

        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;
        let request = lock_request(&txn, request_id).await?;
        ensure_transition(&request, RequestStatus::Approved)?;

        let items = load_items(&txn, request.id).await?;
        let mut granted: HashMap<Uuid, Decimal> = approvals
            .iter()
            .map(|a| (a.item_id, a.qty_approved))
            .collect();

        if let Some(unknown) = granted.keys().find(|id| !items.iter().any(|i| i.id == **id)) {
            return Err(ServiceError::InvalidInput(format!(
                "Item {} does not belong to request {}",
                unknown, request.code
            )));
        }

        let mut approved_items = Vec::with_capacity(items.len());
        for item in items {
            let qty_approved = granted.remove(&item.id).unwrap_or(item.qty);
            let mut row: request_item::ActiveModel = item.into();
            row.qty_approved = Set(Some(qty_approved));
            approved_items.push(row.update(&txn).await.map_err(ServiceError::db_error)?);
        }

        let request = transition(
            &txn,
            &request,
            RequestStatus::Approved,
            Some(actor.id),
            None,
        )
        .await?;

        activity_log::record(
            &txn,
            actor.id,
            ActivityAction::ApproveRequest,
            json!({ "requestId": request.id, "code": request.code }),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(request_id = %request.id, code = %request.code, "request approved");

        self.event_sender
            .send_or_log(Event::RequestApproved {
                request_id: request.id,
                code: request.code.clone(),
                branch_id: request.branch_id,
            });

        Ok(RequestWithItems {
            request,
            items: approved_items,
        })
    }

    /// Ships an APPROVED request out of the central warehouse. Either every
    /// item is taken from central stock or nothing is.
    #[instrument(skip(self), fields(actor = %actor.id))]
    pub async fn ship(
        &self,
        actor: &Actor,
        request_id: Uuid,
    ) -> Result<RequestWithItems, ServiceError> {
        authorize(actor, Operation::ShipRequest, None).into_result()?;

        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;
        let request = lock_request(&txn, request_id).await?;
        ensure_transition(&request, RequestStatus::Shipped)?;

        let center = directory::find_center_branch(&txn).await?;
        let request = transition(&txn, &request, RequestStatus::Shipped, None, None).await?;

        let items = load_items_with_materials(&txn, request.id).await?;
        let mut summary = Vec::with_capacity(items.len());
        for (item, material) in &items {
            let qty = item.effective_qty();
            if qty.is_zero() {
                continue;
            }

            stock_ledger::decrement(&txn, item.material_id, center.id, qty)
                .await
                .map_err(|e| match e {
                    ServiceError::InsufficientStock(detail) => {
                        warn!(request_id = %request.id, material = %material.name, "shipment refused");
                        ServiceError::InsufficientStock(format!(
                            "Insufficient central stock for {}: {}",
                            material.name, detail
                        ))
                    }
                    other => other,
                })?;

            summary.push(json!({ "material": material.name, "qty": qty, "unit": material.unit }));
        }

        activity_log::record(
            &txn,
            actor.id,
            ActivityAction::ShipRequest,
            json!({ "requestId": request.id, "code": request.code, "summary": summary }),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(request_id = %request.id, code = %request.code, "request shipped");

        self.event_sender
            .send_or_log(Event::RequestShipped {
                request_id: request.id,
                code: request.code.clone(),
                branch_id: request.branch_id,
            });

        Ok(RequestWithItems {
            request,
            items: items.into_iter().map(|(item, _)| item).collect(),
        })
    }

    /// Confirms arrival of a SHIPPED request and books the goods into the
    /// requesting branch's stock.
    #[instrument(skip(self), fields(actor = %actor.id))]
    pub async fn receive(
        &self,
        actor: &Actor,
        request_id: Uuid,
    ) -> Result<RequestWithItems, ServiceError> {
        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;
        let request = lock_request(&txn, request_id).await?;
        authorize(actor, Operation::ReceiveRequest, Some(request.branch_id)).into_result()?;
        ensure_transition(&request, RequestStatus::Received)?;

        let request = transition(&txn, &request, RequestStatus::Received, None, None).await?;

        let items = load_items_with_materials(&txn, request.id).await?;
        let mut received = Vec::with_capacity(items.len());
        for (item, material) in &items {
            let qty = item.effective_qty();
            if qty.is_zero() {
                continue;
            }
            stock_ledger::increment(&txn, item.material_id, request.branch_id, qty).await?;
            received.push(json!({ "material": material.name, "qty": qty, "unit": material.unit }));
        }

        activity_log::record(
            &txn,
            actor.id,
            ActivityAction::ReceiveRequest,
            json!({ "requestId": request.id, "code": request.code, "receivedItems": received }),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(request_id = %request.id, code = %request.code, "request received");

        Ok(RequestWithItems {
            request,
            items: items.into_iter().map(|(item, _)| item).collect(),
        })
    }

    /// Rejects a PENDING request; the reason is appended to its notes.
    #[instrument(skip(self, reason), fields(actor = %actor.id))]
    pub async fn reject(
        &self,
        actor: &Actor,
        request_id: Uuid,
        reason: &str,
    ) -> Result<RequestWithItems, ServiceError> {
        authorize(actor, Operation::RejectRequest, None).into_result()?;

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::InvalidInput(
                "A rejection reason is required".to_string(),
            ));
        }

        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;
        let request = lock_request(&txn, request_id).await?;
        ensure_transition(&request, RequestStatus::Rejected)?;

        let notes = match request.notes.as_deref().filter(|n| !n.is_empty()) {
            Some(existing) => format!("{} | REJECTED REASON: {}", existing, reason),
            None => format!("REJECTED REASON: {}", reason),
        };

        let request = transition(
            &txn,
            &request,
            RequestStatus::Rejected,
            Some(actor.id),
            Some(notes),
        )
        .await?;
        let items = load_items(&txn, request.id).await?;

        activity_log::record(
            &txn,
            actor.id,
            ActivityAction::RejectRequest,
            json!({ "requestId": request.id, "code": request.code, "reason": reason }),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(request_id = %request.id, code = %request.code, "request rejected");

        self.event_sender
            .send_or_log(Event::RequestRejected {
                request_id: request.id,
                code: request.code.clone(),
                branch_id: request.branch_id,
                reason: reason.to_string(),
            });

        Ok(RequestWithItems { request, items })
    }

    /// Lists requests newest first. Branch admins only ever see their own branch.
    #[instrument(skip(self, filter), fields(actor = %actor.id))]
    pub async fn find_all(
        &self,
        actor: &Actor,
        filter: RequestFilter,
        page: PageRequest,
    ) -> Result<Paginated<RequestWithItems>, ServiceError> {
        let branch_id = actor.scope_branch(filter.branch_id);
        authorize(actor, Operation::ViewRequest, branch_id).into_result()?;

        let mut query = RequestEntity::find();
        if let Some(branch_id) = branch_id {
            query = query.filter(request::Column::BranchId.eq(branch_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(request::Column::Status.eq(status));
        }
        match (filter.start_date, filter.end_date) {
            (Some(start), Some(end)) => {
                let (from, until) = date_range(start, end)?;
                query = query
                    .filter(request::Column::RequestDate.gte(from))
                    .filter(request::Column::RequestDate.lt(until));
            }
            (Some(start), None) => {
                let (from, _) = date_range(start, start)?;
                query = query.filter(request::Column::RequestDate.gte(from));
            }
            (None, Some(end)) => {
                let (_, until) = date_range(end, end)?;
                query = query.filter(request::Column::RequestDate.lt(until));
            }
            (None, None) => {}
        }

        let page_index = page.index()?;
        let paginator = query
            .order_by_desc(request::Column::RequestDate)
            .paginate(&*self.db_pool, page.limit);
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let requests = paginator
            .fetch_page(page_index)
            .await
            .map_err(ServiceError::db_error)?;

        let ids: Vec<Uuid> = requests.iter().map(|r| r.id).collect();
        let mut items_by_request: HashMap<Uuid, Vec<request_item::Model>> = HashMap::new();
        if !ids.is_empty() {
            let items = RequestItemEntity::find()
                .filter(request_item::Column::RequestId.is_in(ids))
                .all(&*self.db_pool)
                .await
                .map_err(ServiceError::db_error)?;
            for item in items {
                items_by_request.entry(item.request_id).or_default().push(item);
            }
        }

        let data = requests
            .into_iter()
            .map(|request| {
                let items = items_by_request.remove(&request.id).unwrap_or_default();
                RequestWithItems { request, items }
            })
            .collect();

        Ok(Paginated::new(data, total, page))
    }

    #[instrument(skip(self), fields(actor = %actor.id))]
    pub async fn find_one(
        &self,
        actor: &Actor,
        request_id: Uuid,
    ) -> Result<RequestWithItems, ServiceError> {
        let request = find_request(&*self.db_pool, request_id).await?;
        authorize(actor, Operation::ViewRequest, Some(request.branch_id)).into_result()?;
        let items = load_items(&*self.db_pool, request.id).await?;
        Ok(RequestWithItems { request, items })
    }
}

async fn find_request<C: ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
) -> Result<request::Model, ServiceError> {
    RequestEntity::find_by_id(request_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Request {} not found", request_id)))
}

/// Reads the request row under `SELECT ... FOR UPDATE` where the backend supports it.
async fn lock_request(
    txn: &DatabaseTransaction,
    request_id: Uuid,
) -> Result<request::Model, ServiceError> {
    RequestEntity::find_by_id(request_id)
        .lock_exclusive()
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Request {} not found", request_id)))
}

fn ensure_transition(request: &request::Model, next: RequestStatus) -> Result<(), ServiceError> {
    if request.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(invalid_transition(request, next))
    }
}

fn invalid_transition(request: &request::Model, next: RequestStatus) -> ServiceError {
    ServiceError::InvalidTransition(format!(
        "Request {} is {}; cannot move to {}",
        request.code, request.status, next
    ))
}

/// Moves the request from its observed status to `next`. Zero affected rows
/// means someone else moved it first.
async fn transition(
    txn: &DatabaseTransaction,
    request: &request::Model,
    next: RequestStatus,
    processed_by: Option<Uuid>,
    notes: Option<String>,
) -> Result<request::Model, ServiceError> {
    let now = Utc::now();
    let mut update = RequestEntity::update_many()
        .col_expr(request::Column::Status, Expr::value(next))
        .col_expr(request::Column::UpdatedAt, Expr::value(now))
        .filter(request::Column::Id.eq(request.id))
        .filter(request::Column::Status.eq(request.status));

    if let Some(processed_by) = processed_by {
        update = update
            .col_expr(request::Column::ProcessedById, Expr::value(processed_by))
            .col_expr(request::Column::ProcessedAt, Expr::value(now));
    }
    if let Some(notes) = notes {
        update = update.col_expr(request::Column::Notes, Expr::value(notes));
    }

    let result = update.exec(txn).await.map_err(ServiceError::db_error)?;
    if result.rows_affected == 0 {
        let current = find_request(txn, request.id).await?;
        warn!(request_id = %request.id, status = %current.status, "lost transition race");
        return Err(invalid_transition(&current, next));
    }

    find_request(txn, request.id).await
}

async fn load_items<C: ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
) -> Result<Vec<request_item::Model>, ServiceError> {
    RequestItemEntity::find()
        .filter(request_item::Column::RequestId.eq(request_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

async fn load_items_with_materials<C: ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
) -> Result<Vec<(request_item::Model, material::Model)>, ServiceError> {
    let rows = RequestItemEntity::find()
        .filter(request_item::Column::RequestId.eq(request_id))
        .find_also_related(MaterialEntity)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    rows.into_iter()
        .map(|(item, material)| {
            material.map(|m| (item.clone(), m)).ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "material {} of request item {} is missing",
                    item.material_id, item.id
                ))
            })
        })
        .collect()
}
