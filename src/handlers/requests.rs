use crate::{
    auth::Actor,
    common::{PageRequest, Paginated},
    entities::request::RequestStatus,
    errors::ServiceError,
    services::requests::{ItemApproval, NewRequest, RequestFilter, RequestWithItems},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Default)]
pub struct RequestListQuery {
    /// Page number (1-indexed)
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<RequestStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub branch_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ApproveRequestBody {
    #[serde(default)]
    pub items: Vec<ItemApproval>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectRequestBody {
    #[validate(length(min = 1, message = "Reason cannot be empty"))]
    pub reason: String,
}

pub async fn create_request(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<NewRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RequestWithItems>>), ServiceError> {
    let created = state.services.requests.create(&actor, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(created).with_message("Request created")),
    ))
}

pub async fn list_requests(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<RequestListQuery>,
) -> Result<Json<Paginated<RequestWithItems>>, ServiceError> {
    let page = PageRequest::new(
        query.page.unwrap_or(1),
        state.config.page_size(query.limit),
    );
    let filter = RequestFilter {
        status: query.status,
        start_date: query.start_date,
        end_date: query.end_date,
        branch_id: query.branch_id,
    };

    let result = state.services.requests.find_all(&actor, filter, page).await?;
    Ok(Json(result))
}

pub async fn get_request(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<RequestWithItems> {
    let request = state.services.requests.find_one(&actor, id).await?;
    Ok(Json(ApiResponse::success(request)))
}

pub async fn approve_request(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    body: Option<Json<ApproveRequestBody>>,
) -> ApiResult<RequestWithItems> {
    let approvals = body.map(|Json(b)| b.items).unwrap_or_default();
    let approved = state.services.requests.approve(&actor, id, approvals).await?;
    Ok(Json(
        ApiResponse::success(approved).with_message("Request approved"),
    ))
}

pub async fn ship_request(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<RequestWithItems> {
    let shipped = state.services.requests.ship(&actor, id).await?;
    Ok(Json(ApiResponse::success(shipped).with_message("Request shipped")))
}

pub async fn receive_request(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<RequestWithItems> {
    let received = state.services.requests.receive(&actor, id).await?;
    Ok(Json(
        ApiResponse::success(received).with_message("Request received"),
    ))
}

pub async fn reject_request(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectRequestBody>,
) -> ApiResult<RequestWithItems> {
    payload.validate()?;
    let rejected = state
        .services
        .requests
        .reject(&actor, id, &payload.reason)
        .await?;
    Ok(Json(
        ApiResponse::success(rejected).with_message("Request rejected"),
    ))
}
