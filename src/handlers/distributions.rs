use crate::{
    auth::Actor,
    common::{PageRequest, Paginated},
    entities::distribution::{self, DistributionStatus},
    errors::ServiceError,
    services::distributions::{DistributionFilter, NewDistribution},
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
pub struct DistributionListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub school_id: Option<Uuid>,
    pub status: Option<DistributionStatus>,
    /// Only deliveries sent on this day (UTC)
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReturnContainersBody {
    #[validate(range(min = 0, message = "Returned containers cannot be negative"))]
    pub returned_container: i32,
}

pub async fn create_distribution(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<NewDistribution>,
) -> Result<(StatusCode, Json<ApiResponse<distribution::Model>>), ServiceError> {
    let created = state.services.distributions.create(&actor, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(created).with_message("Distribution sent")),
    ))
}

pub async fn list_distributions(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<DistributionListQuery>,
) -> Result<Json<Paginated<distribution::Model>>, ServiceError> {
    let page = PageRequest::new(
        query.page.unwrap_or(1),
        state.config.page_size(query.limit),
    );
    let filter = DistributionFilter {
        school_id: query.school_id,
        status: query.status,
        date: query.date,
    };

    let result = state
        .services
        .distributions
        .find_all(&actor, filter, page)
        .await?;
    Ok(Json(result))
}

pub async fn get_distribution(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<distribution::Model> {
    let distribution = state.services.distributions.find_one(&actor, id).await?;
    Ok(Json(ApiResponse::success(distribution)))
}

pub async fn return_containers(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReturnContainersBody>,
) -> ApiResult<distribution::Model> {
    payload.validate()?;
    let updated = state
        .services
        .distributions
        .update_return(&actor, id, payload.returned_container)
        .await?;
    Ok(Json(
        ApiResponse::success(updated).with_message("Container return updated"),
    ))
}
