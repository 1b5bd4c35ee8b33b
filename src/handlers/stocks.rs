use crate::{
    auth::Actor,
    common::{PageRequest, Paginated},
    entities::stock,
    errors::ServiceError,
    services::stocks::{StockFilter, StockOpname, StockView},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize, Default)]
pub struct StockListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub branch_id: Option<Uuid>,
    /// Case-insensitive material name fragment
    pub search: Option<String>,
}

pub async fn stock_opname(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<StockOpname>,
) -> ApiResult<stock::Model> {
    let stock = state.services.stocks.opname(&actor, payload).await?;
    Ok(Json(
        ApiResponse::success(stock).with_message("Stock count recorded"),
    ))
}

pub async fn list_stocks(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<StockListQuery>,
) -> Result<Json<Paginated<StockView>>, ServiceError> {
    let page = PageRequest::new(
        query.page.unwrap_or(1),
        state.config.page_size(query.limit),
    );
    let filter = StockFilter {
        branch_id: query.branch_id,
        search: query.search,
    };

    let result = state.services.stocks.find_all(&actor, filter, page).await?;
    Ok(Json(result))
}

pub async fn get_stock(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<StockView> {
    let stock = state.services.stocks.find_one(&actor, id).await?;
    Ok(Json(ApiResponse::success(stock)))
}
