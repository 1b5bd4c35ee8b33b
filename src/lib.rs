//! Kitchen Logistics Library
//!
//! Material requests between branch kitchens and the central warehouse, the
//! per-branch stock ledger, meal distributions to schools and the activity
//! audit trail, served over an axum JSON API.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod common;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod notifications;
pub mod services;

use axum::{
    extract::FromRef,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;

use auth::TokenVerifier;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub verifier: Arc<TokenVerifier>,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let verifier = Arc::new(TokenVerifier::new(
            config.jwt_secret.clone(),
            config.jwt_issuer.clone(),
        ));
        let services = handlers::AppServices::new(db.clone(), event_sender.clone());
        Self {
            db,
            config,
            event_sender,
            verifier,
            services,
        }
    }
}

impl FromRef<AppState> for Arc<TokenVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.verifier.clone()
    }
}

// Common response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    let requests = Router::new()
        .route(
            "/requests",
            post(handlers::requests::create_request).get(handlers::requests::list_requests),
        )
        .route("/requests/:id", get(handlers::requests::get_request))
        .route(
            "/requests/:id/approve",
            patch(handlers::requests::approve_request),
        )
        .route("/requests/:id/ship", patch(handlers::requests::ship_request))
        .route(
            "/requests/:id/receive",
            patch(handlers::requests::receive_request),
        )
        .route(
            "/requests/:id/reject",
            patch(handlers::requests::reject_request),
        );

    let stocks = Router::new()
        .route("/stocks", get(handlers::stocks::list_stocks))
        .route("/stocks/opname", post(handlers::stocks::stock_opname))
        .route("/stocks/:id", get(handlers::stocks::get_stock));

    let distributions = Router::new()
        .route(
            "/distributions",
            post(handlers::distributions::create_distribution)
                .get(handlers::distributions::list_distributions),
        )
        .route(
            "/distributions/:id",
            get(handlers::distributions::get_distribution),
        )
        .route(
            "/distributions/:id/return-containers",
            patch(handlers::distributions::return_containers),
        );

    Router::new()
        .merge(requests)
        .merge(stocks)
        .merge(distributions)
        .merge(handlers::health::health_routes())
}

/// Full application router: the v1 API plus a root-level health probe.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .route("/health", get(handlers::health::health_check))
        .with_state(state)
}
