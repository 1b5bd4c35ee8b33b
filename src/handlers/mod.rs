pub mod distributions;
pub mod health;
pub mod requests;
pub mod stocks;

use crate::events::EventSender;
use crate::services::{
    directory::DirectoryService, distributions::DistributionService, requests::RequestService,
    stocks::StockService,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub directory: Arc<DirectoryService>,
    pub requests: Arc<RequestService>,
    pub stocks: Arc<StockService>,
    pub distributions: Arc<DistributionService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self {
            directory: Arc::new(DirectoryService::new(db_pool.clone())),
            requests: Arc::new(RequestService::new(db_pool.clone(), event_sender)),
            stocks: Arc::new(StockService::new(db_pool.clone())),
            distributions: Arc::new(DistributionService::new(db_pool)),
        }
    }
}
