#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use chrono::Duration;
use kitchen_logistics::{
    app_router,
    auth::{Actor, Role},
    config::AppConfig,
    db,
    entities::{branch, log_activity, material, school},
    events::{Event, EventSender},
    handlers::AppServices,
    notifications::{NotificationError, NotificationSink},
    services::{
        directory::{NewBranch, NewMaterial, NewSchool, NewUser},
        requests::{NewRequest, NewRequestItem, RequestWithItems},
        stocks::StockOpname,
    },
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use tokio::sync::mpsc;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "kitchen_logistics_test_secret_0123456789abcdef";

/// In-memory SQLite application with a seeded directory:
/// a central warehouse, one branch kitchen with its admin, two materials and a school.
pub struct TestContext {
    pub state: AppState,
    pub events: mpsc::Receiver<Event>,
    pub central: Actor,
    pub center: branch::Model,
    pub branch: branch::Model,
    pub branch_admin: Actor,
    pub rice: material::Model,
    pub oil: material::Model,
    pub school: school::Model,
}

impl TestContext {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_JWT_SECRET.to_string(),
            "test".to_string(),
        );
        // A single connection keeps every query on the same in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (tx, rx) = mpsc::channel(64);
        let state = AppState::new(Arc::new(pool), cfg, EventSender::new(tx));

        let central = Actor::new(Uuid::new_v4(), Role::CentralAdmin, None);
        let directory = state.services.directory.clone();

        let center = directory
            .register_branch(
                &central,
                NewBranch {
                    name: "Gudang Pusat".into(),
                    address: Some("Jl. Industri 1".into()),
                    is_center: true,
                },
            )
            .await
            .expect("seed center branch");
        let branch = directory
            .register_branch(
                &central,
                NewBranch {
                    name: "Dapur Bandung".into(),
                    address: None,
                    is_center: false,
                },
            )
            .await
            .expect("seed branch");

        let rice = directory
            .register_material(
                &central,
                NewMaterial {
                    name: "Beras".into(),
                    unit: "kg".into(),
                },
            )
            .await
            .expect("seed rice");
        let oil = directory
            .register_material(
                &central,
                NewMaterial {
                    name: "Minyak Goreng".into(),
                    unit: "liter".into(),
                },
            )
            .await
            .expect("seed oil");

        let school = directory
            .register_school(
                &central,
                NewSchool {
                    name: "SD Negeri 1".into(),
                    address: None,
                },
            )
            .await
            .expect("seed school");

        let mut ctx = Self {
            state,
            events: rx,
            central,
            center,
            branch: branch.clone(),
            branch_admin: Actor::new(Uuid::nil(), Role::BranchAdmin, None),
            rice,
            oil,
            school,
        };
        ctx.branch_admin = ctx.add_branch_admin(branch.id, "Siti", "siti@dapur.test").await;
        ctx
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }

    pub fn router(&self) -> Router {
        app_router(self.state.clone())
    }

    pub fn token_for(&self, actor: &Actor) -> String {
        self.state
            .verifier
            .issue(actor, Duration::hours(1))
            .expect("token issue")
    }

    /// Registers a branch admin user and returns the matching actor.
    pub async fn add_branch_admin(&self, branch_id: Uuid, name: &str, email: &str) -> Actor {
        let user = self
            .services()
            .directory
            .register_user(
                &self.central,
                NewUser {
                    name: name.into(),
                    email: email.into(),
                    role: Role::BranchAdmin,
                    branch_id: Some(branch_id),
                },
            )
            .await
            .expect("seed branch admin");
        Actor::new(user.id, user.role, user.branch_id)
    }

    pub async fn add_branch(&self, name: &str) -> branch::Model {
        self.services()
            .directory
            .register_branch(
                &self.central,
                NewBranch {
                    name: name.into(),
                    address: None,
                    is_center: false,
                },
            )
            .await
            .expect("seed extra branch")
    }

    /// Sets central warehouse stock for a material through a physical count.
    pub async fn stock_center(&self, material_id: Uuid, qty: Decimal) {
        self.services()
            .stocks
            .opname(
                &self.central,
                StockOpname {
                    branch_id: self.center.id,
                    material_id,
                    qty,
                    reason: "initial count".into(),
                },
            )
            .await
            .expect("seed center stock");
    }

    pub async fn stock_qty(&self, material_id: Uuid, branch_id: Uuid) -> Option<Decimal> {
        kitchen_logistics::services::stock_ledger::get_stock(self.db(), material_id, branch_id)
            .await
            .expect("stock lookup")
            .map(|s| s.qty)
    }

    /// Opens a request from the seeded branch for the given (material, qty) pairs.
    pub async fn create_request(&self, items: &[(Uuid, Decimal)]) -> RequestWithItems {
        self.services()
            .requests
            .create(
                &self.branch_admin,
                NewRequest {
                    items: items
                        .iter()
                        .map(|(material_id, qty)| NewRequestItem {
                            material_id: *material_id,
                            qty: *qty,
                        })
                        .collect(),
                    notes: Some("for next week's menu".into()),
                },
            )
            .await
            .expect("create request")
    }

    pub async fn activity(&self, action: &str) -> Vec<log_activity::Model> {
        log_activity::Entity::find()
            .filter(log_activity::Column::Action.eq(action))
            .order_by_asc(log_activity::Column::CreatedAt)
            .all(self.db())
            .await
            .expect("activity lookup")
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Sink that records every message and fails for chosen recipients.
#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<(String, String, String)>>,
    pub failing: Vec<String>,
}

impl RecordingSink {
    pub fn failing_for(addresses: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: addresses.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("sink lock")
            .iter()
            .map(|(to, _, _)| to.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), NotificationError> {
        if self.failing.iter().any(|f| f == to) {
            return Err(NotificationError::Rejected(503));
        }
        self.sent
            .lock()
            .expect("sink lock")
            .push((to.to_string(), subject.to_string(), html.to_string()));
        Ok(())
    }
}
