use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::{signal, sync::mpsc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use kitchen_logistics as api;
use api::notifications::{
    BranchNotifier, LogNotificationSink, NotificationSink, RelayNotificationSink,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);
    api::handlers::health::init_start_time();

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = api::events::EventSender::new(event_tx);

    let sink: Arc<dyn NotificationSink> = match cfg.notification_relay_url.as_deref() {
        Some(url) => {
            info!(relay = %url, "Notification relay enabled");
            Arc::new(RelayNotificationSink::new(url).context("failed to build notification relay")?)
        }
        None => {
            info!("Notification relay not configured; notifications are only logged");
            Arc::new(LogNotificationSink)
        }
    };
    let notifier = Arc::new(BranchNotifier::new(
        db_arc.clone(),
        sink,
        cfg.notification_subject_prefix.clone(),
    ));
    let worker = tokio::spawn(api::events::process_events(event_rx, notifier));

    let app_state = api::AppState::new(db_arc.clone(), cfg.clone(), event_sender);

    let cors_layer = if cfg.is_development() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    let app = api::app_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("kitchen-logistics listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // The router (and every EventSender clone it held) is gone now, so the
    // worker drains what is queued and stops.
    if let Err(e) = worker.await {
        warn!("Event worker ended abnormally: {}", e);
    }

    match Arc::try_unwrap(db_arc) {
        Ok(pool) => api::db::close_pool(pool).await?,
        Err(_) => warn!("Database pool still shared at shutdown; skipping explicit close"),
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
