use std::sync::Arc;

use anyhow::{Context, anyhow};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use notification_dispatcher::api::{ApiState, notification_routes};
use notification_dispatcher::config::{AppConfig, LogConfig};
use notification_dispatcher::pipeline::{ConsumptionLoop, Dispatcher};
use notification_dispatcher::store::open_database;
use notification_dispatcher::stream::{EventSource, KafkaSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    let dotenv_path = dotenvy::dotenv().ok();
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config.log)?;

    eprintln!("📣 Notification Dispatcher v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Kafka: {} (topic {})", config.kafka.brokers, config.kafka.topic);
    eprintln!(
        "   Channels: email {}, whatsapp {}",
        if config.email.is_some() { "enabled" } else { "disabled" },
        if config.whatsapp.is_some() { "enabled" } else { "disabled" },
    );
    if let Some(path) = dotenv_path {
        info!(path = %path.display(), "Loaded environment file");
    }

    // ── Database ─────────────────────────────────────────────────────────
    let db = open_database(&config.database)
        .await
        .with_context(|| format!("Failed to open database at {}", config.database.path.display()))?;

    // ── Shutdown ─────────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    // ── Query API ────────────────────────────────────────────────────────
    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind query API on {addr}"))?;
    let app = notification_routes(ApiState {
        db: Arc::clone(&db),
    });
    let server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(cancel.clone().cancelled_owned())
            .into_future(),
    );
    info!(%addr, "Query API listening");
    eprintln!("   Query API: http://{addr}/api/v1/notifications\n");

    // ── Pipeline ─────────────────────────────────────────────────────────
    let dispatcher = Arc::new(Dispatcher::from_configs(
        config.email.clone(),
        config.whatsapp.clone(),
    ));
    let source: Arc<dyn EventSource> = Arc::new(KafkaSource::new(config.kafka.clone()));
    let consumer = ConsumptionLoop::new(source, dispatcher, db, config.pipeline.clone());

    let result = consumer.run(cancel.clone()).await;

    // The loop may end on its own (subscription failure); stop the server too.
    cancel.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Query API server error"),
        Err(e) => warn!(error = %e, "Query API task failed"),
    }

    let stats = result.context("Event subscription failed")?;
    info!(
        received = stats.received,
        stored = stats.stored,
        "Shutdown complete"
    );
    Ok(())
}

/// Stderr logging, plus a daily-rolling file under `LOG_DIR` when set.
///
/// The returned guard flushes the file writer on drop; hold it for the
/// lifetime of the process.
fn init_tracing(config: &LogConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "notification-dispatcher.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .context("Failed to initialize tracing")?;

    Ok(guard)
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Error setting up signal handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Error setting up SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Received shutdown signal");
    token.cancel();
}
