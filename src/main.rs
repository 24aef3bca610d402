//! uptimechecker server: API, rechecker and alerter in one process.

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use uptimechecker::config::{LogFormat, ServerConfig};
use uptimechecker::db::{AlertStore, MemoryStore, ResultStore, SqliteStore, TargetStore};
use uptimechecker::notify::{LogNotifier, MultiNotifier, Notifier, SlackNotifier};
use uptimechecker::probe::{CompositeProbe, DnsProbe, HttpProbe, Probe, RetryProbe};
use uptimechecker::scheduler::{Alerter, Rechecker};
use uptimechecker::web::{AppState, Server};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

struct Stores {
    targets: Arc<dyn TargetStore>,
    results: Arc<dyn ResultStore>,
    alerts: Arc<dyn AlertStore>,
}

fn init_tracing(format: LogFormat) -> Result<(), BoxError> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("uptimechecker=info".parse()?);

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().json())
            .with(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(filter)
            .init(),
    }
    Ok(())
}

fn open_stores(cfg: &ServerConfig) -> Result<Stores, BoxError> {
    match &cfg.db_path {
        Some(path) => {
            let store = Arc::new(SqliteStore::new(path)?);
            tracing::info!("Using database at {}", path);
            Ok(Stores {
                targets: store.clone(),
                results: store.clone(),
                alerts: store,
            })
        }
        None => {
            let store = Arc::new(MemoryStore::new());
            tracing::info!("Using in-memory storage");
            Ok(Stores {
                targets: store.clone(),
                results: store.clone(),
                alerts: store,
            })
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cfg = ServerConfig::load()?;
    init_tracing(cfg.log_format)?;

    tracing::info!("Starting uptimechecker on {}...", cfg.http_addr);
    for warning in cfg.warnings() {
        tracing::warn!("{}", warning);
    }

    let stores = open_stores(&cfg)?;

    let http: Arc<dyn Probe> = Arc::new(HttpProbe::new(cfg.check_timeout)?);
    let reachability: Arc<dyn Probe> =
        Arc::new(RetryProbe::new(http, cfg.probe_attempts, cfg.probe_backoff));
    let checker = Arc::new(CompositeProbe::new(vec![
        reachability.clone(),
        Arc::new(DnsProbe::new()),
    ]));

    let notifier: Arc<dyn Notifier> =
        match cfg.slack_webhook.as_deref().and_then(SlackNotifier::new) {
            Some(slack) => {
                let sinks: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier), Arc::new(slack)];
                Arc::new(MultiNotifier::new(sinks))
            }
            None => Arc::new(LogNotifier),
        };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let rechecker = Rechecker::new(
        stores.targets.clone(),
        stores.results.clone(),
        reachability,
        cfg.rechecker(),
    );
    let rechecker_task = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move { rechecker.run(shutdown).await }
    });

    let alerter = Alerter::new(
        stores.results.clone(),
        stores.alerts.clone(),
        notifier,
        cfg.alerter(),
    );
    let alerter_task = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move { alerter.run(shutdown).await }
    });

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    let server = Server::new(
        &cfg,
        AppState {
            targets: stores.targets,
            results: stores.results,
            checker,
        },
    );
    server.start(shutdown_rx).await?;

    let _ = tokio::join!(rechecker_task, alerter_task);
    tracing::info!("Shutdown complete");
    Ok(())
}
