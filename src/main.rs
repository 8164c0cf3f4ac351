#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::module_name_repetitions)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use wa_gateway::api::{build_router, AppState};
use wa_gateway::auth::CredentialResolver;
use wa_gateway::config::{Config, LogFormat};
use wa_gateway::db::{self, MessageRepository, SessionRepository, SqliteMessageRepository, SqliteSessionRepository, SqliteWebhookRepository, WebhookRepository};
use wa_gateway::metrics::Metrics;
use wa_gateway::protocol::{MockProtocolClient, ProtocolClient};
use wa_gateway::registry::{AdapterFactory, SessionRegistry};
use wa_gateway::router::EventRouter;
use wa_gateway::webhook::{DeliveryConfig, DeliveryEngine};

#[derive(Parser)]
#[command(name = "wa-gateway", about = "Multi-tenant WhatsApp-protocol gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control plane. The default when no subcommand is given.
    Serve,
    /// Check database connectivity and exit.
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(Config::from_env().context("loading configuration")?);
    init_tracing(&config);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Doctor => doctor(config).await,
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}

async fn doctor(config: Arc<Config>) -> Result<()> {
    let pool = db::connect(&config.database_url).await.context("connecting to database")?;
    pool.close().await;
    println!("database reachable at {}", config.database_url);
    Ok(())
}

async fn serve(config: Arc<Config>) -> Result<()> {
    let pool = db::connect(&config.database_url).await.context("connecting to database")?;

    let sessions_repo: Arc<dyn SessionRepository> = Arc::new(SqliteSessionRepository::new(pool.clone()));
    let webhooks_repo: Arc<dyn WebhookRepository> = Arc::new(SqliteWebhookRepository::new(pool.clone()));
    let messages_repo: Arc<dyn MessageRepository> = Arc::new(SqliteMessageRepository::new(pool));

    let metrics = Arc::new(Metrics::new());
    let (delivery_tx, delivery_rx) = mpsc::channel(config.webhook_queue_capacity);

    let event_router = Arc::new(EventRouter::new(
        webhooks_repo.clone(),
        sessions_repo.clone(),
        messages_repo.clone(),
        delivery_tx,
        metrics.clone(),
    ));

    let adapter_factory: Arc<AdapterFactory> = Arc::new(|existing_jid: Option<String>| -> Arc<dyn ProtocolClient> {
        match existing_jid {
            Some(jid) => Arc::new(MockProtocolClient::resuming(&jid)),
            None => Arc::new(MockProtocolClient::new()),
        }
    });

    let registry = Arc::new(SessionRegistry::new(
        sessions_repo.clone(),
        event_router.clone(),
        metrics.clone(),
        adapter_factory,
        config.qr_timeout,
        config.reconnect_deadline,
    ));

    let auth = Arc::new(CredentialResolver::new(
        sessions_repo.clone(),
        config.admin_api_key.clone(),
        config.credential_cache_positive_ttl,
        config.credential_cache_negative_ttl,
    ));

    let delivery_engine = Arc::new(DeliveryEngine::new(DeliveryConfig::from(config.as_ref()), metrics.clone()));
    let cancel = CancellationToken::new();
    let workers = delivery_engine.spawn_workers(delivery_rx, cancel.clone());

    registry.reconcile().await;

    let state = AppState {
        config: config.clone(),
        auth,
        registry,
        sessions_repo,
        webhooks_repo,
        messages_repo,
        router: event_router,
        metrics,
    };
    let app = build_router(state);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await.context("binding HTTP listener")?;
    tracing::info!(%addr, environment = %config.environment, "wa-gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    cancel.cancel();
    for worker in workers {
        let _ = worker.await;
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
