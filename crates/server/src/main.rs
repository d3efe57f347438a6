use std::sync::Arc;

use lumiwatch_engine::config::EngineConfig;
use lumiwatch_engine::notifier::{ChannelSender, WebhookSender};
use lumiwatch_engine::rules::Channel;
use lumiwatch_engine::runtime::{Engine, Persistence};
use lumiwatch_server::config::ServerConfig;
use lumiwatch_server::rest::{self, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = match ServerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid server configuration");
            std::process::exit(1);
        }
    };

    let engine_cfg = match load_engine_config(&config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid engine configuration");
            std::process::exit(1);
        }
    };

    let (persistence, db) = match config.database_url {
        Some(ref url) => match sqlx::PgPool::connect(url).await {
            Ok(pool) => {
                match lumiwatch_engine::storage::migrator::run_migrations(&pool).await {
                    Ok(applied) if applied.is_empty() => {
                        tracing::info!("database schema up to date");
                    }
                    Ok(applied) => {
                        tracing::info!(count = applied.len(), ?applied, "applied migrations");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "database migration failed");
                        std::process::exit(1);
                    }
                }
                (Persistence::postgres(pool.clone()), Some(pool))
            }
            Err(e) => {
                tracing::error!(error = %e, "database connection failed");
                std::process::exit(1);
            }
        },
        None => {
            tracing::info!("no DATABASE_URL set, running in memory");
            (Persistence::default(), None)
        }
    };

    let senders = webhook_senders(&engine_cfg);
    let dlq = persistence.dlq.clone();
    let engine = Engine::start(engine_cfg, senders, persistence);

    let state = AppState {
        ingress: Arc::clone(&engine.ingress),
        rules: Arc::clone(&engine.rules),
        lifecycle: Arc::clone(&engine.lifecycle),
        query: Arc::clone(&engine.query),
        metrics: Arc::clone(&engine.metrics),
        db,
        dlq,
    };
    let app = rest::router(state);

    let rest_addr = config.rest_addr;
    tracing::info!(%rest_addr, "REST server starting");
    let listener = match tokio::net::TcpListener::bind(rest_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, %rest_addr, "failed to bind");
            std::process::exit(1);
        }
    };

    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = serve.await {
        tracing::error!(error = %e, "REST server failed");
    }

    tracing::info!("shutting down engine");
    engine.shutdown().await;
}

fn load_engine_config(
    config: &ServerConfig,
) -> Result<EngineConfig, lumiwatch_engine::config::LoadError> {
    match config.engine_config_path {
        Some(ref path) => lumiwatch_engine::config::load_from_file(path),
        None => Ok(EngineConfig::default()),
    }
}

/// One webhook sender per channel endpoint named in the engine config.
fn webhook_senders(cfg: &EngineConfig) -> Vec<Arc<dyn ChannelSender>> {
    let mut senders: Vec<Arc<dyn ChannelSender>> = Vec::new();
    for channel in [Channel::Email, Channel::Sms, Channel::Push] {
        if let Some(url) = cfg.notifier.endpoints.get(channel.as_str()) {
            senders.push(Arc::new(WebhookSender::new(channel, url.clone())));
        }
    }
    if senders.is_empty() {
        tracing::warn!("no notification endpoints configured, notices will be skipped");
    }
    senders
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
