use snapfeed_api::{
    config::{Config, ConfigError},
    server::{self, ServerState},
};
use snapfeed_common::model::auth::AuthKeys;
use snapfeed_db::{DbClient, DbError, MemoryStore, Repository};
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Error setting up the database: {0}")]
    Database(#[from] DbError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "snapfeed_api=debug,\
                snapfeed_db=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn open_repository(config: &Config) -> Result<Arc<dyn Repository>, InitError> {
    let Some(database) = &config.database else {
        warn!("DATABASE_URL is not set, using the in-memory store; nothing will be persisted");
        return Ok(Arc::new(MemoryStore::new(
            config.worker_id,
            config.process_id,
        )));
    };

    let client = DbClient::connect(
        &database.url,
        database.max_connections,
        config.worker_id,
        config.process_id,
    )
    .await?;
    client.migrate().await?;

    Ok(Arc::new(client))
}

fn shutdown_on_signal(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                warn!(error = %err, "Could not listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(err) => {
                    warn!(error = %err, "Could not listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        info!("Shutting down");
        shutdown.cancel();
    });
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let config = Config::from_env()?;
    info!(?config, "Loaded configuration");

    let auth_keys = AuthKeys::from_secret(
        config.auth.jwt_secret.as_bytes(),
        config.auth.token_lifetime,
    );
    let state = ServerState {
        repository: open_repository(&config).await?,
        auth_keys: Arc::new(auth_keys),
    };

    let app = server::routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(address = %config.server_address, "Listening");

    let shutdown = CancellationToken::new();
    shutdown_on_signal(shutdown.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
