use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use model_gallery::{
    api,
    config::{Config, MetadataBackend},
    object_store as obj,
    storage::{Database, MemStore, MetadataStore},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "model-gallery starting");

    // Load configuration
    let config = Config::load()?;

    // Initialize metadata store
    let metadata: Arc<dyn MetadataStore> = match config.metadata.backend {
        MetadataBackend::Memory => {
            info!("Using in-memory metadata store; records are lost on restart");
            Arc::new(MemStore::new())
        }
        MetadataBackend::Redb => {
            let db = Database::open(&config.metadata.data_dir)?;
            info!("Database opened at: {}", config.metadata.data_dir);
            Arc::new(db)
        }
    };

    // Initialize object store backend
    let object_store: Arc<dyn obj::ObjectStore> = match config.storage.cloud {
        Some(ref cloud) => {
            let store = obj::GcsStore::new(cloud).await?;
            info!(
                project_id = %cloud.project_id,
                private_object_dir = %cloud.private_object_dir,
                "Using GCS storage backend"
            );
            Arc::new(store)
        }
        None => {
            let store = obj::LocalStore::new(
                &config.storage.local_storage_path,
                config.server.public_base_url.clone(),
            )?;
            info!(
                "Using local storage backend at: {}",
                config.storage.local_storage_path
            );
            Arc::new(store)
        }
    };

    // Create shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        metadata,
        object_store,
    });

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!("Listening on: {}", config.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
