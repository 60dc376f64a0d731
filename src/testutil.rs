//! Shared test helpers for router and upload-flow tests.

use std::sync::Arc;

use crate::config::{Config, MetadataConfig, ServerConfig, StorageConfig};
use crate::object_store::LocalStore;
use crate::storage::MemStore;
use crate::AppState;

/// Local storage under `temp_dir`, in-memory metadata, 1MB upload limit.
pub fn test_config(temp_dir: &tempfile::TempDir, base_url: &str) -> Config {
    Config {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            public_base_url: base_url.to_string(),
            frontend_origins: Vec::new(),
        },
        storage: StorageConfig {
            local_storage_path: temp_dir.path().join("files").to_string_lossy().to_string(),
            cloud: None,
        },
        metadata: MetadataConfig {
            data_dir: temp_dir.path().join("data").to_string_lossy().to_string(),
            ..MetadataConfig::default()
        },
        max_upload_size: 1024 * 1024,
    }
}

pub fn state_from_config(config: Config) -> Arc<AppState> {
    let object_store = LocalStore::new(
        &config.storage.local_storage_path,
        config.server.public_base_url.clone(),
    )
    .expect("Failed to create test object store");

    Arc::new(AppState {
        config,
        metadata: Arc::new(MemStore::new()),
        object_store: Arc::new(object_store),
    })
}

/// Create a test AppState with a temporary local object store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    state_from_config(test_config(temp_dir, "http://localhost:3001"))
}

/// Serve the full router on an ephemeral port. Returns its base URL.
pub async fn spawn_app(temp_dir: &tempfile::TempDir) -> (String, Arc<AppState>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let base_url = format!(
        "http://{}",
        listener.local_addr().expect("Listener has no address")
    );

    let state = state_from_config(test_config(temp_dir, &base_url));
    let app = crate::api::create_router(Arc::clone(&state));
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server failed");
    });
    (base_url, state)
}
