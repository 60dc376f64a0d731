//! model-gallery - Upload, catalogue and view 3D models and images
//!
//! This crate provides:
//! - Swappable object storage backends (local filesystem, GCS with V4 signed uploads)
//! - Model and image metadata behind an injectable store (in-memory or redb)
//! - A client-side upload flow: destination, transfer, statistics, registration
//! - A headless scene lifecycle manager for the model viewer
//! - REST API over all of the above

pub mod api;
pub mod config;
pub mod object_store;
pub mod storage;
pub mod upload;
pub mod viewer;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use config::Config;
use object_store::ObjectStore;
use storage::MetadataStore;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub metadata: Arc<dyn MetadataStore>,
    pub object_store: Arc<dyn ObjectStore>,
}
