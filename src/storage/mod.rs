pub mod db;
mod entities;
pub mod memory;
pub mod models;
mod tables;

pub use db::{Database, DatabaseError};
pub use memory::MemStore;
pub use tables::*;

use async_trait::async_trait;
use thiserror::Error;

use models::{ImageRecord, ModelRecord, NewImage, NewModel};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Record store for models and images.
///
/// Handlers only see this trait, so the volatile in-memory store and the
/// redb-backed database are interchangeable.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn create_model(&self, model: NewModel) -> Result<ModelRecord, StoreError>;
    /// Newest first.
    async fn list_models(&self) -> Result<Vec<ModelRecord>, StoreError>;
    async fn get_model(&self, id: &str) -> Result<Option<ModelRecord>, StoreError>;
    /// Returns whether the record existed.
    async fn delete_model(&self, id: &str) -> Result<bool, StoreError>;

    async fn create_image(&self, image: NewImage) -> Result<ImageRecord, StoreError>;
    /// Newest first.
    async fn list_images(&self) -> Result<Vec<ImageRecord>, StoreError>;
    async fn get_image(&self, id: &str) -> Result<Option<ImageRecord>, StoreError>;
    async fn delete_image(&self, id: &str) -> Result<bool, StoreError>;
}
