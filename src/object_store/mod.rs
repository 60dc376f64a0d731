mod gcs;
mod local;

pub use gcs::{GcsStore, ServiceAccountKey};
pub use local::LocalStore;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use thiserror::Error;

pub use crate::config::StorageBackend;

/// Chunked object body, as produced by request bodies and storage reads.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("Failed to write object {key}: {source}")]
    WriteFailed {
        key: String,
        source: std::io::Error,
    },
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Where a client should send the bytes of a new object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadDestination {
    pub method: &'static str,
    pub url: String,
    pub object_id: String,
}

/// Result of a completed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    /// Canonical path under which the object can be read back.
    pub path: String,
    pub size: u64,
}

pub struct ObjectStream {
    pub stream: ByteStream,
    pub size: Option<u64>,
}

/// Abstraction over object storage backends.
/// The backend is picked once at startup and shared by every handler.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn backend(&self) -> StorageBackend;

    /// Mint a destination for a single upload.
    async fn upload_destination(&self) -> Result<UploadDestination, ObjectStoreError>;

    async fn put(&self, key: &str, data: Bytes) -> Result<StoredObject, ObjectStoreError>;

    async fn put_stream(
        &self,
        key: &str,
        mut stream: ByteStream,
    ) -> Result<StoredObject, ObjectStoreError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = stream.try_next().await? {
            buf.extend_from_slice(&chunk);
        }
        self.put(key, buf.freeze()).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError>;

    async fn get_stream(&self, key: &str) -> Result<ObjectStream, ObjectStoreError> {
        let data = self.get(key).await?;
        let size = data.len() as u64;
        Ok(ObjectStream {
            stream: futures::stream::once(async move { Ok(data) }).boxed(),
            size: Some(size),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError>;

    /// Rewrite a client-reported upload location into the stored path.
    fn normalize_path(&self, raw: &str) -> String {
        raw.to_string()
    }

    /// Resolve a public object path to a readable key, if any root holds it.
    async fn search_public(&self, _path: &str) -> Result<Option<String>, ObjectStoreError> {
        Ok(None)
    }
}
