use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::io::{ReaderStream, StreamReader};

use super::{
    ByteStream, ObjectStore, ObjectStoreError, ObjectStream, StorageBackend, StoredObject,
    UploadDestination,
};

/// Local filesystem object store. Uploads are proxied through the application.
pub struct LocalStore {
    base_path: PathBuf,
    public_base_url: String,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(
        base_path: P,
        public_base_url: impl Into<String>,
    ) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Path served by `GET /api/files/:objectId`.
    pub fn public_path(key: &str) -> String {
        format!("/api/files/{key}")
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }
}

/// Keys are a single plain path segment.
fn validate_key(key: &str) -> Result<(), ObjectStoreError> {
    if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\', '\0']) {
        return Err(ObjectStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Local
    }

    async fn upload_destination(&self) -> Result<UploadDestination, ObjectStoreError> {
        let object_id = uuid::Uuid::new_v4().to_string();
        Ok(UploadDestination {
            method: "PUT",
            url: format!("{}/api/upload/{object_id}", self.public_base_url),
            object_id,
        })
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<StoredObject, ObjectStoreError> {
        let path = self.object_path(key)?;
        tokio::fs::write(&path, &data)
            .await
            .map_err(|source| ObjectStoreError::WriteFailed {
                key: key.to_string(),
                source,
            })?;
        Ok(StoredObject {
            path: Self::public_path(key),
            size: data.len() as u64,
        })
    }

    async fn put_stream(
        &self,
        key: &str,
        stream: ByteStream,
    ) -> Result<StoredObject, ObjectStoreError> {
        let path = self.object_path(key)?;
        let write_failed = |source: std::io::Error| ObjectStoreError::WriteFailed {
            key: key.to_string(),
            source,
        };

        let mut file = tokio::fs::File::create(&path).await.map_err(write_failed)?;
        let mut reader = StreamReader::new(stream);
        let copied = match copy_and_flush(&mut reader, &mut file).await {
            Ok(n) => n,
            Err(e) => {
                drop(file);
                // Don't leave a truncated object behind
                let _ = tokio::fs::remove_file(&path).await;
                return Err(write_failed(e));
            }
        };

        Ok(StoredObject {
            path: Self::public_path(key),
            size: copied,
        })
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let path = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_stream(&self, key: &str) -> Result<ObjectStream, ObjectStoreError> {
        let path = self.object_path(key)?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ObjectStoreError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await?.len();

        Ok(ObjectStream {
            stream: ReaderStream::new(file).boxed(),
            size: Some(size),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let path = self.object_path(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    fn normalize_path(&self, raw: &str) -> String {
        // An upload URL handed out by this store maps onto its read route
        match raw.split_once("/api/upload/") {
            Some((_, key)) if validate_key(key).is_ok() => Self::public_path(key),
            _ => raw.to_string(),
        }
    }
}

async fn copy_and_flush<R, W>(reader: &mut R, file: &mut W) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let copied = tokio::io::copy(reader, file).await?;
    file.flush().await?;
    Ok(copied)
}
