//! Client side of the two-phase upload: obtain a destination, send the bytes
//! straight to it, then register the metadata.
//!
//! Registration happens only after a successful transfer. A failure after the
//! transfer leaves the bytes stored but unreferenced.

use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;

use crate::storage::models::{ImageRecord, ModelRecord, NewImage, NewModel};
use crate::viewer::{compute_stats, ModelStats, ParserRegistry};

/// Largest file the client will try to send.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{name} is {size} bytes, over the {limit} byte limit")]
    TooLarge { name: String, size: u64, limit: u64 },
    #[error("Failed to obtain upload destination: {0}")]
    Destination(String),
    #[error("Upload transfer failed: {0}")]
    Transfer(String),
    #[error("Failed to register upload: {0}")]
    Register(String),
}

/// A pre-authorized upload target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub method: reqwest::Method,
    pub url: String,
}

/// A file picked by the user.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            data: data.into(),
        }
    }

    fn content_type(&self) -> String {
        self.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&self.name)
                .first_or_octet_stream()
                .to_string()
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DestinationResponse {
    #[serde(rename = "uploadURL")]
    upload_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferReceipt {
    file_path: Option<String>,
}

pub struct UploadClient {
    base_url: String,
    http: reqwest::Client,
    max_file_size: u64,
    parsers: ParserRegistry,
}

impl UploadClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            parsers: ParserRegistry::with_builtin(),
        }
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    pub fn with_parsers(mut self, parsers: ParserRegistry) -> Self {
        self.parsers = parsers;
        self
    }

    pub async fn request_destination(&self) -> Result<Destination, UploadError> {
        let resp = self
            .http
            .post(format!("{}/api/objects/upload", self.base_url))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| UploadError::Destination(e.to_string()))?;
        let body: DestinationResponse = resp
            .json()
            .await
            .map_err(|e| UploadError::Destination(e.to_string()))?;

        Ok(Destination {
            method: reqwest::Method::PUT,
            url: body.upload_url,
        })
    }

    /// Send the bytes. Returns the path to register: the one the server
    /// reports when it proxies the upload, otherwise the destination itself.
    pub async fn transfer(
        &self,
        destination: &Destination,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, UploadError> {
        let resp = self
            .http
            .request(destination.method.clone(), &destination.url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await
            .map_err(|e| UploadError::Transfer(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UploadError::Transfer(format!("{status}: {body}")));
        }

        let receipt = resp.json::<TransferReceipt>().await.ok();
        Ok(receipt
            .and_then(|r| r.file_path)
            .unwrap_or_else(|| destination.url.clone()))
    }

    /// Vertex and triangle counts, when a parser understands the file.
    pub fn model_stats(&self, file: &UploadFile) -> Option<ModelStats> {
        let parser = self.parsers.for_path(&file.name)?;
        match parser.parse(&file.name, &file.data) {
            Ok(object) => Some(compute_stats(&object)),
            Err(e) => {
                tracing::debug!(name = %file.name, error = %e, "Skipping model statistics");
                None
            }
        }
    }

    pub async fn upload_model(
        &self,
        file: UploadFile,
        description: Option<String>,
    ) -> Result<ModelRecord, UploadError> {
        let file_size = self.check_size(&file)?;
        let file_path = self.send(&file).await?;
        let stats = self.model_stats(&file);

        self.register_model(NewModel {
            name: file.name,
            file_path,
            file_size,
            vertices: stats.map(|s| s.vertices),
            triangles: stats.map(|s| s.triangles),
            description,
        })
        .await
    }

    pub async fn upload_image(
        &self,
        file: UploadFile,
        category: Option<String>,
        description: Option<String>,
    ) -> Result<ImageRecord, UploadError> {
        self.check_size(&file)?;
        let file_path = self.send(&file).await?;

        self.register_image(NewImage {
            name: file.name,
            file_path,
            category,
            description,
        })
        .await
    }

    pub async fn register_model(&self, model: NewModel) -> Result<ModelRecord, UploadError> {
        self.register("/api/models", &model).await
    }

    pub async fn register_image(&self, image: NewImage) -> Result<ImageRecord, UploadError> {
        self.register("/api/images", &image).await
    }

    fn check_size(&self, file: &UploadFile) -> Result<u64, UploadError> {
        let size = file.data.len() as u64;
        if size > self.max_file_size {
            return Err(UploadError::TooLarge {
                name: file.name.clone(),
                size,
                limit: self.max_file_size,
            });
        }
        Ok(size)
    }

    async fn send(&self, file: &UploadFile) -> Result<String, UploadError> {
        let destination = self.request_destination().await?;
        let path = self
            .transfer(&destination, file.data.clone(), &file.content_type())
            .await?;
        tracing::debug!(name = %file.name, path = %path, "Transferred upload");
        Ok(path)
    }

    async fn register<B, R>(&self, route: &str, body: &B) -> Result<R, UploadError>
    where
        B: serde::Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let resp = self
            .http
            .post(format!("{}{route}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| UploadError::Register(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UploadError::Register(format!("{status}: {body}")));
        }
        resp.json()
            .await
            .map_err(|e| UploadError::Register(e.to_string()))
    }
}
