use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub metadata: MetadataConfig,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Base URL handed out in local upload destinations
    pub public_base_url: String,
    /// CORS allowlist. Empty means any origin.
    pub frontend_origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Gcs,
    Local,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory for local storage backend
    pub local_storage_path: String,
    /// Present only when every required cloud variable is set
    pub cloud: Option<CloudConfig>,
}

#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub project_id: String,
    /// `/<bucket>/<prefix>` where uploaded entities live
    pub private_object_dir: String,
    /// Path to GCS service account JSON, used for tokens and URL signing
    pub credentials_file: String,
    /// Ordered `/<bucket>/<prefix>` roots searched by /public-objects
    pub public_search_paths: Vec<String>,
    /// Public base URL used by the legacy upload route
    pub public_url: Option<String>,
    pub signed_url_ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataBackend {
    Memory,
    Redb,
}

#[derive(Debug, Clone)]
pub struct MetadataConfig {
    pub backend: MetadataBackend,
    pub data_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3001".to_string(),
            public_base_url: "http://localhost:3001".to_string(),
            frontend_origins: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_storage_path: "./uploads".to_string(),
            cloud: None,
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            backend: MetadataBackend::Memory,
            data_dir: "./data".to_string(),
        }
    }
}

impl StorageConfig {
    /// The backend is fixed by whether the cloud set was complete at startup.
    pub fn backend(&self) -> StorageBackend {
        if self.cloud.is_some() {
            StorageBackend::Gcs
        } else {
            StorageBackend::Local
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port: u16 = match var("PORT") {
            Some(p) => p
                .parse()
                .map_err(|_| ConfigError::ValidationError(format!("PORT '{p}' is not a port")))?,
            None => 3001,
        };

        let bind_address = var("BIND_ADDRESS").unwrap_or_else(|| format!("0.0.0.0:{port}"));
        let public_base_url = var("API_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_string();
        let frontend_origins = var("FRONTEND_ORIGINS")
            .map(|s| split_list(&s))
            .unwrap_or_default();

        let max_upload_size = var("MAX_UPLOAD_SIZE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(50 * 1024 * 1024); // 50MB

        let local_storage_path =
            var("LOCAL_STORAGE_PATH").unwrap_or_else(|| "./uploads".to_string());

        // Cloud storage is all-or-nothing; a partial set falls back to local.
        let cloud = match (
            var("GOOGLE_CLOUD_PROJECT_ID"),
            var("PRIVATE_OBJECT_DIR"),
            var("GCS_CREDENTIALS_FILE"),
        ) {
            (Some(project_id), Some(private_object_dir), Some(credentials_file)) => {
                Some(CloudConfig {
                    project_id,
                    private_object_dir: private_object_dir.trim_end_matches('/').to_string(),
                    credentials_file,
                    public_search_paths: var("PUBLIC_OBJECT_SEARCH_PATHS")
                        .map(|s| split_list(&s))
                        .unwrap_or_default()
                        .into_iter()
                        .map(|p| p.trim_end_matches('/').to_string())
                        .collect(),
                    public_url: var("CLOUD_PUBLIC_URL"),
                    signed_url_ttl_secs: var("SIGNED_URL_TTL_SECS")
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(900),
                })
            }
            _ => None,
        };

        let backend = match var("METADATA_BACKEND")
            .unwrap_or_else(|| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => MetadataBackend::Memory,
            "redb" => MetadataBackend::Redb,
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "METADATA_BACKEND must be 'memory' or 'redb', got '{other}'"
                )))
            }
        };
        let data_dir = var("DATA_DIR").unwrap_or_else(|| "./data".to_string());

        let config = Config {
            server: ServerConfig {
                bind_address,
                public_base_url,
                frontend_origins,
            },
            storage: StorageConfig {
                local_storage_path,
                cloud,
            },
            metadata: MetadataConfig { backend, data_dir },
            max_upload_size,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref cloud) = self.storage.cloud {
            if split_object_path(&cloud.private_object_dir).is_none() {
                return Err(ConfigError::ValidationError(
                    "PRIVATE_OBJECT_DIR must look like /<bucket>/<prefix>".to_string(),
                ));
            }
            if let Some(bad) = cloud
                .public_search_paths
                .iter()
                .find(|p| split_object_path(p).is_none())
            {
                return Err(ConfigError::ValidationError(format!(
                    "PUBLIC_OBJECT_SEARCH_PATHS entry '{bad}' must look like /<bucket>/<prefix>"
                )));
            }
            if cloud.signed_url_ttl_secs == 0 || cloud.signed_url_ttl_secs > 604_800 {
                return Err(ConfigError::ValidationError(
                    "SIGNED_URL_TTL_SECS must be between 1 and 604800".to_string(),
                ));
            }
        }

        if self.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Split `/<bucket>/<object...>` into its bucket and object name.
pub fn split_object_path(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.strip_prefix('/')?;
    let (bucket, name) = trimmed.split_once('/').unwrap_or((trimmed, ""));
    if bucket.is_empty() {
        return None;
    }
    Some((bucket, name))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
