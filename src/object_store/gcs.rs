use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};

use super::{
    ObjectStore, ObjectStoreError, ObjectStream, StorageBackend, StoredObject, UploadDestination,
};
use crate::config::{split_object_path, CloudConfig};

const STORAGE_HOST: &str = "storage.googleapis.com";
const SIGNING_ALGORITHM: &str = "GOOG4-RSA-SHA256";
/// Access tokens live for an hour; refresh well before that.
const TOKEN_MAX_AGE: Duration = Duration::from_secs(50 * 60);

/// Google Cloud Storage object store backend.
///
/// Keys starting with `/` are absolute `/<bucket>/<object>` paths; any other
/// key is an entity id relative to the private object directory.
pub struct GcsStore {
    client: Client,
    key: ServiceAccountKey,
    private_bucket: String,
    private_prefix: String,
    private_object_dir: String,
    public_search_paths: Vec<String>,
    signed_url_ttl_secs: u64,
    access_token: tokio::sync::RwLock<Option<CachedToken>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

struct CachedToken {
    value: String,
    fetched_at: Instant,
}

impl GcsStore {
    /// Read the service account key and fetch a first access token.
    pub async fn new(cloud: &CloudConfig) -> Result<Self, anyhow::Error> {
        let key_json = tokio::fs::read_to_string(&cloud.credentials_file).await?;
        let key: ServiceAccountKey = serde_json::from_str(&key_json)?;

        let store = Self::from_key(key, cloud)?;
        store.refresh_token().await?;
        Ok(store)
    }

    /// Build a store without touching the network. Tokens are fetched lazily.
    pub fn from_key(key: ServiceAccountKey, cloud: &CloudConfig) -> Result<Self, anyhow::Error> {
        let (bucket, prefix) = split_object_path(&cloud.private_object_dir).ok_or_else(|| {
            anyhow::anyhow!(
                "invalid private object dir: {}",
                cloud.private_object_dir
            )
        })?;

        Ok(Self {
            client: Client::builder().build()?,
            key,
            private_bucket: bucket.to_string(),
            private_prefix: prefix.trim_end_matches('/').to_string(),
            private_object_dir: cloud.private_object_dir.clone(),
            public_search_paths: cloud.public_search_paths.clone(),
            signed_url_ttl_secs: cloud.signed_url_ttl_secs,
            access_token: tokio::sync::RwLock::new(None),
        })
    }

    async fn refresh_token(&self) -> Result<String, anyhow::Error> {
        let token = self.token_from_service_account().await?;

        let mut lock = self.access_token.write().await;
        *lock = Some(CachedToken {
            value: token.clone(),
            fetched_at: Instant::now(),
        });
        Ok(token)
    }

    async fn bearer(&self) -> Result<String, ObjectStoreError> {
        {
            let lock = self.access_token.read().await;
            if let Some(ref cached) = *lock {
                if cached.fetched_at.elapsed() < TOKEN_MAX_AGE {
                    return Ok(cached.value.clone());
                }
            }
        }
        tracing::debug!("Refreshing GCS access token");
        self.refresh_token()
            .await
            .map_err(|e| ObjectStoreError::Backend(format!("token refresh failed: {e}")))
    }

    async fn token_from_service_account(&self) -> Result<String, anyhow::Error> {
        let now = Utc::now().timestamp();
        let claims = serde_json::json!({
            "iss": self.key.client_email,
            "scope": "https://www.googleapis.com/auth/devstorage.read_write",
            "aud": self.key.token_uri,
            "iat": now,
            "exp": now + 3600,
        });

        // Build JWT (header.claims.signature)
        let header = base64_url_encode(&serde_json::to_vec(&serde_json::json!({
            "alg": "RS256",
            "typ": "JWT"
        }))?);
        let payload = base64_url_encode(&serde_json::to_vec(&claims)?);
        let unsigned = format!("{header}.{payload}");

        let signature = sign_rs256(unsigned.as_bytes(), &self.key.private_key)?;
        let jwt = format!("{unsigned}.{}", base64_url_encode(&signature));

        let resp: TokenResponse = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp.access_token)
    }

    /// Resolve a key to `(bucket, object name)`.
    fn resolve(&self, key: &str) -> Result<(String, String), ObjectStoreError> {
        if key.starts_with('/') {
            let (bucket, name) = split_object_path(key)
                .filter(|(_, name)| !name.is_empty())
                .ok_or_else(|| ObjectStoreError::InvalidKey(key.to_string()))?;
            return Ok((bucket.to_string(), name.to_string()));
        }

        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(ObjectStoreError::InvalidKey(key.to_string()));
        }
        let name = if self.private_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{key}", self.private_prefix)
        };
        Ok((self.private_bucket.clone(), name))
    }

    /// Path under which a stored key is served back.
    fn entity_path(key: &str) -> String {
        if key.starts_with('/') {
            key.to_string()
        } else {
            format!("/objects/{key}")
        }
    }

    fn upload_url(bucket: &str, name: &str) -> String {
        format!(
            "https://{STORAGE_HOST}/upload/storage/v1/b/{bucket}/o?uploadType=media&name={}",
            encode_query_value(name)
        )
    }

    fn object_url(bucket: &str, name: &str) -> String {
        format!(
            "https://{STORAGE_HOST}/storage/v1/b/{bucket}/o/{}?alt=media",
            encode_component(name)
        )
    }

    fn metadata_url(bucket: &str, name: &str) -> String {
        format!(
            "https://{STORAGE_HOST}/storage/v1/b/{bucket}/o/{}",
            encode_component(name)
        )
    }

    /// Produce a V4 signed URL for a single request against `bucket/name`.
    pub fn signed_url(
        &self,
        method: &str,
        bucket: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<String, anyhow::Error> {
        let request = SignedRequest::new(
            method,
            bucket,
            name,
            &self.key.client_email,
            now,
            self.signed_url_ttl_secs,
        );
        let signature = sign_rs256(request.string_to_sign().as_bytes(), &self.key.private_key)?;
        Ok(request.url(&hex::encode(signature)))
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Gcs
    }

    async fn upload_destination(&self) -> Result<UploadDestination, ObjectStoreError> {
        let object_id = uuid::Uuid::new_v4().to_string();
        let (bucket, name) = self.resolve(&format!("uploads/{object_id}"))?;
        let url = self
            .signed_url("PUT", &bucket, &name, Utc::now())
            .map_err(|e| ObjectStoreError::Backend(format!("failed to sign upload URL: {e}")))?;

        Ok(UploadDestination {
            method: "PUT",
            url,
            object_id,
        })
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<StoredObject, ObjectStoreError> {
        let (bucket, name) = self.resolve(key)?;
        let token = self.bearer().await?;
        let size = data.len() as u64;
        let content_type = mime_guess::from_path(&name)
            .first_or_octet_stream()
            .to_string();

        let resp = self
            .client
            .post(Self::upload_url(&bucket, &name))
            .bearer_auth(&token)
            .header("Content-Type", content_type)
            .body(data)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "GCS upload failed ({status}): {body}"
            )));
        }

        Ok(StoredObject {
            path: Self::entity_path(key),
            size,
        })
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let ObjectStream { stream, .. } = self.get_stream(key).await?;
        let chunks: Vec<Bytes> = stream.try_collect().await?;
        Ok(Bytes::from(chunks.concat()))
    }

    async fn get_stream(&self, key: &str) -> Result<ObjectStream, ObjectStoreError> {
        let (bucket, name) = self.resolve(key)?;
        let token = self.bearer().await?;

        let resp = self
            .client
            .get(Self::object_url(&bucket, &name))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "GCS download failed ({status}): {body}"
            )));
        }

        let size = resp.content_length();
        Ok(ObjectStream {
            stream: resp.bytes_stream().map_err(std::io::Error::other).boxed(),
            size,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let (bucket, name) = self.resolve(key)?;
        let token = self.bearer().await?;

        let resp = self
            .client
            .delete(Self::metadata_url(&bucket, &name))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        // 404 is fine -- object already gone
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "GCS delete failed ({status}): {body}"
            )));
        }

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let (bucket, name) = self.resolve(key)?;
        let token = self.bearer().await?;

        let resp = self
            .client
            .get(Self::metadata_url(&bucket, &name))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        Ok(resp.status().is_success())
    }

    fn normalize_path(&self, raw: &str) -> String {
        normalize_entity_path(raw, &self.private_object_dir)
    }

    async fn search_public(&self, path: &str) -> Result<Option<String>, ObjectStoreError> {
        let path = path.trim_start_matches('/');
        for root in &self.public_search_paths {
            let candidate = format!("{root}/{path}");
            if self.exists(&candidate).await? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }
}

/// Map a raw GCS URL inside the private directory onto `/objects/<entity>`.
fn normalize_entity_path(raw: &str, private_object_dir: &str) -> String {
    if !raw.starts_with(&format!("https://{STORAGE_HOST}/")) {
        return raw.to_string();
    }
    let Ok(parsed) = url::Url::parse(raw) else {
        return raw.to_string();
    };
    let path = parsed.path();

    let dir = format!("{}/", private_object_dir.trim_end_matches('/'));
    match path.strip_prefix(&dir) {
        Some(entity) if !entity.is_empty() => format!("/objects/{entity}"),
        _ => path.to_string(),
    }
}

/// Canonical pieces of a V4 signed request.
struct SignedRequest {
    method: String,
    resource: String,
    query: String,
    datetime: String,
    scope: String,
}

impl SignedRequest {
    fn new(
        method: &str,
        bucket: &str,
        name: &str,
        client_email: &str,
        now: DateTime<Utc>,
        ttl_secs: u64,
    ) -> Self {
        let datetime = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{date}/auto/storage/goog4_request");
        let credential = format!("{client_email}/{scope}");

        let encoded_name: Vec<String> = name.split('/').map(encode_component).collect();
        let resource = format!("/{bucket}/{}", encoded_name.join("/"));

        // Parameters must be sorted by name
        let query = [
            ("X-Goog-Algorithm", SIGNING_ALGORITHM.to_string()),
            ("X-Goog-Credential", credential),
            ("X-Goog-Date", datetime.clone()),
            ("X-Goog-Expires", ttl_secs.to_string()),
            ("X-Goog-SignedHeaders", "host".to_string()),
        ]
        .iter()
        .map(|(k, v)| format!("{k}={}", encode_component(v)))
        .collect::<Vec<_>>()
        .join("&");

        Self {
            method: method.to_string(),
            resource,
            query,
            datetime,
            scope,
        }
    }

    fn canonical_request(&self) -> String {
        format!(
            "{}\n{}\n{}\nhost:{STORAGE_HOST}\n\nhost\nUNSIGNED-PAYLOAD",
            self.method, self.resource, self.query
        )
    }

    fn string_to_sign(&self) -> String {
        let digest = ring::digest::digest(&ring::digest::SHA256, self.canonical_request().as_bytes());
        format!(
            "{SIGNING_ALGORITHM}\n{}\n{}\n{}",
            self.datetime,
            self.scope,
            hex::encode(digest.as_ref())
        )
    }

    fn url(&self, signature_hex: &str) -> String {
        format!(
            "https://{STORAGE_HOST}{}?{}&X-Goog-Signature={signature_hex}",
            self.resource, self.query
        )
    }
}

/// Everything except RFC 3986 unreserved characters.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode for a URL path segment or a V4 canonical query value.
fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, UNRESERVED).to_string()
}

fn encode_query_value(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

fn sign_rs256(data: &[u8], private_key_pem: &str) -> Result<Vec<u8>, anyhow::Error> {
    // Strip PEM headers and decode base64
    let der_b64: String = private_key_pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .map(str::trim)
        .collect();
    let der = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &der_b64)?;

    let key_pair = ring::signature::RsaKeyPair::from_pkcs8(&der)
        .map_err(|e| anyhow::anyhow!("Failed to parse RSA key: {e}"))?;

    let mut signature = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(
            &ring::signature::RSA_PKCS1_SHA256,
            &ring::rand::SystemRandom::new(),
            data,
            &mut signature,
        )
        .map_err(|e| anyhow::anyhow!("Failed to sign: {e}"))?;

    Ok(signature)
}
