use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use super::{ObjectMeta, ObjectStore, ObjectStoreError};

const API_ROOT: &str = "https://storage.googleapis.com";
/// Refresh the bearer token this long before Google says it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(120);

/// Google Cloud Storage object store backend (JSON API).
pub struct GcsStore {
    bucket: String,
    client: Client,
    access_token: tokio::sync::RwLock<AccessToken>,
    credentials_file: Option<String>,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcsObject {
    name: String,
    size: String,
    time_created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<GcsObject>,
    next_page_token: Option<String>,
}

impl TryFrom<GcsObject> for ObjectMeta {
    type Error = ObjectStoreError;

    fn try_from(obj: GcsObject) -> Result<Self, Self::Error> {
        let size = obj.size.parse().map_err(|e| {
            ObjectStoreError::Backend(format!("Invalid size for {}: {e}", obj.name))
        })?;
        Ok(ObjectMeta {
            key: obj.name,
            size,
            created_at: obj.time_created,
            updated_at: obj.updated,
        })
    }
}

impl GcsStore {
    pub async fn new(
        bucket: &str,
        credentials_file: Option<&str>,
        request_timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let client = Client::builder().timeout(request_timeout).build()?;

        let store = Self {
            bucket: bucket.to_string(),
            client,
            access_token: tokio::sync::RwLock::new(AccessToken {
                value: String::new(),
                expires_at: Instant::now(),
            }),
            credentials_file: credentials_file.map(|s| s.to_string()),
        };

        store.refresh_token().await?;
        Ok(store)
    }

    async fn refresh_token(&self) -> Result<(), anyhow::Error> {
        let token = if let Some(ref creds_path) = self.credentials_file {
            self.token_from_service_account(creds_path).await?
        } else {
            self.token_from_metadata_server().await?
        };

        let mut lock = self.access_token.write().await;
        *lock = AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        };
        tracing::debug!(expires_in = token.expires_in, "Refreshed GCS access token");
        Ok(())
    }

    async fn token_from_service_account(&self, path: &str) -> Result<TokenResponse, anyhow::Error> {
        let key_json = tokio::fs::read_to_string(path).await?;
        let key: ServiceAccountKey = serde_json::from_str(&key_json)?;

        let now = Utc::now().timestamp();
        let claims = serde_json::json!({
            "iss": key.client_email,
            "scope": "https://www.googleapis.com/auth/devstorage.read_write",
            "aud": key.token_uri,
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

        let signature = sign_rs256(unsigned.as_bytes(), &key.private_key)?;
        let jwt = format!("{unsigned}.{}", base64_url_encode(&signature));

        let resp: TokenResponse = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp)
    }

    async fn token_from_metadata_server(&self) -> Result<TokenResponse, anyhow::Error> {
        let resp: TokenResponse = self
            .client
            .get("http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token")
            .header("Metadata-Flavor", "Google")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp)
    }

    /// Current bearer token, refreshed first if it is close to expiry.
    async fn bearer(&self) -> Result<String, ObjectStoreError> {
        {
            let token = self.access_token.read().await;
            if token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(token.value.clone());
            }
        }

        self.refresh_token()
            .await
            .map_err(|e| ObjectStoreError::Backend(format!("GCS token refresh failed: {e}")))?;
        Ok(self.access_token.read().await.value.clone())
    }

    fn api_url(&self, segments: &[&str]) -> Result<Url, ObjectStoreError> {
        let mut url = Url::parse(API_ROOT).map_err(|e| ObjectStoreError::Backend(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ObjectStoreError::Backend("GCS API root cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Object names contain `/`, so they are pushed as one encoded segment.
    fn metadata_url(&self, key: &str) -> Result<Url, ObjectStoreError> {
        self.api_url(&["storage", "v1", "b", &self.bucket, "o", key])
    }

    fn object_url(&self, key: &str) -> Result<Url, ObjectStoreError> {
        let mut url = self.metadata_url(key)?;
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    fn upload_url(&self, key: &str) -> Result<Url, ObjectStoreError> {
        let mut url = self.api_url(&["upload", "storage", "v1", "b", &self.bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);
        Ok(url)
    }

    fn list_url(&self, prefix: &str, page_token: Option<&str>) -> Result<Url, ObjectStoreError> {
        let mut url = self.api_url(&["storage", "v1", "b", &self.bucket, "o"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("prefix", prefix);
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        Ok(url)
    }
}

async fn backend_failure(action: &str, resp: reqwest::Response) -> ObjectStoreError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    ObjectStoreError::Backend(format!("GCS {action} failed ({status}): {body}"))
}

fn transport_error(e: reqwest::Error) -> ObjectStoreError {
    ObjectStoreError::Backend(e.to_string())
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, ObjectStoreError> {
        let token = self.bearer().await?;

        let resp = self
            .client
            .get(self.metadata_url(key)?)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport_error)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(backend_failure("metadata lookup", resp).await);
        }

        let obj: GcsObject = resp.json().await.map_err(transport_error)?;
        Ok(Some(obj.try_into()?))
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let token = self.bearer().await?;

        let resp = self
            .client
            .get(self.object_url(key)?)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport_error)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }
        if !resp.status().is_success() {
            return Err(backend_failure("download", resp).await);
        }

        resp.bytes().await.map_err(transport_error)
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        let token = self.bearer().await?;

        let resp = self
            .client
            .post(self.upload_url(key)?)
            .bearer_auth(&token)
            .header("Content-Type", "video/mp4")
            .body(data)
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(backend_failure("upload", resp).await);
        }

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        Ok(self.head(key).await?.is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, ObjectStoreError> {
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let token = self.bearer().await?;
            let resp = self
                .client
                .get(self.list_url(prefix, page_token.as_deref())?)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(transport_error)?;

            if !resp.status().is_success() {
                return Err(backend_failure("list", resp).await);
            }

            let page: ListResponse = resp.json().await.map_err(transport_error)?;
            for obj in page.items {
                objects.push(obj.try_into()?);
            }

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(objects)
    }
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

fn sign_rs256(data: &[u8], private_key_pem: &str) -> Result<Vec<u8>, anyhow::Error> {
    // Strip PEM armor and decode the base64 body to PKCS#8 DER
    let der_b64: String = private_key_pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_names_are_encoded_as_one_segment() {
        let url = Url::parse(API_ROOT)
            .map(|mut url| {
                url.path_segments_mut()
                    .expect("https url has segments")
                    .pop_if_empty()
                    .extend(["storage", "v1", "b", "bucket", "o", "2025/01/seacliff.mp4"]);
                url
            })
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/bucket/o/2025%2F01%2Fseacliff.mp4"
        );
    }

    #[test]
    fn gcs_object_converts_to_meta() {
        let obj: GcsObject = serde_json::from_value(serde_json::json!({
            "name": "2025/01/seacliff-2025-01-02T03:04-00-0800.mp4",
            "size": "4096",
            "timeCreated": "2025-01-02T11:04:10.123Z",
            "updated": "2025-01-02T11:05:00Z",
        }))
        .unwrap();

        let meta = ObjectMeta::try_from(obj).unwrap();
        assert_eq!(meta.size, 4096);
        assert_eq!(meta.key, "2025/01/seacliff-2025-01-02T03:04-00-0800.mp4");
        assert!(meta.updated_at > meta.created_at);
    }

    #[test]
    fn list_page_without_items_is_empty() {
        let page: ListResponse = serde_json::from_str(r#"{"kind":"storage#objects"}"#).unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_page_token.is_none());
    }
}
