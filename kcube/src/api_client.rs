//! Thin typed wrapper over the server's REST-shaped sync API.

use serde_derive::{Deserialize, Serialize};

use crate::error::{CResult, Error};
use crate::message::Message;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VersionWire {
    pub hash: String,
    pub timestamp: i64,
    pub message: Message,
    pub manifest: std::collections::BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlobWire {
    pub hash: String,
    pub content_b64: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VaultSummary {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize)]
struct TokenRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Clone, Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Clone, Debug, Serialize)]
struct CreateVaultRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
}

#[derive(Clone, Debug, Serialize)]
struct SyncCheckRequest<'a> {
    local_version_hashes: &'a [String],
}

#[derive(Clone, Debug, Deserialize)]
pub struct SyncCheckResponse {
    pub versions_to_upload: Vec<String>,
    pub versions_to_download: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct UploadBlobsRequest<'a> {
    blobs: &'a [BlobWire],
}

#[derive(Clone, Debug, Deserialize)]
struct BlobsResponse {
    blobs: Vec<BlobWire>,
}

#[derive(Clone, Debug, Serialize)]
struct UploadVersionsRequest<'a> {
    versions: &'a [VersionWire],
}

#[derive(Clone, Debug, Deserialize)]
struct VersionsResponse {
    versions: Vec<VersionWire>,
}

/// Client for the K-Cube server's auth, vault-management, and sync
/// endpoints. Holds its own `reqwest::Client` so callers don't each pay for
/// a fresh connection pool.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: std::sync::RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> CResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(Self { http, base_url: base_url.into(), token: std::sync::RwLock::new(None) })
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.set_token(Some(token.into()));
        self
    }

    /// Updates the bearer token used on subsequent requests. Interior
    /// mutability so a `Supervisor` can update it through a shared
    /// `Arc<ApiClient>` without tearing down running workers.
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().expect("api client token lock poisoned") = token;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.read().expect("api client token lock poisoned").as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn classify_response<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> CResult<T> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await.map_err(|e| Error::Network(e.to_string()))?;
            return serde_json::from_str(&body).map_err(Error::from);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            401 | 403 => Error::Auth(body),
            404 => Error::NotFound(body),
            409 => Error::Conflict(body),
            code => Error::Server { status: code, body },
        })
    }

    async fn classify_empty(resp: reqwest::Response) -> CResult<()> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            401 | 403 => Error::Auth(body),
            404 => Error::NotFound(body),
            409 => Error::Conflict(body),
            code => Error::Server { status: code, body },
        })
    }

    pub async fn register(&self, email: &str, password: &str) -> CResult<()> {
        let resp = self
            .http
            .post(self.url("/auth/register"))
            .json(&TokenRequest { email, password })
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Self::classify_empty(resp).await
    }

    pub async fn login(&self, email: &str, password: &str) -> CResult<String> {
        let resp = self
            .http
            .post(self.url("/auth/token"))
            .json(&TokenRequest { email, password })
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        let decoded: TokenResponse = Self::classify_response(resp).await?;
        Ok(decoded.access_token)
    }

    pub async fn create_vault(&self, name: &str, id: Option<&str>) -> CResult<VaultSummary> {
        let resp = self
            .authorize(self.http.post(self.url("/api/v1/vaults")))
            .json(&CreateVaultRequest { name, id })
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Self::classify_response(resp).await
    }

    pub async fn list_vaults(&self) -> CResult<Vec<VaultSummary>> {
        let resp = self
            .authorize(self.http.get(self.url("/api/v1/vaults")))
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Self::classify_response(resp).await
    }

    pub async fn get_vault_details(&self, vault_id: &str) -> CResult<VaultSummary> {
        let resp = self
            .authorize(self.http.get(self.url(&format!("/api/v1/vaults/{vault_id}"))))
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Self::classify_response(resp).await
    }

    /// Tolerates the server's `204 No Content` response on delete, despite
    /// the client's general JSON-decoding policy (spec §9).
    pub async fn delete_vault(&self, vault_id: &str) -> CResult<()> {
        let resp = self
            .authorize(self.http.delete(self.url(&format!("/api/v1/vaults/{vault_id}"))))
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Self::classify_empty(resp).await
    }

    pub async fn check_sync_state(&self, vault_id: &str, local_hashes: &[String]) -> CResult<SyncCheckResponse> {
        let resp = self
            .authorize(self.http.post(self.url(&format!("/api/v1/vaults/{vault_id}/sync/check"))))
            .json(&SyncCheckRequest { local_version_hashes: local_hashes })
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Self::classify_response(resp).await
    }

    pub async fn upload_blobs(&self, vault_id: &str, blobs: &[BlobWire]) -> CResult<()> {
        let resp = self
            .authorize(self.http.post(self.url(&format!("/api/v1/vaults/{vault_id}/sync/blobs"))))
            .json(&UploadBlobsRequest { blobs })
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Self::classify_empty(resp).await
    }

    pub async fn download_blobs(&self, vault_id: &str, hashes: &[String]) -> CResult<Vec<BlobWire>> {
        let query: Vec<(&str, &str)> = hashes.iter().map(|h| ("h", h.as_str())).collect();
        let resp = self
            .authorize(self.http.get(self.url(&format!("/api/v1/vaults/{vault_id}/sync/blobs"))))
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        let decoded: BlobsResponse = Self::classify_response(resp).await?;
        Ok(decoded.blobs)
    }

    pub async fn upload_versions(&self, vault_id: &str, versions: &[VersionWire]) -> CResult<()> {
        let resp = self
            .authorize(self.http.post(self.url(&format!("/api/v1/vaults/{vault_id}/sync/versions"))))
            .json(&UploadVersionsRequest { versions })
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Self::classify_empty(resp).await
    }

    pub async fn download_versions(&self, vault_id: &str, hashes: &[String]) -> CResult<Vec<VersionWire>> {
        let query: Vec<(&str, &str)> = hashes.iter().map(|h| ("h", h.as_str())).collect();
        let resp = self
            .authorize(self.http.get(self.url(&format!("/api/v1/vaults/{vault_id}/sync/versions"))))
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        let decoded: VersionsResponse = Self::classify_response(resp).await?;
        Ok(decoded.versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_path() {
        let client = ApiClient::new("https://example.com").unwrap();
        assert_eq!(client.url("/auth/token"), "https://example.com/auth/token");
    }

    #[test]
    fn with_token_sets_bearer_token() {
        let client = ApiClient::new("https://example.com").unwrap().with_token("abc");
        assert_eq!(client.token.read().unwrap().as_deref(), Some("abc"));
    }
}
