use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wordlist: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolOutput {
    pub tool: String,
    pub exit_code: Option<i32>,
    pub output: String,
    pub truncated: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyView {
    pub id: String,
    pub role: String,
    pub created_at: u64,
    pub revoked: bool,
    pub label: Option<String>,
    pub rate_limit_per_minute: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedKey {
    pub token: String,
    pub key: KeyView,
}

/// The gateway's uniform error body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("gateway returned {status}: {}", .body.error)]
    Api {
        status: u16,
        retry_after: Option<u64>,
        body: ApiErrorBody,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SdkError {
    pub fn status(&self) -> Option<u16> {
        match self {
            SdkError::Api { status, .. } => Some(*status),
            SdkError::Http(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

pub struct GatewayClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GatewayClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    /// Send `key` as `X-API-Key` on every request.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Use a preconfigured HTTP client (proxy, TLS roots, timeouts).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// A builder for any gateway path, with the key header already set.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.header("X-API-Key", key),
            None => builder,
        }
    }

    pub async fn health(&self) -> Result<HealthResponse, SdkError> {
        json_response(self.request(Method::GET, "/health").send().await?).await
    }

    pub async fn run_tool(&self, tool: &str, request: &ToolRequest) -> Result<ToolOutput, SdkError> {
        let response = self
            .request(Method::POST, &format!("/api/tools/{}", tool))
            .json(request)
            .send()
            .await?;
        json_response(response).await
    }

    /// Fetch a file below the gateway's serving root.
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>, SdkError> {
        let response = self
            .request(Method::GET, "/api/files")
            .query(&[("path", path)])
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn quantum_status(&self) -> Result<serde_json::Value, SdkError> {
        json_response(self.request(Method::GET, "/api/quantum/status").send().await?).await
    }

    pub async fn quantum_random(&self, num_bits: u32) -> Result<serde_json::Value, SdkError> {
        let path = format!("/api/quantum/random/{}", num_bits);
        json_response(self.request(Method::GET, &path).send().await?).await
    }

    pub async fn admin_status(&self) -> Result<serde_json::Value, SdkError> {
        json_response(self.request(Method::GET, "/admin/status").send().await?).await
    }

    pub async fn list_keys(&self) -> Result<Vec<KeyView>, SdkError> {
        json_response(self.request(Method::GET, "/admin/keys").send().await?).await
    }

    pub async fn create_key(&self, role: &str, label: Option<&str>) -> Result<CreatedKey, SdkError> {
        let response = self
            .request(Method::POST, "/admin/keys")
            .json(&json!({ "role": role, "label": label }))
            .send()
            .await?;
        json_response(response).await
    }

    pub async fn revoke_key(&self, id: &str) -> Result<KeyView, SdkError> {
        let path = format!("/admin/keys/{}/revoke", id);
        json_response(self.request(Method::POST, &path).send().await?).await
    }
}

async fn check(response: Response) -> Result<Response, SdkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    let body = response.json::<ApiErrorBody>().await.unwrap_or_default();
    Err(SdkError::Api {
        status: status.as_u16(),
        retry_after,
        body,
    })
}

async fn json_response<T: DeserializeOwned>(response: Response) -> Result<T, SdkError> {
    Ok(check(response).await?.json().await?)
}
