//! OmniStack REST API HTTP client with OAuth2 bearer authentication.
//!
//! Communicates with the OmniStack Virtual Controller via
//! `https://{ovc}/api/...`. Handles the password-grant token exchange, the
//! SimpliVity media type, typed request helpers, and polling of the task
//! envelopes every mutation returns.

use chrono::{DateTime, Utc};
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::config::OvcConfig;
use crate::error::{OvcError, OvcErrorKind, OvcResult};
use crate::types::{TaskEnvelope, TaskInfo, TaskState};

/// Versioned media type the OmniStack API speaks.
pub const MEDIA_TYPE: &str = "application/vnd.simplivity.v1+json";

/// Client ID of the OAuth password grant; fixed by the platform.
const OAUTH_CLIENT_ID: &str = "simplivity";

/// Seconds between task polls.
const TASK_POLL_SECS: u64 = 2;

/// Upper bound on one task wait. Federation-wide operations are slow, but a
/// task stuck past this is not going to finish.
const TASK_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// OmniStack REST API client.
pub struct OvcClient {
    client: Client,
    base_url: String,
    config: OvcConfig,
    access_token: Option<String>,
    token_expires_at: Option<DateTime<Utc>>,
}

impl OvcClient {
    /// Build a new client from config (does NOT authenticate yet).
    pub fn new(config: &OvcConfig) -> OvcResult<Self> {
        config.validate()?;

        let mut builder = Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .timeout(Duration::from_secs(config.timeout_secs));

        if let Some(path) = &config.ssl_certificate {
            let pem = std::fs::read(path).map_err(|e| {
                OvcError::config(format!("Cannot read CA bundle {path}: {e}"))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                OvcError::config(format!("Invalid CA bundle {path}: {e}"))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| OvcError::connection(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            config: config.clone(),
            access_token: None,
            token_expires_at: None,
        })
    }

    /// Base URL for API calls.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether we hold an access token.
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    /// Whether the token we hold has passed its advertised lifetime.
    pub fn token_expired(&self) -> bool {
        match self.token_expires_at {
            Some(expires_at) => Utc::now() > expires_at,
            None => self.access_token.is_none(),
        }
    }

    /// Current config.
    pub fn config(&self) -> &OvcConfig {
        &self.config
    }

    // ── Authentication ──────────────────────────────────────────────

    /// Obtain a bearer token (POST /api/oauth/token, password grant).
    pub async fn login(&mut self) -> OvcResult<()> {
        let url = format!("{}/api/oauth/token", self.base_url);
        let form = [
            ("grant_type", "password"),
            ("username", self.config.credentials.username.as_str()),
            ("password", self.config.credentials.password.as_str()),
        ];

        let resp = self
            .client
            .post(&url)
            .basic_auth(OAUTH_CLIENT_ID, Some(""))
            .header(header::ACCEPT, MEDIA_TYPE)
            .form(&form)
            .send()
            .await?;

        if resp.status() == StatusCode::UNAUTHORIZED || resp.status() == StatusCode::BAD_REQUEST {
            return Err(OvcError::auth("Invalid OVC credentials"));
        }

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OvcError::from_api_body(status.as_u16(), &body, "Login failed"));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| OvcError::parse(format!("Failed to parse token response: {e}")))?;

        self.token_expires_at = token
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        self.access_token = Some(token.access_token);
        log::debug!("authenticated against {}", self.base_url);
        Ok(())
    }

    /// Drop the token. OmniStack tokens cannot be revoked server-side; they
    /// simply age out.
    pub fn logout(&mut self) {
        self.access_token = None;
        self.token_expires_at = None;
    }

    // ── HTTP helpers ────────────────────────────────────────────────

    fn require_token(&self) -> OvcResult<&str> {
        self.access_token
            .as_deref()
            .ok_or_else(|| OvcError::auth("Not logged in: no access token"))
    }

    /// GET a JSON response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> OvcResult<T> {
        let token = self.require_token()?;
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header(header::ACCEPT, MEDIA_TYPE)
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Self::parse_response(resp).await
    }

    /// GET a JSON response with query params.
    pub async fn get_with_params<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> OvcResult<T> {
        let token = self.require_token()?;
        let url = format!("{}{}", self.base_url, path);
        let borrowed: Vec<(&str, &str)> =
            params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header(header::ACCEPT, MEDIA_TYPE)
            .query(&borrowed)
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Self::parse_response(resp).await
    }

    /// POST with JSON body, return parsed response.
    pub async fn post<B: serde::Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> OvcResult<T> {
        let token = self.require_token()?;
        let url = format!("{}{}", self.base_url, path);
        let payload = serde_json::to_string(body)?;
        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(header::ACCEPT, MEDIA_TYPE)
            .header(header::CONTENT_TYPE, MEDIA_TYPE)
            .body(payload)
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Self::parse_response(resp).await
    }

    /// POST with an empty JSON body, for the mutation endpoints that take no
    /// parameters.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> OvcResult<T> {
        self.post(path, &serde_json::json!({})).await
    }

    /// DELETE, returning the parsed response body.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> OvcResult<T> {
        let token = self.require_token()?;
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .delete(&url)
            .bearer_auth(token)
            .header(header::ACCEPT, MEDIA_TYPE)
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        Self::parse_response(resp).await
    }

    // ── Tasks ───────────────────────────────────────────────────────

    /// Fetch one task (GET /api/tasks/{id}).
    pub async fn get_task(&self, task_id: &str) -> OvcResult<TaskInfo> {
        let envelope: TaskEnvelope = self.get(&format!("/api/tasks/{task_id}")).await?;
        Ok(envelope.task)
    }

    /// Poll a task until it leaves `IN_PROGRESS`, then return it (or a task
    /// error for anything but `COMPLETED`). This finishes the single logical
    /// remote call a mutation endpoint started.
    pub async fn wait_for_task(&self, task_id: &str) -> OvcResult<TaskInfo> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(TASK_TIMEOUT_SECS);

        loop {
            let task = self.get_task(task_id).await?;
            if task.state.is_terminal() {
                return Self::finished_task(task);
            }
            log::debug!(
                "task {task_id} in progress ({}%)",
                task.percent_complete.unwrap_or(0)
            );
            if tokio::time::Instant::now() >= deadline {
                return Err(OvcError::timeout(format!(
                    "Task {task_id} still in progress after {TASK_TIMEOUT_SECS}s"
                )));
            }
            tokio::time::sleep(Duration::from_secs(TASK_POLL_SECS)).await;
        }
    }

    /// POST a mutation and wait out the task it returns.
    pub async fn post_task<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> OvcResult<TaskInfo> {
        let envelope: TaskEnvelope = self.post(path, body).await?;
        self.wait_for_task(&envelope.task.id).await
    }

    /// DELETE a resource and wait out the task it returns.
    pub async fn delete_task(&self, path: &str) -> OvcResult<TaskInfo> {
        let envelope: TaskEnvelope = self.delete(path).await?;
        self.wait_for_task(&envelope.task.id).await
    }

    fn finished_task(task: TaskInfo) -> OvcResult<TaskInfo> {
        match task.state {
            TaskState::Completed => Ok(task),
            _ => {
                let detail = task
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("error code {}", task.error_code.unwrap_or(0)));
                log::warn!("task {} failed: {detail}", task.id);
                Err(OvcError::task(format!("Task {} failed: {detail}", task.id)))
            }
        }
    }

    // ── Internal helpers ────────────────────────────────────────────

    async fn check_status(resp: Response) -> OvcResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let code = status.as_u16();
        let body = resp.text().await.unwrap_or_default();

        match status {
            StatusCode::UNAUTHORIZED => {
                Err(OvcError::auth(format!("Token expired or invalid: {body}")))
            }
            StatusCode::FORBIDDEN => Err(OvcError::new(
                OvcErrorKind::AccessDenied,
                format!("Access denied: {body}"),
            )),
            StatusCode::NOT_FOUND => {
                Err(OvcError::not_found(format!("Resource not found: {body}")))
            }
            _ => Err(OvcError::from_api_body(code, &body, "API error")),
        }
    }

    async fn parse_response<T: DeserializeOwned>(resp: Response) -> OvcResult<T> {
        let text = resp
            .text()
            .await
            .map_err(|e| OvcError::parse(format!("Failed to read response body: {e}")))?;

        if text.is_empty() {
            // A few endpoints answer success with no body
            return serde_json::from_str("null")
                .map_err(|e| OvcError::parse(format!("Cannot deserialise empty response: {e}")));
        }

        serde_json::from_str(&text).map_err(|e| {
            let snippet: String = text.chars().take(500).collect();
            OvcError::parse(format!("JSON parse error: {e}; body: {snippet}"))
        })
    }
}

// The embedded config carries the password; keep it out of debug output.
impl fmt::Debug for OvcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OvcClient")
            .field("base_url", &self.base_url)
            .field("username", &self.config.credentials.username)
            .field("authenticated", &self.is_authenticated())
            .field("token_expires_at", &self.token_expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OvcConfig {
        OvcConfig::new("10.0.0.5", "svtuser", "svtpass")
    }

    #[test]
    fn new_client_is_unauthenticated() {
        let client = OvcClient::new(&config()).unwrap();
        assert!(!client.is_authenticated());
        assert!(client.token_expired());
        assert_eq!(client.base_url(), "https://10.0.0.5");
    }

    #[test]
    fn new_client_rejects_bad_config() {
        let err = OvcClient::new(&OvcConfig::new("", "u", "p")).unwrap_err();
        assert_eq!(err.kind, OvcErrorKind::ConfigError);

        let mut cfg = config();
        cfg.ssl_certificate = Some("/nonexistent/ca.pem".to_string());
        let err = OvcClient::new(&cfg).unwrap_err();
        assert_eq!(err.kind, OvcErrorKind::ConfigError);
    }

    #[test]
    fn debug_output_redacts_credentials() {
        let mut client = OvcClient::new(&config()).unwrap();
        client.access_token = Some("opaque-bearer".to_string());
        let dump = format!("{client:?}");
        assert!(dump.contains("svtuser"));
        assert!(!dump.contains("svtpass"));
        assert!(!dump.contains("opaque-bearer"));
    }

    #[tokio::test]
    async fn requests_require_login() {
        let client = OvcClient::new(&config()).unwrap();
        let err = client.get::<serde_json::Value>("/api/hosts").await.unwrap_err();
        assert_eq!(err.kind, OvcErrorKind::AuthenticationError);

        let err = client
            .post_empty::<serde_json::Value>("/api/hosts/h1/remove_from_federation")
            .await
            .unwrap_err();
        assert_eq!(err.kind, OvcErrorKind::AuthenticationError);
    }

    #[test]
    fn logout_drops_token() {
        let mut client = OvcClient::new(&config()).unwrap();
        client.access_token = Some("t".to_string());
        client.token_expires_at = Some(Utc::now() + chrono::Duration::seconds(60));
        assert!(client.is_authenticated());
        assert!(!client.token_expired());

        client.logout();
        assert!(!client.is_authenticated());
        assert!(client.token_expired());
    }
}
