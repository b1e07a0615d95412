//! OVC connection configuration and credential resolution.
//!
//! A client can be configured three ways, in order of precedence: an
//! explicit [`OvcConfig`] value, a JSON config file, or the
//! `SIMPLIVITYSDK_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{OvcError, OvcResult};

/// Environment variables recognised by [`OvcConfig::from_environment`].
pub const ENV_OVC_IP: &str = "SIMPLIVITYSDK_OVC_IP";
pub const ENV_USERNAME: &str = "SIMPLIVITYSDK_USERNAME";
pub const ENV_PASSWORD: &str = "SIMPLIVITYSDK_PASSWORD";
pub const ENV_SSL_CERTIFICATE: &str = "SIMPLIVITYSDK_SSL_CERTIFICATE";

// ── Credentials ─────────────────────────────────────────────────────────

/// Login credentials for the OmniStack Virtual Controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OvcCredentials {
    pub username: String,
    pub password: String,
}

impl OvcCredentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

// ── Connection configuration ────────────────────────────────────────────

/// Full connection configuration for an OVC session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OvcConfig {
    /// IP address or hostname of the OVC.
    pub ip: String,
    /// Login credentials.
    pub credentials: OvcCredentials,
    /// Path to a PEM CA bundle used to verify the OVC certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_certificate: Option<String>,
    /// Skip TLS certificate verification (self-signed OVC deployments).
    #[serde(default)]
    pub insecure: bool,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

impl OvcConfig {
    pub fn new(ip: &str, username: &str, password: &str) -> Self {
        Self {
            ip: ip.to_string(),
            credentials: OvcCredentials::new(username, password),
            ssl_certificate: None,
            insecure: false,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Resolve the configuration from `SIMPLIVITYSDK_*` environment variables.
    pub fn from_environment() -> OvcResult<Self> {
        let ip = require_env(ENV_OVC_IP)?;
        let username = require_env(ENV_USERNAME)?;
        let password = require_env(ENV_PASSWORD)?;
        let mut config = Self::new(&ip, &username, &password);
        config.ssl_certificate = std::env::var(ENV_SSL_CERTIFICATE).ok();
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration from a JSON file of the form
    /// `{"ip": "...", "credentials": {"username": "...", "password": "..."}}`.
    pub fn from_json_file(path: impl AsRef<Path>) -> OvcResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            OvcError::config(format!("Cannot read config file {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            OvcError::config(format!("Invalid config file {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> OvcResult<()> {
        if self.ip.is_empty() {
            return Err(OvcError::config("OVC IP address is required"));
        }
        if self.credentials.username.is_empty() {
            return Err(OvcError::config("Username is required"));
        }
        if self.credentials.password.is_empty() {
            return Err(OvcError::config("Password is required"));
        }
        Ok(())
    }

    /// Base URL of the REST API.
    pub fn base_url(&self) -> String {
        format!("https://{}", self.ip)
    }
}

fn require_env(name: &str) -> OvcResult<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OvcError::config(format!("Environment variable {name} is not set")))
}
