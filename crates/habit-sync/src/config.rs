//! Remote service configuration.
//!
//! The remote document service needs four values, delivered either through
//! `FIREBASE_*` environment variables or as the JSON body of a configuration
//! endpoint. A remote service built from it (see
//! `MemoryDocumentService::with_config`) reports
//! [`RemoteConfig::is_configured`] through
//! `RemoteDocumentService::is_configured`, which gates the sync engine.
//!
//! ```rust
//! use habit_sync::config::RemoteConfig;
//!
//! let body = r#"{"apiKey":"k","authDomain":"a","projectId":"p","appId":"i"}"#;
//! let config = RemoteConfig::from_endpoint_body(body).unwrap();
//! assert!(config.is_configured());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const ENV_API_KEY: &str = "FIREBASE_API_KEY";
pub const ENV_AUTH_DOMAIN: &str = "FIREBASE_AUTH_DOMAIN";
pub const ENV_PROJECT_ID: &str = "FIREBASE_PROJECT_ID";
pub const ENV_APP_ID: &str = "FIREBASE_APP_ID";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub app_id: String,
}

/// Error body returned by the configuration endpoint.
#[derive(Deserialize)]
struct EndpointError {
    error: String,
}

impl RemoteConfig {
    /// Read from `FIREBASE_*` environment variables. Unset variables are empty.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        Self {
            api_key: var(ENV_API_KEY),
            auth_domain: var(ENV_AUTH_DOMAIN),
            project_id: var(ENV_PROJECT_ID),
            app_id: var(ENV_APP_ID),
        }
    }

    /// Parse the configuration endpoint's response body.
    ///
    /// The endpoint answers either with the config object or with
    /// `{ "error": "..." }`.
    pub fn from_endpoint_body(body: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(body)?;
        if value.get("error").is_some() {
            let EndpointError { error } = serde_json::from_value(value)?;
            return Err(ConfigError::Endpoint(error));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// `apiKey`, `projectId` and `appId` are all non-empty.
    pub fn is_configured(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Like [`is_configured`](Self::is_configured), naming what is missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Missing(missing))
        }
    }

    fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("apiKey", &self.api_key),
            ("projectId", &self.project_id),
            ("appId", &self.app_id),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}
