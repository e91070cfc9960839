use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};

use crate::errors::{OneCError, Result};

const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

/// How requests to one 1C endpoint authenticate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credential {
    #[default]
    None,
    /// Static key sent as `X-API-Key`.
    ApiKey { api_key: String },
    /// HTTP Basic credentials.
    Basic { username: String, password: String },
}

impl Credential {
    /// Adds the authentication header (if any) to `headers`.
    pub(crate) fn apply(&self, headers: &mut HeaderMap) -> Result<()> {
        match self {
            Credential::None => {}
            Credential::ApiKey { api_key } => {
                let value = HeaderValue::from_str(api_key)
                    .map_err(|e| OneCError::InvalidRequest(format!("Invalid API key: {}", e)))?;
                headers.insert(API_KEY_HEADER, value);
            }
            Credential::Basic { username, password } => {
                let encoded = STANDARD.encode(format!("{}:{}", username, password));
                let value = HeaderValue::from_str(&format!("Basic {}", encoded)).map_err(|e| {
                    OneCError::InvalidRequest(format!("Invalid basic credentials: {}", e))
                })?;
                headers.insert(AUTHORIZATION, value);
            }
        }
        Ok(())
    }

    /// Short label used in logs and API responses; never includes secrets.
    pub fn label(&self) -> &'static str {
        match self {
            Credential::None => "none",
            Credential::ApiKey { .. } => "api_key",
            Credential::Basic { .. } => "basic",
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::None => write!(f, "Credential::None"),
            Credential::ApiKey { .. } => write!(f, "Credential::ApiKey(***)"),
            Credential::Basic { username, .. } => {
                write!(f, "Credential::Basic({}, ***)", username)
            }
        }
    }
}
