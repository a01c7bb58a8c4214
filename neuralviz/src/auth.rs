//! Shared-secret bearer auth for ingest and mutation endpoints

use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use neuralviz_core::config::{DeployMode, ServerConfig};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Local mode: every request is accepted
    Open,
    /// Remote mode: `Authorization: Bearer <key>` required
    Bearer { api_key: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// Remote mode without a configured key
    Misconfigured,
    Unauthorized,
}

impl AuthPolicy {
    pub fn from_config(config: &ServerConfig) -> Self {
        match config.deploy_mode {
            DeployMode::Local => AuthPolicy::Open,
            DeployMode::Remote => AuthPolicy::Bearer {
                api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            },
        }
    }

    pub fn check(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let AuthPolicy::Bearer { api_key } = self else {
            return Ok(());
        };
        let api_key = api_key.as_deref().ok_or(AuthError::Misconfigured)?;

        let presented = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match presented {
            Some(token) if token == api_key => Ok(()),
            _ => Err(AuthError::Unauthorized),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::Misconfigured => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server misconfiguration: NEURAL_VIZ_API_KEY not set",
            ),
            AuthError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
