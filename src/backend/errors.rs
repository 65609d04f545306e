//! Identity Platform Error Types
//!
//! Maps platform responses to the status code and detail a handler relays
//! to its caller.

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Missing SUPABASE_URL or SUPABASE_SERVICE_ROLE_KEY")]
    Config,

    #[error("Upstream error ({status}): {detail}")]
    Upstream { status: u16, detail: Value },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Build from a non-success status and raw body.
    ///
    /// JSON bodies are kept as-is; anything else is wrapped as `{"raw": body}`.
    pub fn from_status(status: u16, body: &str) -> Self {
        BackendError::Upstream {
            status,
            detail: parse_body(body),
        }
    }

    /// Status a handler should answer with
    pub fn status(&self) -> u16 {
        match self {
            BackendError::Upstream { status, .. } => *status,
            BackendError::Network(_) => 502,
            BackendError::Config | BackendError::Decode(_) => 500,
        }
    }

    /// Body detail to relay
    pub fn detail(&self) -> Value {
        match self {
            BackendError::Upstream { detail, .. } => detail.clone(),
            other => Value::String(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::Network(e.to_string())
    }
}

/// Parse a body as JSON, falling back to `{"raw": body}`
pub fn parse_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| serde_json::json!({ "raw": body }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_status_keeps_json_detail() {
        let err = BackendError::from_status(422, r#"{"msg":"email exists"}"#);
        assert_eq!(err.status(), 422);
        assert_eq!(err.detail(), json!({"msg": "email exists"}));
    }

    #[test]
    fn test_from_status_wraps_plain_text() {
        let err = BackendError::from_status(503, "upstream down");
        assert_eq!(err.status(), 503);
        assert_eq!(err.detail(), json!({"raw": "upstream down"}));
    }

    #[test]
    fn test_transport_errors_map_to_bad_gateway() {
        assert_eq!(BackendError::Network("refused".to_string()).status(), 502);
        assert_eq!(BackendError::Config.status(), 500);
    }
}
