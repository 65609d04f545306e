//! Gateway protocol definitions
//!
//! Newline-delimited JSON over a Unix domain socket. Each line is one
//! `Command`; each command produces exactly one `Response` line.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheStats, CachedResponse, FetchRequest, Phase};
use crate::functions::{HandlerEvent, HandlerResponse};

/// Protocol version for future compatibility
pub const PROTOCOL_VERSION: u32 = 1;

/// Commands accepted by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Run a function handler by name
    Invoke {
        function: String,
        event: HandlerEvent,
    },
    /// Install the current cache generation
    Install,
    /// Activate the current cache generation
    Activate,
    /// Serve one request through the offline cache
    Fetch { request: FetchRequest },
    /// Get gateway and cache state
    GetStatus,
}

/// Responses sent back over the socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    #[serde(rename_all = "camelCase")]
    Success { message: Option<String> },
    #[serde(rename_all = "camelCase")]
    Error { error: String },
    /// Result of an `invoke`
    #[serde(rename_all = "camelCase")]
    Handler { response: HandlerResponse },
    /// Result of a `fetch`; `None` means no response was available
    #[serde(rename_all = "camelCase")]
    Fetched { response: Option<FetchedResponse> },
    #[serde(rename_all = "camelCase")]
    Status {
        version: u32,
        healthy: bool,
        cache_version: String,
        phase: Phase,
        generations: Vec<String>,
        functions: Vec<String>,
        stats: CacheStats,
    },
}

/// Cached or live response as it travels over the socket.
///
/// The body is base64 so binary assets reach the client byte for byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl FetchedResponse {
    /// Decoded body bytes
    pub fn body_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(self.body.as_bytes())
    }
}

impl From<CachedResponse> for FetchedResponse {
    fn from(response: CachedResponse) -> Self {
        Self {
            status: response.status,
            body: base64::engine::general_purpose::STANDARD.encode(&response.body),
            headers: response.headers,
        }
    }
}

/// Parse a JSON command from bytes
pub fn parse_command(data: &[u8]) -> Result<Command, serde_json::Error> {
    serde_json::from_slice(data)
}

/// Serialize a response to JSON bytes
pub fn serialize_response(response: &Response) -> Result<Vec<u8>, serde_json::Error> {
    let mut json = serde_json::to_vec(response)?;
    json.push(b'\n'); // Add newline delimiter
    Ok(json)
}
