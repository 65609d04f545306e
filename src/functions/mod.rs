//! Serverless function handlers
//!
//! Each handler takes a `HandlerEvent` (method, body, query) and always
//! produces a `HandlerResponse` carrying permissive CORS headers and a JSON
//! body. Failures never escape a handler: they are rendered as an error
//! envelope with the matching status.

pub mod analysis;
pub mod create_seller;
pub mod manage_seller;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::backend::{BackendError, IdentityClient};
use crate::config::Config;

/// HTTP client timeout shared by all outbound handler calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Names the gateway can invoke
pub const FUNCTION_NAMES: [&str; 3] = [
    create_seller::NAME,
    manage_seller::NAME,
    analysis::NAME,
];

/// Incoming invocation, shaped like a serverless HTTP event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerEvent {
    pub http_method: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, alias = "queryStringParameters")]
    pub query: HashMap<String, String>,
}

impl HandlerEvent {
    pub fn new(method: &str) -> Self {
        Self {
            http_method: method.to_ascii_uppercase(),
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: &Value) -> Self {
        self.body = Some(body.to_string());
        self
    }

    pub fn method(&self) -> String {
        self.http_method.to_ascii_uppercase()
    }

    /// Parse the body as JSON; a missing or blank body parses as `{}`
    pub fn json_body<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        let raw = self.body.as_deref().map(str::trim).filter(|b| !b.is_empty()).unwrap_or("{}");
        serde_json::from_str(raw).map_err(|e| HandlerError::BadRequest(format!("Invalid JSON body: {}", e)))
    }
}

/// Handler result, shaped like a serverless HTTP response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HandlerResponse {
    pub fn json(status_code: u16, body: &Value, cors: &Cors) -> Self {
        let mut headers = cors.headers();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            status_code,
            headers,
            body: body.to_string(),
        }
    }

    pub fn empty(status_code: u16, cors: &Cors) -> Self {
        Self {
            status_code,
            headers: cors.headers(),
            body: String::new(),
        }
    }

    pub fn method_not_allowed(cors: &Cors) -> Self {
        Self::json(405, &json!({ "error": "Method Not Allowed" }), cors)
    }

    /// Body parsed as JSON, `Null` if it is not JSON
    pub fn json_body(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

/// CORS policy of one handler
#[derive(Debug, Clone, Copy)]
pub struct Cors {
    pub allow_methods: &'static str,
}

impl Cors {
    pub fn headers(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
            ("Access-Control-Allow-Methods".to_string(), self.allow_methods.to_string()),
            (
                "Access-Control-Allow-Headers".to_string(),
                "Content-Type, Authorization".to_string(),
            ),
        ])
    }
}

/// Handler failure, rendered by `into_response`
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Missing SUPABASE_URL or SUPABASE_SERVICE_ROLE_KEY")]
    Config,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Upstream failure wrapped with our own message
    #[error("{message}: {source}")]
    Upstream {
        message: &'static str,
        source: BackendError,
    },

    /// Upstream failure relayed with its own status and body
    #[error(transparent)]
    Relay(BackendError),

    #[error("{0}")]
    BadGateway(String),

    #[error("{message}")]
    Internal { message: String, detail: Value },
}

impl HandlerError {
    pub fn upstream(message: &'static str) -> impl FnOnce(BackendError) -> HandlerError {
        move |source| HandlerError::Upstream { message, source }
    }

    pub fn status(&self) -> u16 {
        match self {
            HandlerError::Config => 500,
            HandlerError::BadRequest(_) => 400,
            HandlerError::NotFound(_) => 404,
            HandlerError::Upstream { source, .. } => source.status(),
            HandlerError::Relay(source) => source.status(),
            HandlerError::BadGateway(_) => 502,
            HandlerError::Internal { .. } => 500,
        }
    }

    pub fn into_response(self, cors: &Cors) -> HandlerResponse {
        let status = self.status();
        let body = match self {
            HandlerError::Upstream { message, source } => {
                json!({ "error": message, "detail": source.detail() })
            }
            HandlerError::Relay(source) => source.detail(),
            HandlerError::Internal { message, detail } => json!({ "error": message, "detail": detail }),
            other => json!({ "error": other.to_string() }),
        };
        debug!(status = status, "Handler answered with error");
        HandlerResponse::json(status, &body, cors)
    }
}

/// Shared state handed to every handler
pub struct FunctionContext {
    config: Arc<Config>,
    http_client: Client,
}

impl FunctionContext {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    /// Identity client, or a configuration error when credentials are missing
    pub fn identity(&self) -> Result<IdentityClient, HandlerError> {
        match &self.config.backend {
            Some(backend) => Ok(IdentityClient::with_client(self.http_client.clone(), backend)),
            None => {
                warn!("Identity platform credentials missing");
                Err(HandlerError::Config)
            }
        }
    }
}

/// Route an invocation to a handler by name
pub async fn invoke(ctx: &FunctionContext, name: &str, event: HandlerEvent) -> HandlerResponse {
    debug!(function = name, method = %event.http_method, "Invoking function");
    match name {
        create_seller::NAME => create_seller::handle(ctx, event).await,
        manage_seller::NAME => manage_seller::handle(ctx, event).await,
        analysis::NAME => analysis::handle(ctx, event).await,
        _ => HandlerResponse::json(
            404,
            &json!({ "error": format!("Function not found: {}", name) }),
            &Cors {
                allow_methods: "OPTIONS",
            },
        ),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};

    /// Canned answer: method, path prefix, status, JSON body
    pub(crate) type Route = (&'static str, &'static str, u16, &'static str);

    /// Local HTTP endpoint answering from a fixed route table and recording
    /// every request line it sees. First matching route wins; anything else is 404.
    pub(crate) struct ScriptedBackend {
        url: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedBackend {
        pub(crate) async fn start(routes: Vec<Route>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let requests = Arc::new(Mutex::new(Vec::new()));
            let routes = Arc::new(routes);

            let log = Arc::clone(&requests);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let routes = Arc::clone(&routes);
                    let log = Arc::clone(&log);
                    tokio::spawn(async move {
                        let _ = answer(stream, &routes, &log).await;
                    });
                }
            });

            Self { url, requests }
        }

        /// Context whose identity platform is this endpoint
        pub(crate) fn context(&self) -> FunctionContext {
            let url = self.url.clone();
            let config = Config::from_lookup(move |name| match name {
                "SUPABASE_URL" => Some(url.clone()),
                "SUPABASE_SERVICE_ROLE_KEY" => Some("service-key".to_string()),
                _ => None,
            });
            FunctionContext::new(Arc::new(config)).unwrap()
        }

        /// Request lines received so far, as `METHOD path`
        pub(crate) fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    async fn answer(stream: TcpStream, routes: &[Route], log: &Mutex<Vec<String>>) -> std::io::Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let mut request_line = String::new();
        reader.read_line(&mut request_line).await?;
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 {
                break;
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
        }
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).await?;

        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default().to_string();
        let path = parts.next().unwrap_or_default().to_string();
        log.lock().unwrap().push(format!("{} {}", method, path));

        let (status, payload) = routes
            .iter()
            .find(|(m, prefix, _, _)| *m == method && path.starts_with(prefix))
            .map(|(_, _, status, payload)| (*status, *payload))
            .unwrap_or((404, r#"{"msg":"no route"}"#));

        let response = format!(
            "HTTP/1.1 {} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            payload.len(),
            payload
        );
        writer.write_all(response.as_bytes()).await?;
        writer.shutdown().await
    }

    /// Context with no credentials and no model key
    pub(crate) fn bare_context() -> FunctionContext {
        FunctionContext::new(Arc::new(Config::from_lookup(|_| None))).unwrap()
    }

    /// Context whose platform URL points at a closed local port
    pub(crate) fn unreachable_context() -> FunctionContext {
        let config = Config::from_lookup(|name| match name {
            "SUPABASE_URL" => Some("http://127.0.0.1:9".to_string()),
            "SUPABASE_SERVICE_ROLE_KEY" => Some("service-key".to_string()),
            _ => None,
        });
        FunctionContext::new(Arc::new(config)).unwrap()
    }

    #[test]
    fn test_parse_event_with_netlify_field_names() {
        let json = r#"{"httpMethod":"GET","queryStringParameters":{"q":"ana"}}"#;
        let event: HandlerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.method(), "GET");
        assert_eq!(event.query.get("q").map(String::as_str), Some("ana"));
        assert!(event.body.is_none());
    }

    #[test]
    fn test_blank_body_parses_as_empty_object() {
        let event = HandlerEvent {
            http_method: "POST".to_string(),
            body: Some("  ".to_string()),
            query: HashMap::new(),
        };
        let value: Value = event.json_body().unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn test_invalid_body_is_bad_request() {
        let event = HandlerEvent {
            http_method: "POST".to_string(),
            body: Some("{email:".to_string()),
            query: HashMap::new(),
        };
        let err = event.json_body::<Value>().unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_error_envelope_shapes() {
        let cors = Cors { allow_methods: "POST, OPTIONS" };

        let response = HandlerError::upstream("Could not create user")(BackendError::from_status(
            422,
            r#"{"msg":"already registered"}"#,
        ))
        .into_response(&cors);
        assert_eq!(response.status_code, 422);
        assert_eq!(
            response.json_body(),
            json!({"error": "Could not create user", "detail": {"msg": "already registered"}})
        );
        assert_eq!(response.headers["Access-Control-Allow-Origin"], "*");

        let response = HandlerError::Relay(BackendError::from_status(404, r#"{"msg":"gone"}"#)).into_response(&cors);
        assert_eq!(response.status_code, 404);
        assert_eq!(response.json_body(), json!({"msg": "gone"}));
    }

    #[tokio::test]
    async fn test_unknown_function_is_not_found() {
        let ctx = bare_context();
        let response = invoke(&ctx, "does-not-exist", HandlerEvent::new("GET")).await;
        assert_eq!(response.status_code, 404);
    }
}
