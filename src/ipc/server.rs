//! Gateway Server - Unix socket server for local clients
//!
//! Accepts connections, reads newline-delimited commands, and dispatches
//! them to the function handlers or the offline cache manager.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::cache::{LifecycleEvent, OfflineCacheManager};
use crate::functions::{self, FunctionContext, FUNCTION_NAMES};
use crate::ipc::protocol::{parse_command, serialize_response, Command, Response, PROTOCOL_VERSION};

/// Everything a command may touch
pub struct Gateway {
    pub functions: FunctionContext,
    pub cache: OfflineCacheManager,
}

/// Server listening for gateway commands
pub struct IpcServer {
    gateway: Arc<Gateway>,
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    /// Active connections counter
    connection_count: Arc<RwLock<u32>>,
}

impl IpcServer {
    pub fn new(gateway: Arc<Gateway>, socket_path: PathBuf) -> Self {
        Self {
            gateway,
            socket_path,
            listener: None,
            connection_count: Arc::new(RwLock::new(0)),
        }
    }

    /// Bind the socket, replacing a stale one
    pub async fn start(&mut self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .context("Failed to remove existing socket file")?;
        }

        let listener = UnixListener::bind(&self.socket_path)
            .context("Failed to bind Unix socket")?;

        info!(socket_path = %self.socket_path.display(), "Gateway started");

        self.listener = Some(listener);
        Ok(())
    }

    /// Run the accept loop
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref()
            .context("Server not started")?;

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let gateway = Arc::clone(&self.gateway);
                    let connection_count = Arc::clone(&self.connection_count);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, gateway, connection_count).await {
                            error!(error = %e, "Connection handler error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Number of currently connected clients
    pub async fn connection_count(&self) -> u32 {
        *self.connection_count.read().await
    }

    /// Remove the socket file
    pub async fn stop(&self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .context("Failed to remove socket file")?;
        }
        info!("Gateway stopped");
        Ok(())
    }
}

async fn handle_connection(
    stream: UnixStream,
    gateway: Arc<Gateway>,
    connection_count: Arc<RwLock<u32>>,
) -> Result<()> {
    {
        let mut count = connection_count.write().await;
        *count += 1;
        debug!(count = *count, "New connection");
    }

    let (reader, mut writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("Connection closed by client");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let response = match parse_command(trimmed.as_bytes()) {
                    Ok(command) => process_command(command, &gateway).await,
                    Err(e) => {
                        error!(error = %e, "Failed to parse command");
                        Response::Error {
                            error: format!("Invalid command: {}", e),
                        }
                    }
                };

                match serialize_response(&response) {
                    Ok(json) => {
                        if let Err(e) = writer.write_all(&json).await {
                            error!(error = %e, "Failed to write response");
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to serialize response");
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to read from socket");
                break;
            }
        }
    }

    {
        let mut count = connection_count.write().await;
        *count = count.saturating_sub(1);
        debug!(count = *count, "Connection ended");
    }

    Ok(())
}

/// Process a command and return a response
pub async fn process_command(command: Command, gateway: &Gateway) -> Response {
    match command {
        Command::Invoke { function, event } => {
            info!(function = %function, method = %event.http_method, "Processing invoke command");
            let response = functions::invoke(&gateway.functions, &function, event).await;
            Response::Handler { response }
        }

        Command::Install => match gateway.cache.dispatch(LifecycleEvent::Install).await {
            Ok(outcome) => Response::Success {
                message: Some(format!("{:?}", outcome)),
            },
            Err(e) => Response::Error {
                error: e.to_string(),
            },
        },

        Command::Activate => match gateway.cache.dispatch(LifecycleEvent::Activate).await {
            Ok(outcome) => Response::Success {
                message: Some(format!("{:?}", outcome)),
            },
            Err(e) => Response::Error {
                error: e.to_string(),
            },
        },

        Command::Fetch { request } => {
            debug!(url = %request.url, "Processing fetch command");
            let response = gateway.cache.on_fetch(request).await;
            Response::Fetched {
                response: response.map(Into::into),
            }
        }

        Command::GetStatus => match gateway.cache.status().await {
            Ok(status) => Response::Status {
                version: PROTOCOL_VERSION,
                healthy: true,
                cache_version: status.version,
                phase: status.phase,
                generations: status.generations,
                functions: FUNCTION_NAMES.iter().map(|s| s.to_string()).collect(),
                stats: status.stats,
            },
            Err(e) => Response::Error {
                error: format!("Failed to read cache status: {}", e),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CachedResponse, FetchRequest, MemoryStorage, Network, NetworkError};
    use crate::config::Config;
    use async_trait::async_trait;

    /// Serves every URL with its own path as body
    struct EchoNetwork;

    #[async_trait]
    impl Network for EchoNetwork {
        async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, NetworkError> {
            Ok(CachedResponse::new(200, request.url.as_bytes().to_vec()))
        }
    }

    fn gateway() -> Gateway {
        let config = Arc::new(Config::from_lookup(|_| None));
        Gateway {
            functions: FunctionContext::new(Arc::clone(&config)).unwrap(),
            cache: OfflineCacheManager::new(
                config.cache.clone(),
                Arc::new(MemoryStorage::new()),
                Arc::new(EchoNetwork),
            ),
        }
    }

    #[tokio::test]
    async fn test_lifecycle_through_commands() {
        let gateway = gateway();

        let response = process_command(Command::Activate, &gateway).await;
        assert!(matches!(response, Response::Error { .. }));

        let response = process_command(Command::Install, &gateway).await;
        assert!(matches!(response, Response::Success { .. }));
        let response = process_command(Command::Activate, &gateway).await;
        assert!(matches!(response, Response::Success { .. }));

        match process_command(Command::GetStatus, &gateway).await {
            Response::Status { cache_version, generations, functions, .. } => {
                assert_eq!(cache_version, "v6");
                assert_eq!(generations, vec!["v6"]);
                assert_eq!(functions.len(), 3);
            }
            other => panic!("Expected Status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_command_resolves_against_origin() {
        let gateway = gateway();
        let response = process_command(
            Command::Fetch {
                request: FetchRequest::get("/app.js"),
            },
            &gateway,
        )
        .await;
        match response {
            Response::Fetched { response: Some(fetched) } => {
                assert_eq!(fetched.status, 200);
                assert_eq!(fetched.body_bytes().unwrap(), b"http://localhost:8888/app.js");
            }
            other => panic!("Expected Fetched, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_socket_round_trip_counts_connections() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("gateway.sock");
        let mut server = IpcServer::new(Arc::new(gateway()), socket_path.clone());
        server.start().await.unwrap();

        let server = Arc::new(server);
        let accept = Arc::clone(&server);
        tokio::spawn(async move {
            let _ = accept.run().await;
        });

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer.write_all(b"{\"type\":\"getStatus\"}\n").await.unwrap();
        let mut line = String::new();
        BufReader::new(reader).read_line(&mut line).await.unwrap();

        assert!(line.contains("\"type\":\"status\""));
        assert_eq!(server.connection_count().await, 1);

        server.stop().await.unwrap();
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_invoke_command_runs_handler() {
        let gateway = gateway();
        let command = parse_command(
            br#"{"type":"invoke","function":"get-gemini-analysis","event":{"httpMethod":"POST","body":"{\"name\":\"Lamp\"}"}}"#,
        )
        .unwrap();
        match process_command(command, &gateway).await {
            Response::Handler { response } => {
                assert_eq!(response.status_code, 200);
                assert!(response.body.contains("Lamp"));
            }
            other => panic!("Expected Handler, got {:?}", other),
        }
    }
}
