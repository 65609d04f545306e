//! Storefront daemon
//!
//! Hosts the storefront's seller-admin functions and its offline cache
//! manager behind a local Unix-socket gateway.

mod backend;
mod cache;
mod config;
mod functions;
mod ipc;

use anyhow::{anyhow, Context, Result};
use std::env;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cache::{CacheStorage, DiskStorage, FetchRequest, HttpNetwork, MemoryStorage, OfflineCacheManager};
use config::Config;
use functions::{FunctionContext, HandlerEvent};
use ipc::{process_command, serialize_response, Gateway, IpcServer};

/// CLI command
#[derive(Debug)]
enum Command {
    /// Run the gateway server (default)
    Server,
    /// Install the current cache generation
    Install,
    /// Activate the current cache generation
    Activate,
    /// Serve one request through the cache
    Fetch { url: String, navigate: bool },
    /// Invoke a function once
    Invoke {
        function: String,
        method: String,
        body: Option<String>,
    },
    /// Print gateway status
    Status,
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"Storefront daemon - seller-admin functions and offline cache

USAGE:
    storefront-daemon                                  # Run gateway server (default)
    storefront-daemon install
    storefront-daemon activate
    storefront-daemon fetch <url> [--navigate]
    storefront-daemon invoke <function> <METHOD> [json-body]
    storefront-daemon status
    storefront-daemon help

FUNCTIONS:
    create-seller          POST {{email, password}}
    manage-seller          GET ?q= | PATCH {{userId|email, password}} | DELETE {{userId|email}}
    get-gemini-analysis    POST {{name, category, description, salesSummary, prompt}}

ENVIRONMENT:
    SUPABASE_URL                 Identity platform base URL
    SUPABASE_SERVICE_ROLE_KEY    Identity platform service key
    GEMINI_API_KEY               Text generation key (template answer when unset)
    GEMINI_MODEL                 Text generation model (default gemini-1.5-flash)
    APP_ORIGIN                   Origin for relative cache URLs (default http://localhost:8888)
    CACHE_VERSION                Current cache generation (default v6)
    CACHE_SEED                   Comma-separated Seed Set (default /,/index.html)
    CACHE_NETWORK_FIRST          Comma-separated network-first URL patterns
    CACHE_PERSIST                Keep generations on disk (default false)
    CACHE_DIR                    Persist generations here (implies CACHE_PERSIST)
    STOREFRONT_SOCKET            Gateway socket (default /tmp/storefront-daemon.sock)
    RUST_LOG                     Log filter (e.g. info, storefront_daemon=debug)
"#
    );
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return Ok(Command::Server);
    }

    match args[1].as_str() {
        "install" => Ok(Command::Install),
        "activate" => Ok(Command::Activate),
        "fetch" => {
            let url = args
                .get(2)
                .ok_or_else(|| anyhow!("Usage: storefront-daemon fetch <url> [--navigate]"))?;
            Ok(Command::Fetch {
                url: url.clone(),
                navigate: args.iter().skip(3).any(|a| a == "--navigate"),
            })
        }
        "invoke" => {
            if args.len() < 4 {
                return Err(anyhow!(
                    "Usage: storefront-daemon invoke <function> <METHOD> [json-body]"
                ));
            }
            Ok(Command::Invoke {
                function: args[2].clone(),
                method: args[3].clone(),
                body: args.get(4).cloned(),
            })
        }
        "status" => Ok(Command::Status),
        "help" | "--help" | "-h" => Ok(Command::Help),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            Ok(Command::Help)
        }
    }
}

fn build_gateway(config: Arc<Config>) -> Result<Gateway> {
    let storage: Arc<dyn CacheStorage> = if config.cache.persist {
        let disk = match &config.cache.dir {
            Some(dir) => DiskStorage::with_root(dir.clone()),
            None => DiskStorage::new(),
        };
        Arc::new(disk.context("Failed to open cache directory")?)
    } else {
        Arc::new(MemoryStorage::new())
    };
    let network = HttpNetwork::new(&config.cache.origin).context("Failed to create HTTP client")?;

    Ok(Gateway {
        functions: FunctionContext::new(Arc::clone(&config))?,
        cache: OfflineCacheManager::new(config.cache.clone(), storage, Arc::new(network)),
    })
}

/// `RUST_LOG` directives such as `storefront_daemon=debug`; INFO when unset or invalid
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Run one command against a local gateway and print the response line
async fn run_once(gateway: &Gateway, command: ipc::Command) -> Result<()> {
    let response = process_command(command, gateway).await;
    gateway.cache.settle().await;
    let json = serialize_response(&response).context("Failed to serialize response")?;
    print!("{}", String::from_utf8_lossy(&json));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(env::var("RUST_LOG").ok().as_deref()))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let command = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    if let Command::Help = command {
        print_help();
        return Ok(());
    }

    let config = Arc::new(Config::from_env());
    if config.backend.is_none() {
        info!("Identity platform not configured; seller functions will answer 500");
    }
    let gateway = Arc::new(build_gateway(Arc::clone(&config))?);

    match command {
        Command::Server => {
            info!(cache_version = %gateway.cache.version(), "Starting storefront daemon");

            let mut server = IpcServer::new(Arc::clone(&gateway), config.socket_path.clone());
            if let Err(e) = server.start().await {
                error!(error = %e, "Failed to start gateway");
                return Err(e);
            }

            let server = Arc::new(server);
            let accept = Arc::clone(&server);
            tokio::spawn(async move {
                if let Err(e) = accept.run().await {
                    error!(error = %e, "Gateway error");
                }
            });

            info!("Daemon ready. Waiting for commands...");

            tokio::signal::ctrl_c().await?;

            info!(
                connections = server.connection_count().await,
                "Received shutdown signal, flushing cache writes..."
            );
            gateway.cache.settle().await;
            server.stop().await?;

            info!("Shutdown complete.");
        }
        Command::Install => run_once(&gateway, ipc::Command::Install).await?,
        Command::Activate => run_once(&gateway, ipc::Command::Activate).await?,
        Command::Fetch { url, navigate } => {
            let request = if navigate {
                FetchRequest::navigate(url)
            } else {
                FetchRequest::get(url)
            };
            run_once(&gateway, ipc::Command::Fetch { request }).await?
        }
        Command::Invoke {
            function,
            method,
            body,
        } => {
            let event = HandlerEvent {
                body,
                ..HandlerEvent::new(&method)
            };
            run_once(&gateway, ipc::Command::Invoke { function, event }).await?
        }
        Command::Status => run_once(&gateway, ipc::Command::GetStatus).await?,
        Command::Help => print_help(),
    }

    Ok(())
}
