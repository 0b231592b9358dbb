//! meshcache Server
//!
//! One node of a peer-replicated read-through cache. Every node serves two
//! HTTP surfaces: the peer protocol other nodes fetch owned keys through,
//! and an optional front-end API for clients.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                       meshcache node                           │
//! ├────────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌──────────────┐   ┌──────────────────────┐  │
//! │  │ API server │──▶│    Group     │──▶│ Peer server (other   │  │
//! │  │ /api?key=  │   │  get logic   │   │ nodes' fetch target) │  │
//! │  └────────────┘   └──────────────┘   └──────────────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{debug, error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use meshcache::error::{BoxError, Error, Result};
use meshcache::{Group, GroupRegistry, HttpPeerPool, Loader, PeerServer, PoolOptions};

// =============================================================================
// CLI Arguments
// =============================================================================

/// meshcache - distributed peer-replicated read-through cache node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Peer server bind address
    #[arg(long, env = "MESHCACHE_LISTEN", default_value = "127.0.0.1:8001")]
    listen: String,

    /// Public base URL of this node as it appears in the peer list
    /// (defaults to http://<listen>)
    #[arg(long, env = "MESHCACHE_PUBLIC_URL")]
    public_url: Option<String>,

    /// Comma-separated base URLs of every node in the mesh, this one included
    #[arg(long, env = "MESHCACHE_PEERS", value_delimiter = ',')]
    peers: Vec<String>,

    /// Front-end API bind address (disabled when unset)
    #[arg(long, env = "MESHCACHE_API_LISTEN")]
    api_listen: Option<String>,

    /// Metrics server bind address
    #[arg(long, env = "MESHCACHE_METRICS_LISTEN", default_value = "0.0.0.0:9090")]
    metrics_listen: String,

    /// Group (namespace) served by this node
    #[arg(long, env = "MESHCACHE_GROUP", default_value = "store")]
    group: String,

    /// Local cache byte budget per group (0 = unbounded)
    #[arg(long, env = "MESHCACHE_CACHE_BYTES", default_value = "67108864")]
    cache_bytes: u64,

    /// Virtual nodes per peer on the hash ring (0 = default)
    #[arg(long, env = "MESHCACHE_REPLICAS", default_value = "0")]
    replicas: usize,

    /// JSON object file backing the loader
    #[arg(long, env = "MESHCACHE_STORE")]
    store: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);
    meshcache::metrics::register();

    info!("Starting meshcache node");
    info!("  Peer listen address: {}", args.listen);
    info!("  Group: {}", args.group);
    info!("  Cache budget: {} bytes", args.cache_bytes);
    info!("  Peers: {}", args.peers.len().max(1));

    let loader: Arc<dyn Loader> = match &args.store {
        Some(path) => {
            info!("  Store file: {}", path.display());
            Arc::new(StoreLoader::from_file(path)?)
        }
        None => Arc::new(StoreLoader::empty()),
    };

    let group = Arc::new(Group::new(&args.group, args.cache_bytes, loader));

    let public_url = args
        .public_url
        .clone()
        .unwrap_or_else(|| format!("http://{}", args.listen));
    let pool = Arc::new(HttpPeerPool::with_options(
        &public_url,
        PoolOptions {
            replicas: args.replicas,
            ..Default::default()
        },
    ));
    if args.peers.is_empty() {
        pool.set_peers([public_url.clone()]);
    } else {
        pool.set_peers(args.peers.clone());
    }
    group.register_peer_selector(pool);

    let registry = Arc::new(GroupRegistry::new());
    registry.register(Arc::clone(&group));

    // Start front-end API server
    if let Some(api_addr) = args.api_listen.clone() {
        let api_group = Arc::clone(&group);
        tokio::spawn(async move {
            if let Err(e) = run_api_server(&api_addr, api_group).await {
                error!("API server error: {}", e);
            }
        });
    }

    // Start metrics server
    let metrics_addr = args.metrics_listen.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Run the peer server
    let listener = TcpListener::bind(&args.listen).await?;
    PeerServer::new(registry).serve(listener).await
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("reqwest=warn".parse().unwrap());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Store Loader
// =============================================================================

/// Loader over a JSON object file mapping keys to string values.
struct StoreLoader {
    entries: HashMap<String, String>,
}

impl StoreLoader {
    fn from_file(path: &PathBuf) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let entries = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid store file {}: {e}", path.display())))?;
        Ok(Self { entries })
    }

    fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

#[async_trait]
impl Loader for StoreLoader {
    async fn load(&self, key: &str) -> std::result::Result<Bytes, BoxError> {
        debug!(key, "store lookup");
        match self.entries.get(key) {
            Some(value) => Ok(Bytes::copy_from_slice(value.as_bytes())),
            None => Err(format!("{key} not exist").into()),
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

async fn run_api_server(addr: &str, group: Arc<Group>) -> Result<()> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;

    async fn api_handler(
        req: Request<hyper::body::Incoming>,
        group: Arc<Group>,
    ) -> std::result::Result<Response<Full<Bytes>>, std::convert::Infallible> {
        if req.uri().path() != "/api" {
            return Ok(Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Full::new(Bytes::from("not found")))
                .unwrap());
        }

        let key = req
            .uri()
            .query()
            .and_then(|query| {
                query
                    .split('&')
                    .find_map(|pair| pair.strip_prefix("key="))
            })
            .and_then(|value| urlencoding::decode(value).ok())
            .map(|value| value.into_owned())
            .unwrap_or_default();

        let response = match group.get(&key).await {
            Ok(value) => Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "application/octet-stream")
                .body(Full::new(value.into_bytes()))
                .unwrap(),
            Err(Error::EmptyKey) => Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .body(Full::new(Bytes::from("key is required")))
                .unwrap(),
            Err(err) => Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::from(err.to_string())))
                .unwrap(),
        };
        Ok(response)
    }

    let listener = TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let group = Arc::clone(&group);

        tokio::spawn(async move {
            let service = service_fn(move |req| api_handler(req, Arc::clone(&group)));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("API server connection error: {}", e);
            }
        });
    }
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str) -> Result<()> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use prometheus::{Encoder, TextEncoder};

    async fn metrics_handler(
        req: Request<hyper::body::Incoming>,
    ) -> std::result::Result<Response<Full<Bytes>>, std::convert::Infallible> {
        let response = match req.uri().path() {
            "/metrics" => {
                let encoder = TextEncoder::new();
                let metric_families = prometheus::gather();
                let mut buffer = Vec::new();
                encoder.encode(&metric_families, &mut buffer).unwrap();

                Response::builder()
                    .status(StatusCode::OK)
                    .header("Content-Type", encoder.format_type())
                    .body(Full::new(Bytes::from(buffer)))
                    .unwrap()
            }
            _ => Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Full::new(Bytes::from("not found")))
                .unwrap(),
        };
        Ok(response)
    }

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(metrics_handler))
                .await
            {
                error!("Metrics server connection error: {}", e);
            }
        });
    }
}
