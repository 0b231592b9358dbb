//! HTTP Peer Server
//!
//! Serves cache values to peer processes: `GET {base_path}{group}/{key}`
//! resolves the group through a shared [`GroupRegistry`] and answers with the
//! raw value bytes. A request reaching this server runs the full group get —
//! local cache, then loader — so a peer fetch warms the owner's cache as a
//! side effect.
//!
//! Status mapping: unknown group → 404, malformed path or empty key → 400,
//! loader failure → 500, success → 200 `application/octet-stream`.

use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use super::DEFAULT_BASE_PATH;
use crate::error::{Error, Result};
use crate::group::GroupRegistry;

/// HTTP server answering peer cache fetches.
pub struct PeerServer {
    registry: Arc<GroupRegistry>,
    base_path: String,
}

impl PeerServer {
    /// Create a server over `registry` with the default base path.
    pub fn new(registry: Arc<GroupRegistry>) -> Self {
        Self::with_base_path(registry, DEFAULT_BASE_PATH)
    }

    pub fn with_base_path(registry: Arc<GroupRegistry>, base_path: impl Into<String>) -> Self {
        Self {
            registry,
            base_path: base_path.into(),
        }
    }

    /// Accept connections on `listener` until the task is dropped.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        info!(addr = %listener.local_addr()?, "peer server listening");
        let server = Arc::new(self);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = Arc::clone(&server);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = Arc::clone(&server);
                    async move {
                        Ok::<_, std::convert::Infallible>(server.handle(req).await)
                    }
                });
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("peer server connection error: {}", e);
                }
            });
        }
    }

    async fn handle(&self, req: Request<hyper::body::Incoming>) -> Response<Full<Bytes>> {
        let path = req.uri().path();
        debug!(method = %req.method(), path, "peer request");

        let Some(rest) = path.strip_prefix(self.base_path.as_str()) else {
            return text_response(StatusCode::NOT_FOUND, "not found");
        };
        let Some((group_name, key)) = rest.split_once('/') else {
            return text_response(StatusCode::BAD_REQUEST, "bad request");
        };
        let (Ok(group_name), Ok(key)) = (urlencoding::decode(group_name), urlencoding::decode(key))
        else {
            return text_response(StatusCode::BAD_REQUEST, "bad request");
        };

        let Some(group) = self.registry.lookup(&group_name) else {
            return text_response(StatusCode::NOT_FOUND, &format!("no such group: {group_name}"));
        };

        match group.get(&key).await {
            Ok(value) => Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "application/octet-stream")
                .body(Full::new(value.into_bytes()))
                .unwrap(),
            Err(Error::EmptyKey) => text_response(StatusCode::BAD_REQUEST, "key is required"),
            Err(err) => text_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
        }
    }
}

impl std::fmt::Debug for PeerServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerServer")
            .field("base_path", &self.base_path)
            .field("registry", &self.registry)
            .finish()
    }
}

fn text_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(message.to_owned())))
        .unwrap()
}
