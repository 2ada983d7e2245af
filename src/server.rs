use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::methods::{eth, proxy, JsonRpcRequest, JsonRpcResponse, SEND_RAW_TRANSACTION};
use crate::wallet::TransactionRelay;

/// How long `stop` waits for in-flight requests before aborting them.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Shared state for the HTTP handlers.
pub struct RelayerState {
    pub eth_rpc_url: String,
    pub to_address: String,
    /// Amount in sompi paid with every relayed transaction
    pub transfer_amount: u64,
    pub http_client: reqwest::Client,
    pub relay: Arc<dyn TransactionRelay>,
}

impl RelayerState {
    pub fn new(config: &Config, relay: Arc<dyn TransactionRelay>) -> Self {
        Self {
            eth_rpc_url: config.eth_rpc_url.clone(),
            to_address: config.to_address.clone(),
            transfer_amount: config.transfer_amount,
            http_client: reqwest::Client::new(),
            relay,
        }
    }
}

/// Build the HTTP router: a single `POST /` JSON-RPC endpoint.
pub fn router(state: Arc<RelayerState>) -> Router {
    Router::new()
        .route("/", post(dispatch))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn dispatch(State(state): State<Arc<RelayerState>>, body: Bytes) -> Response {
    let request = match JsonRpcRequest::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!("Rejecting malformed JSON-RPC request: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid JSON-RPC request").into_response();
        }
    };

    match request.method.as_str() {
        SEND_RAW_TRANSACTION => send_raw_transaction(&state, &request).await,
        _ => forward(&state, body).await,
    }
}

async fn send_raw_transaction(state: &RelayerState, request: &JsonRpcRequest) -> Response {
    let response = match eth::send_raw_transaction(
        state.relay.as_ref(),
        &state.to_address,
        state.transfer_amount,
        &request.params,
    )
    .await
    {
        Ok(hash) => JsonRpcResponse::result(request.id, hash),
        Err(e) => {
            warn!("eth_sendRawTransaction failed: {}", e);
            JsonRpcResponse::error(request.id, e.code(), e.to_string())
        }
    };
    Json(response).into_response()
}

async fn forward(state: &RelayerState, body: Bytes) -> Response {
    match proxy::forward(&state.http_client, &state.eth_rpc_url, body).await {
        Ok(upstream) => (
            upstream.status,
            [(header::CONTENT_TYPE, "application/json")],
            upstream.body,
        )
            .into_response(),
        Err(e) => {
            error!("EVM RPC proxy error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

enum Lifecycle {
    Created,
    Running {
        addr: SocketAddr,
        shutdown: oneshot::Sender<()>,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// Owns the HTTP listener: `Created -> Running -> Stopped`.
pub struct RelayerService {
    bind_addr: SocketAddr,
    state: Arc<RelayerState>,
    lifecycle: Lifecycle,
}

impl RelayerService {
    pub fn new(port: u16, state: RelayerState) -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            state: Arc::new(state),
            lifecycle: Lifecycle::Created,
        }
    }

    /// Listen on a specific address instead of all interfaces.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Address actually bound, once running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.lifecycle {
            Lifecycle::Running { addr, .. } => Some(*addr),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Running { .. })
    }

    /// Bind the listener and serve in the background.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        match self.lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Running { .. } => bail!("relayer is already running"),
            Lifecycle::Stopped => bail!("relayer has been stopped"),
        }

        let listener = TcpListener::bind(self.bind_addr)
            .await
            .map_err(|e| anyhow!("Failed to bind server to {}: {}", self.bind_addr, e))?;
        let addr = listener
            .local_addr()
            .context("Failed to read bound address")?;

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let app = router(self.state.clone());
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                error!("HTTP server error: {}", e);
            }
        });

        info!("Relayer listening on http://{}", addr);
        self.lifecycle = Lifecycle::Running {
            addr,
            shutdown,
            handle,
        };
        Ok(addr)
    }

    /// Stop accepting requests and wait up to [`SHUTDOWN_GRACE_PERIOD`] for
    /// in-flight ones. A no-op unless running.
    pub async fn stop(&mut self) -> Result<()> {
        let lifecycle = std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped);
        let (shutdown, mut handle) = match lifecycle {
            Lifecycle::Running {
                shutdown, handle, ..
            } => (shutdown, handle),
            other => {
                self.lifecycle = other;
                return Ok(());
            }
        };

        let _ = shutdown.send(());
        match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, &mut handle).await {
            Ok(joined) => joined.context("HTTP server task panicked")?,
            Err(_) => {
                warn!(
                    "In-flight requests did not finish within {:?}, aborting",
                    SHUTDOWN_GRACE_PERIOD
                );
                handle.abort();
            }
        }
        info!("Relayer stopped");
        Ok(())
    }
}
