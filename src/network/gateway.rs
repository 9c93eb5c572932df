//! Gateway - TCP listener that upgrades and authenticates WebSocket clients.
//!
//! The Gateway accepts sockets, performs the WebSocket handshake (checking the
//! request path and origin and capturing credentials), authenticates, and hands
//! the upgraded stream to a [`Connection`].

use super::{Connection, ServerContext, websocket_config};
use crate::auth::{Authenticator, Credentials};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// The Gateway accepts incoming connections and spawns a task per client.
pub struct Gateway {
    listener: TcpListener,
    ctx: ServerContext,
    authenticator: Arc<dyn Authenticator>,
}

impl Gateway {
    /// Bind the gateway to `listen.address`.
    pub async fn bind(
        ctx: ServerContext,
        authenticator: Arc<dyn Authenticator>,
    ) -> anyhow::Result<Self> {
        let addr = ctx.config.listen.address;
        let listener = TcpListener::bind(addr).await?;
        info!(
            address = %listener.local_addr()?,
            path = %ctx.config.listen.path,
            "WebSocket listener bound"
        );
        Ok(Self {
            listener,
            ctx,
            authenticator,
        })
    }

    /// The bound address (useful when binding port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` is cancelled.
    #[instrument(skip(self, shutdown), name = "gateway")]
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Gateway stopping");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!(%addr, "WebSocket connection attempt");
                        let ctx = self.ctx.clone();
                        let authenticator = Arc::clone(&self.authenticator);
                        tokio::spawn(serve(stream, addr, ctx, authenticator));
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }
    }
}

/// Upgrade, authenticate and run one client.
async fn serve(
    stream: TcpStream,
    addr: SocketAddr,
    ctx: ServerContext,
    authenticator: Arc<dyn Authenticator>,
) {
    let config = Arc::clone(&ctx.config);
    let mut credentials = Credentials::default();

    let callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() != config.listen.path {
            crate::metrics::record_upgrade_rejected("path");
            return Err(reject(http::StatusCode::NOT_FOUND, "not found"));
        }

        let origin = req.headers().get("Origin").and_then(|o| o.to_str().ok());
        if !config.listen.origin_allowed(origin) {
            warn!(%addr, origin = ?origin, "WebSocket origin rejected");
            crate::metrics::record_upgrade_rejected("origin");
            return Err(reject(http::StatusCode::FORBIDDEN, "origin not allowed"));
        }

        credentials = Credentials::from_request(req, &config.auth);
        Ok(response)
    };

    let ws_config = websocket_config(&config.limits);
    let mut ws = match accept_hdr_async_with_config(stream, callback, Some(ws_config)).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%addr, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    let user_id = match authenticator.authenticate(&credentials).await {
        Ok(user_id) => user_id,
        Err(e) => {
            warn!(%addr, error = %e, "WebSocket authentication failed");
            crate::metrics::record_upgrade_rejected(e.error_code());
            let frame = CloseFrame {
                code: CloseCode::Policy,
                reason: "authentication failed".into(),
            };
            let _ = ws.close(Some(frame)).await;
            return;
        }
    };

    info!(%addr, user_id = %user_id, "Client connected");
    match Connection::new(user_id.clone(), ws, ctx).run().await {
        Ok(reason) => {
            info!(%addr, user_id = %user_id, reason = reason.as_str(), "Client disconnected")
        }
        Err(e) => error!(%addr, user_id = %user_id, error = %e, "Client connection failed"),
    }
}

fn reject(status: http::StatusCode, message: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message.to_string()));
    *response.status_mut() = status;
    response
}
