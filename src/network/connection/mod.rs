//! Client Actor: one accepted WebSocket bridged to the hub.
//!
//! [`Connection::start`] is the connection-accept entry point. It loads the
//! user's group memberships, registers a [`ClientHandle`] with the Registry and
//! starts three tasks:
//!
//! - the **inbound pump** reads frames, enforces the idle-read deadline and
//!   forwards decoded envelopes to the router;
//! - the **dispatch loop** runs handlers for this client one at a time;
//! - the **outbound pump** drains the bounded outbound queue onto the socket and
//!   sends keepalive pings.
//!
//! Whichever task notices the end first runs the at-most-once cleanup.

mod error_handling;
mod inbound;
mod lifecycle;
mod outbound;

pub use lifecycle::{CloseReason, ConnState};

use crate::db::DbError;
use crate::handlers::{self, Context};
use crate::hub::{ClientHandle, HubError};
use crate::network::ServerContext;
use crate::security::ConnectionRateLimiter;
use futures_util::StreamExt;
use inbound::InboundPump;
use lifecycle::ClientActor;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tracing::{Instrument, error, instrument};
use uuid::Uuid;

/// Transport-level failures. Always fatal to the one connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("write did not complete within {0:?}")]
    WriteTimeout(Duration),
    #[error("failed to load memberships: {0}")]
    Database(#[from] DbError),
    #[error("registration failed: {0}")]
    Registry(#[from] HubError),
}

/// An authenticated, upgraded connection not yet attached to the hub.
pub struct Connection<S> {
    user_id: String,
    ws: WebSocketStream<S>,
    ctx: ServerContext,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(user_id: String, ws: WebSocketStream<S>, ctx: ServerContext) -> Self {
        Self { user_id, ws, ctx }
    }

    /// Register the client and start its tasks.
    pub async fn start(self) -> Result<ClientSession, ConnectionError> {
        let Self { user_id, ws, ctx } = self;
        let limits = &ctx.config.limits;
        let timeouts = ctx.config.timeouts.clone();

        let groups = ctx.db.groups().memberships_for(&user_id).await?;

        let conn_id = Uuid::new_v4();
        let span = crate::telemetry::spans::connection(&user_id, conn_id);
        let shutdown = tokio_util::sync::CancellationToken::new();
        let (outbound_tx, outbound_rx) = mpsc::channel(limits.outbound_queue.max(1));
        let (dispatch_tx, dispatch_rx) = mpsc::channel(limits.inbound_queue.max(1));

        let handle = ClientHandle::new(
            user_id.clone(),
            conn_id,
            groups,
            outbound_tx.clone(),
            shutdown.clone(),
        );
        ctx.hub.register(handle).await?;

        let actor = Arc::new(ClientActor::new(
            user_id.clone(),
            conn_id,
            shutdown,
            ctx.hub.clone(),
            timeouts.unregister_timeout(),
        ));

        let (sink, stream) = ws.split();

        let outbound = tokio::spawn(
            outbound::run(Arc::clone(&actor), sink, outbound_rx, timeouts.clone())
                .instrument(span.clone()),
        );

        let dispatch_ctx = Context::new(
            user_id.clone(),
            conn_id,
            ctx.hub.clone(),
            ctx.db.clone(),
            outbound_tx.clone(),
        );
        let dispatch =
            tokio::spawn(handlers::run(dispatch_ctx, dispatch_rx).instrument(span.clone()));

        let pump = InboundPump {
            actor: Arc::clone(&actor),
            dispatch: dispatch_tx,
            replies: outbound_tx,
            limiter: ConnectionRateLimiter::from_limits(limits),
            pong_wait: timeouts.pong_wait(),
        };
        let inbound = tokio::spawn(pump.run(stream).instrument(span));

        Ok(ClientSession {
            actor,
            inbound,
            outbound,
            dispatch,
        })
    }

    /// Start the client and wait until it has fully closed.
    #[instrument(skip(self), fields(user_id = %self.user_id), name = "connection")]
    pub async fn run(self) -> Result<CloseReason, ConnectionError> {
        Ok(self.start().await?.join().await)
    }
}

/// A running Client Actor.
pub struct ClientSession {
    actor: Arc<ClientActor>,
    inbound: JoinHandle<()>,
    outbound: JoinHandle<()>,
    dispatch: JoinHandle<()>,
}

impl ClientSession {
    pub fn user_id(&self) -> &str {
        &self.actor.user_id
    }

    pub fn conn_id(&self) -> Uuid {
        self.actor.conn_id
    }

    pub fn state(&self) -> ConnState {
        self.actor.state()
    }

    /// Explicitly disconnect. Returns false when cleanup had already run.
    pub async fn disconnect(&self) -> bool {
        self.actor.cleanup(CloseReason::ServerShutdown).await
    }

    /// Wait for all three tasks to finish.
    pub async fn join(self) -> CloseReason {
        let (inbound, outbound, dispatch) =
            tokio::join!(self.inbound, self.outbound, self.dispatch);
        for (task, result) in [
            ("inbound", inbound),
            ("outbound", outbound),
            ("dispatch", dispatch),
        ] {
            if let Err(e) = result {
                error!(user_id = %self.actor.user_id, task, error = %e, "Connection task failed");
            }
        }
        self.actor
            .close_reason()
            .unwrap_or(CloseReason::ServerShutdown)
    }
}
