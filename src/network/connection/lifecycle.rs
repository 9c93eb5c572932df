//! Client Actor lifecycle and the at-most-once cleanup.
//!
//! State machine: `Connected -> Closing -> Closed` (terminal). Any of the inbound
//! pump, the outbound pump, or an explicit disconnect may trigger cleanup, in any
//! number and concurrently; only the first caller performs it.

use crate::hub::Hub;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connected,
    Closing,
    Closed,
}

const CONNECTED: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

#[derive(Debug)]
pub(crate) struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(CONNECTED))
    }

    /// Move `Connected -> Closing`. Only one caller ever wins.
    pub(crate) fn begin_closing(&self) -> bool {
        self.0
            .compare_exchange(CONNECTED, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn mark_closed(&self) {
        self.0.store(CLOSED, Ordering::Release);
    }

    pub(crate) fn state(&self) -> ConnState {
        match self.0.load(Ordering::Acquire) {
            CONNECTED => ConnState::Connected,
            CLOSING => ConnState::Closing,
            _ => ConnState::Closed,
        }
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent a close frame or hung up.
    ClientClosed,
    /// Nothing was read within the idle-read deadline.
    IdleTimeout,
    /// A read failed or the peer broke the protocol (e.g. an oversized frame).
    TransportError,
    /// A write failed or exceeded its deadline.
    WriteFailed,
    /// A newer connection for the same user took over.
    Replaced,
    /// The server asked the client to go.
    ServerShutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::IdleTimeout => "idle_timeout",
            Self::TransportError => "transport_error",
            Self::WriteFailed => "write_failed",
            Self::Replaced => "replaced",
            Self::ServerShutdown => "server_shutdown",
        }
    }

    pub(crate) fn close_code(&self) -> CloseCode {
        match self {
            Self::ClientClosed => CloseCode::Normal,
            Self::IdleTimeout | Self::Replaced | Self::ServerShutdown => CloseCode::Away,
            Self::TransportError | Self::WriteFailed => CloseCode::Protocol,
        }
    }
}

/// Counts inbound frames so the outbound pump can tell whether the peer is quiet.
#[derive(Debug, Default)]
pub(crate) struct ActivityClock {
    reads: AtomicU64,
}

impl ActivityClock {
    pub(crate) fn touch(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

/// State shared by the tasks of one Client Actor.
pub(crate) struct ClientActor {
    pub(crate) user_id: String,
    pub(crate) conn_id: Uuid,
    pub(crate) shutdown: CancellationToken,
    pub(crate) activity: ActivityClock,
    lifecycle: Lifecycle,
    close_reason: OnceLock<CloseReason>,
    hub: Hub,
    unregister_timeout: Duration,
}

impl ClientActor {
    pub(crate) fn new(
        user_id: String,
        conn_id: Uuid,
        shutdown: CancellationToken,
        hub: Hub,
        unregister_timeout: Duration,
    ) -> Self {
        Self {
            user_id,
            conn_id,
            shutdown,
            activity: ActivityClock::default(),
            lifecycle: Lifecycle::new(),
            close_reason: OnceLock::new(),
            hub,
            unregister_timeout,
        }
    }

    pub(crate) fn state(&self) -> ConnState {
        self.lifecycle.state()
    }

    pub(crate) fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.get().copied()
    }

    /// Run cleanup if nobody has yet. Returns whether this call performed it.
    ///
    /// Unregisters from the Registry (bounded by the unregister timeout), then
    /// cancels the shutdown token; the outbound pump reacts by flushing what is
    /// already queued, sending a close frame and closing the socket.
    pub(crate) async fn cleanup(&self, reason: CloseReason) -> bool {
        if !self.lifecycle.begin_closing() {
            return false;
        }
        let _ = self.close_reason.set(reason);
        debug!(
            user_id = %self.user_id,
            conn_id = %self.conn_id,
            reason = reason.as_str(),
            "Cleanup started"
        );

        match self
            .hub
            .unregister_within(&self.user_id, self.conn_id, self.unregister_timeout)
            .await
        {
            Ok(removed) => {
                debug!(user_id = %self.user_id, removed, "Unregistered from registry");
            }
            Err(e) => {
                warn!(
                    user_id = %self.user_id,
                    conn_id = %self.conn_id,
                    error = %e,
                    "Unregister failed during cleanup"
                );
            }
        }

        self.shutdown.cancel();
        crate::metrics::record_connection_closed(reason.as_str());
        true
    }

    /// Reason for a shutdown this actor did not initiate.
    pub(crate) fn external_close_reason(&self) -> CloseReason {
        if let Some(reason) = self.close_reason() {
            return reason;
        }
        match self.hub.connection_of(&self.user_id) {
            Some(current) if current != self.conn_id => CloseReason::Replaced,
            _ => CloseReason::ServerShutdown,
        }
    }

    /// Called by the outbound pump once the socket is closed.
    pub(crate) fn mark_closed(&self) {
        self.lifecycle.mark_closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::ClientHandle;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[test]
    fn lifecycle_transitions_once() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), ConnState::Connected);
        assert!(lifecycle.begin_closing());
        assert!(!lifecycle.begin_closing());
        assert_eq!(lifecycle.state(), ConnState::Closing);
        lifecycle.mark_closed();
        assert!(!lifecycle.begin_closing());
        assert_eq!(lifecycle.state(), ConnState::Closed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_cleanup_unregisters_exactly_once() {
        let (hub, _task) = Hub::spawn(16);
        let (tx, _rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        let conn_id = Uuid::new_v4();
        hub.register(ClientHandle::new("a".into(), conn_id, vec!["g".into()], tx, token.clone()))
            .await
            .expect("register");

        let actor = Arc::new(ClientActor::new(
            "a".into(),
            conn_id,
            token.clone(),
            hub.clone(),
            Duration::from_secs(1),
        ));

        let reasons = [
            CloseReason::ClientClosed,
            CloseReason::WriteFailed,
            CloseReason::IdleTimeout,
            CloseReason::ServerShutdown,
        ];
        let mut tasks = Vec::new();
        for i in 0..32 {
            let actor = Arc::clone(&actor);
            let reason = reasons[i % reasons.len()];
            tasks.push(tokio::spawn(async move { actor.cleanup(reason).await }));
        }

        let mut performed = 0;
        for task in tasks {
            if task.await.expect("no panic") {
                performed += 1;
            }
        }

        assert_eq!(performed, 1);
        assert_eq!(hub.stats().unregister_requests, 1);
        assert!(!hub.is_online("a"));
        assert!(token.is_cancelled());
        assert!(actor.close_reason().is_some());
        assert_eq!(actor.state(), ConnState::Closing);
    }

    #[tokio::test]
    async fn cleanup_survives_stopped_registry() {
        let (hub, task) = Hub::spawn(4);
        hub.shutdown().await.expect("shutdown");
        task.await.expect("registry ended");

        let token = CancellationToken::new();
        let actor = ClientActor::new(
            "a".into(),
            Uuid::new_v4(),
            token.clone(),
            hub,
            Duration::from_millis(100),
        );
        assert!(actor.cleanup(CloseReason::ClientClosed).await);
        assert!(token.is_cancelled());
        assert_eq!(actor.close_reason(), Some(CloseReason::ClientClosed));
    }
}
