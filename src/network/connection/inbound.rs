//! Inbound pump: reads frames, enforces the idle deadline, decodes envelopes.

use super::error_handling::classify_read_error;
use super::lifecycle::{ClientActor, CloseReason};
use crate::hub::DeliveryOutcome;
use crate::protocol::{Frame, ProtocolError, RawEnvelope, ServerMessage};
use crate::security::ConnectionRateLimiter;
use futures_util::StreamExt;
use futures_util::stream::SplitStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

pub(super) struct InboundPump {
    pub(super) actor: Arc<ClientActor>,
    /// Decoded envelopes for the router.
    pub(super) dispatch: mpsc::Sender<RawEnvelope>,
    /// The client's own outbound queue, for protocol error replies.
    pub(super) replies: mpsc::Sender<Frame>,
    pub(super) limiter: ConnectionRateLimiter,
    pub(super) pong_wait: Duration,
}

enum Step {
    Continue,
    Stop(CloseReason),
}

impl InboundPump {
    pub(super) async fn run<S>(self, mut stream: SplitStream<WebSocketStream<S>>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let reason = loop {
            let next = tokio::select! {
                biased;
                _ = self.actor.shutdown.cancelled() => break self.actor.external_close_reason(),
                next = tokio::time::timeout(self.pong_wait, stream.next()) => next,
            };

            let step = match next {
                Err(_) => {
                    info!(user_id = %self.actor.user_id, "Idle-read deadline expired");
                    Step::Stop(CloseReason::IdleTimeout)
                }
                Ok(None) => Step::Stop(CloseReason::ClientClosed),
                Ok(Some(Err(e))) => {
                    let reason = classify_read_error(&e);
                    if reason == CloseReason::ClientClosed {
                        debug!(user_id = %self.actor.user_id, error = %e, "Peer went away");
                    } else {
                        info!(user_id = %self.actor.user_id, error = %e, "Transport read error");
                    }
                    Step::Stop(reason)
                }
                Ok(Some(Ok(message))) => {
                    self.actor.activity.touch();
                    self.on_message(message).await
                }
            };

            if let Step::Stop(reason) = step {
                break reason;
            }
        };

        // A no-op when cleanup already ran (e.g. the cancellation came from it).
        self.actor.cleanup(reason).await;
        debug!(user_id = %self.actor.user_id, reason = reason.as_str(), "Inbound pump finished");
    }

    async fn on_message(&self, message: Message) -> Step {
        match message {
            Message::Text(text) => self.on_text(&text).await,
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => self.on_text(&text).await,
                Err(_) => {
                    self.reply_error(ProtocolError::InvalidJson);
                    Step::Continue
                }
            },
            Message::Close(_) => Step::Stop(CloseReason::ClientClosed),
            // Pongs only matter for the idle deadline, already refreshed.
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Step::Continue,
        }
    }

    async fn on_text(&self, text: &str) -> Step {
        if !self.limiter.check() {
            crate::metrics::record_rate_limited();
            self.reply_error(ProtocolError::RateLimited);
            return Step::Continue;
        }

        let envelope = match RawEnvelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(user_id = %self.actor.user_id, "Undecodable frame");
                self.reply_error(e);
                return Step::Continue;
            }
        };

        tokio::select! {
            biased;
            _ = self.actor.shutdown.cancelled() => Step::Stop(self.actor.external_close_reason()),
            sent = self.dispatch.send(envelope) => match sent {
                Ok(()) => Step::Continue,
                // The router has gone away.
                Err(_) => Step::Stop(CloseReason::ServerShutdown),
            },
        }
    }

    fn reply_error(&self, err: ProtocolError) {
        crate::metrics::record_message_error("frame", err.error_code());
        let frame = ServerMessage::from(err).to_frame();
        if let Err(e) = self.replies.try_send(frame) {
            let outcome = match e {
                mpsc::error::TrySendError::Full(_) => DeliveryOutcome::QueueFull,
                mpsc::error::TrySendError::Closed(_) => DeliveryOutcome::Closed,
            };
            debug!(user_id = %self.actor.user_id, ?outcome, "Error reply dropped");
        }
    }
}
