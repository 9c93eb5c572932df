//! Outbound pump: drains the bounded queue onto the socket.

use super::lifecycle::{ClientActor, CloseReason};
use super::ConnectionError;
use crate::config::TimeoutsConfig;
use crate::protocol::Frame;
use futures_util::stream::SplitSink;
use futures_util::{Sink, SinkExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tracing::debug;

pub(super) async fn run<S>(
    actor: Arc<ClientActor>,
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut rx: mpsc::Receiver<Frame>,
    timeouts: TimeoutsConfig,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let write_wait = timeouts.write_wait();
    // `interval` rejects a zero period.
    let period = timeouts.ping_period().max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut wrote_since_tick = false;
    let mut reads_at_tick = actor.activity.reads();
    let mut write_failed = false;

    loop {
        tokio::select! {
            biased;
            _ = actor.shutdown.cancelled() => break,
            frame = rx.recv() => {
                let Some(frame) = frame else {
                    // Every producer is gone; nothing can reach this client any more.
                    actor.cleanup(CloseReason::ServerShutdown).await;
                    break;
                };
                if let Err(e) = write(&mut sink, text(&frame), write_wait).await {
                    debug!(user_id = %actor.user_id, error = %e, "Outbound write failed");
                    write_failed = true;
                    actor.cleanup(CloseReason::WriteFailed).await;
                    break;
                }
                wrote_since_tick = true;
            }
            _ = ticker.tick() => {
                let reads = actor.activity.reads();
                if !wrote_since_tick || reads == reads_at_tick {
                    if let Err(e) = write(&mut sink, Message::Ping(Vec::new()), write_wait).await {
                        debug!(user_id = %actor.user_id, error = %e, "Keepalive ping failed");
                        write_failed = true;
                        actor.cleanup(CloseReason::WriteFailed).await;
                        break;
                    }
                }
                wrote_since_tick = false;
                reads_at_tick = reads;
            }
        }
    }

    rx.close();
    if !write_failed {
        flush_queued(&actor, &mut sink, &mut rx, timeouts.flush_grace(), write_wait).await;
        let reason = actor.external_close_reason();
        let close = Message::Close(Some(CloseFrame {
            code: reason.close_code(),
            reason: reason.as_str().into(),
        }));
        let _ = write(&mut sink, close, write_wait).await;
    }
    let _ = tokio::time::timeout(write_wait, sink.close()).await;
    actor.mark_closed();
    debug!(user_id = %actor.user_id, "Outbound pump finished");
}

/// Give frames queued before cleanup a bounded chance to reach the client.
async fn flush_queued<S>(
    actor: &ClientActor,
    sink: &mut SplitSink<WebSocketStream<S>, Message>,
    rx: &mut mpsc::Receiver<Frame>,
    grace: Duration,
    write_wait: Duration,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let deadline = tokio::time::sleep(grace);
    tokio::pin!(deadline);
    let mut flushed = 0usize;

    loop {
        tokio::select! {
            biased;
            _ = &mut deadline => break,
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if write(sink, text(&frame), write_wait).await.is_err() {
                    break;
                }
                flushed += 1;
            }
        }
    }

    let abandoned = std::iter::from_fn(|| rx.try_recv().ok()).count();
    if flushed > 0 || abandoned > 0 {
        debug!(user_id = %actor.user_id, flushed, abandoned, "Outbound queue drained");
    }
}

fn text(frame: &Frame) -> Message {
    Message::Text(frame.as_str().to_owned())
}

async fn write<K>(sink: &mut K, message: Message, wait: Duration) -> Result<(), ConnectionError>
where
    K: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    match tokio::time::timeout(wait, sink.send(message)).await {
        Ok(result) => result.map_err(ConnectionError::from),
        Err(_) => Err(ConnectionError::WriteTimeout(wait)),
    }
}
