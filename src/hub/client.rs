//! Registry-side handle to one live Client Actor.

use crate::protocol::{Frame, GroupId, UserId};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Result of one non-blocking enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The recipient's queue was at capacity; this frame is lost for them.
    QueueFull,
    /// The recipient is shutting down.
    Closed,
}

/// What the Registry keeps for each live client.
///
/// Holding a handle never keeps the connection alive: the outbound sender is the
/// only way to reach it, and the shutdown token lets the Registry ask it to go away
/// when a newer connection for the same user replaces it.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub user_id: UserId,
    /// Distinguishes successive connections of the same user.
    pub conn_id: Uuid,
    groups: Arc<[GroupId]>,
    outbound: mpsc::Sender<Frame>,
    shutdown: CancellationToken,
}

impl ClientHandle {
    pub fn new(
        user_id: UserId,
        conn_id: Uuid,
        groups: Vec<GroupId>,
        outbound: mpsc::Sender<Frame>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            user_id,
            conn_id,
            groups: groups.into(),
            outbound,
            shutdown,
        }
    }

    /// Group memberships snapshotted when the client connected.
    pub fn groups(&self) -> &[GroupId] {
        &self.groups
    }

    pub(crate) fn outbound(&self) -> &mpsc::Sender<Frame> {
        &self.outbound
    }

    /// Ask the client to disconnect.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Enqueue without waiting.
    pub fn try_deliver(&self, frame: &Frame) -> DeliveryOutcome {
        try_enqueue(&self.outbound, frame)
    }
}

pub(crate) fn try_enqueue(outbound: &mpsc::Sender<Frame>, frame: &Frame) -> DeliveryOutcome {
    match outbound.try_send(frame.clone()) {
        Ok(()) => DeliveryOutcome::Delivered,
        Err(TrySendError::Full(_)) => DeliveryOutcome::QueueFull,
        Err(TrySendError::Closed(_)) => DeliveryOutcome::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerMessage;

    #[tokio::test]
    async fn full_queue_drops_newest_and_keeps_order() {
        let (tx, mut rx) = mpsc::channel(2);
        let client =
            ClientHandle::new("u1".into(), Uuid::new_v4(), vec![], tx, CancellationToken::new());

        let frames: Vec<Frame> = (0..3)
            .map(|i| ServerMessage::success(format!("m{i}")).to_frame())
            .collect();

        assert_eq!(client.try_deliver(&frames[0]), DeliveryOutcome::Delivered);
        assert_eq!(client.try_deliver(&frames[1]), DeliveryOutcome::Delivered);
        assert_eq!(client.try_deliver(&frames[2]), DeliveryOutcome::QueueFull);

        assert_eq!(rx.recv().await, Some(frames[0].clone()));
        assert_eq!(rx.recv().await, Some(frames[1].clone()));
        assert!(rx.try_recv().is_err());

        // Space freed: deliverable again.
        assert_eq!(client.try_deliver(&frames[2]), DeliveryOutcome::Delivered);
        assert_eq!(rx.recv().await, Some(frames[2].clone()));
    }

    #[tokio::test]
    async fn closed_queue_reports_closed() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let client =
            ClientHandle::new("u1".into(), Uuid::new_v4(), vec![], tx, CancellationToken::new());
        let frame = ServerMessage::success("late").to_frame();
        assert_eq!(client.try_deliver(&frame), DeliveryOutcome::Closed);
    }
}
