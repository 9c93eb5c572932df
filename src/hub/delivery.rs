//! Delivery primitives: unicast, multicast and broadcast.
//!
//! All three snapshot their targets under the Registry's read lock and then
//! enqueue without blocking. A full queue drops the frame for that recipient
//! only; an offline recipient is a no-op. Neither is an error: the durable record
//! was written before delivery was attempted.

use super::Hub;
use super::client::{DeliveryOutcome, try_enqueue};
use crate::protocol::{Frame, ServerMessage};
use tokio::sync::mpsc;
use tracing::debug;

/// Per-call delivery tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Frames accepted by a recipient queue.
    pub delivered: usize,
    /// Frames lost to a full or closing queue.
    pub dropped: usize,
}

impl DeliveryReport {
    pub fn targets(&self) -> usize {
        self.delivered + self.dropped
    }
}

pub(super) fn enqueue_all(targets: &[mpsc::Sender<Frame>], frame: &Frame) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    for outbound in targets {
        match try_enqueue(outbound, frame) {
            DeliveryOutcome::Delivered => report.delivered += 1,
            DeliveryOutcome::QueueFull | DeliveryOutcome::Closed => report.dropped += 1,
        }
    }
    report
}

impl Hub {
    /// Deliver to one user, if connected.
    pub fn unicast(&self, user_id: &str, frame: &Frame) -> DeliveryReport {
        let target = self
            .shared
            .tables
            .read()
            .client(user_id)
            .map(|c| c.outbound().clone());

        let report = match target {
            Some(outbound) => enqueue_all(std::slice::from_ref(&outbound), frame),
            None => DeliveryReport::default(),
        };
        if report.dropped > 0 {
            debug!(user_id = %user_id, "Unicast dropped: queue full");
        }
        self.record(report);
        report
    }

    /// Deliver to every live member of `group_id` except `exclude`.
    pub fn multicast(
        &self,
        group_id: &str,
        frame: &Frame,
        exclude: Option<&str>,
    ) -> DeliveryReport {
        let targets = self.shared.tables.read().group_targets(group_id, exclude);
        let report = enqueue_all(&targets, frame);
        if report.dropped > 0 {
            debug!(group_id = %group_id, dropped = report.dropped, "Multicast dropped frames");
        }
        crate::metrics::record_fanout(report.targets());
        self.record(report);
        report
    }

    /// Deliver to every live client except `exclude`.
    pub fn broadcast(&self, frame: &Frame, exclude: Option<&str>) -> DeliveryReport {
        let targets = self.shared.tables.read().all_targets(exclude);
        let report = enqueue_all(&targets, frame);
        if report.dropped > 0 {
            debug!(dropped = report.dropped, "Broadcast dropped frames");
        }
        crate::metrics::record_fanout(report.targets());
        self.record(report);
        report
    }

    /// Serialize once and deliver to each listed user.
    pub fn send_to_users<'a>(
        &self,
        user_ids: impl IntoIterator<Item = &'a str>,
        message: &ServerMessage,
    ) -> DeliveryReport {
        let frame = message.to_frame();
        let targets: Vec<_> = {
            let tables = self.shared.tables.read();
            user_ids
                .into_iter()
                .filter_map(|id| tables.client(id).map(|c| c.outbound().clone()))
                .collect()
        };
        let report = enqueue_all(&targets, &frame);
        self.record(report);
        report
    }

    /// Serialize and unicast a notification-shaped message.
    pub fn notify(&self, user_id: &str, message: &ServerMessage) -> DeliveryReport {
        self.unicast(user_id, &message.to_frame())
    }

    /// Serialize and multicast to a group, skipping `exclude`.
    pub fn notify_group(
        &self,
        group_id: &str,
        message: &ServerMessage,
        exclude: Option<&str>,
    ) -> DeliveryReport {
        self.multicast(group_id, &message.to_frame(), exclude)
    }

    fn record(&self, report: DeliveryReport) {
        self.shared.stats.deliveries(report.delivered, report.dropped);
        crate::metrics::record_delivery(report.delivered, report.dropped);
    }
}

#[cfg(test)]
mod tests {
    use crate::hub::{ClientHandle, Hub};
    use crate::protocol::{Frame, ServerMessage};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    async fn connect(
        hub: &Hub,
        user: &str,
        groups: &[&str],
        capacity: usize,
    ) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = ClientHandle::new(
            user.to_string(),
            Uuid::new_v4(),
            groups.iter().map(|g| g.to_string()).collect(),
            tx,
            CancellationToken::new(),
        );
        hub.register(handle).await.expect("register");
        rx
    }

    fn drain_presence(rx: &mut mpsc::Receiver<Frame>) {
        while rx.try_recv().is_ok() {}
    }

    #[tokio::test]
    async fn unicast_to_offline_user_is_a_no_op() {
        let (hub, _task) = Hub::spawn(8);
        let frame = ServerMessage::success("hello").to_frame();
        let report = hub.unicast("nobody", &frame);
        assert_eq!(report.targets(), 0);
    }

    #[tokio::test]
    async fn multicast_excludes_sender_and_non_members() {
        let (hub, _task) = Hub::spawn(8);
        let mut rx_a = connect(&hub, "a", &["G"], 16).await;
        let mut rx_b = connect(&hub, "b", &[], 16).await;
        let mut rx_c = connect(&hub, "c", &["G"], 16).await;
        for rx in [&mut rx_a, &mut rx_b, &mut rx_c] {
            drain_presence(rx);
        }

        let frame = ServerMessage::success("group news").to_frame();
        let report = hub.multicast("G", &frame, Some("a"));

        assert_eq!(report.delivered, 1);
        assert!(rx_a.try_recv().is_err(), "sender excluded");
        assert!(rx_b.try_recv().is_err(), "non-member gets nothing");
        assert_eq!(rx_c.try_recv().expect("member receives"), frame);
    }

    #[tokio::test]
    async fn broadcast_skips_excluded_client() {
        let (hub, _task) = Hub::spawn(8);
        let mut rx_a = connect(&hub, "a", &[], 16).await;
        let mut rx_b = connect(&hub, "b", &[], 16).await;
        drain_presence(&mut rx_a);
        drain_presence(&mut rx_b);

        let frame = ServerMessage::success("all hands").to_frame();
        assert_eq!(hub.broadcast(&frame, Some("b")).delivered, 1);
        assert_eq!(rx_a.try_recv().expect("a receives"), frame);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn overflow_drops_excess_without_blocking() {
        let (hub, _task) = Hub::spawn(8);
        let mut rx = connect(&hub, "slow", &[], 256).await;

        let frames: Vec<Frame> = (0..300)
            .map(|i| ServerMessage::success(format!("m{i}")).to_frame())
            .collect();
        let mut delivered = 0;
        for frame in &frames {
            delivered += hub.unicast("slow", frame).delivered;
        }
        assert_eq!(delivered, 256);
        assert_eq!(hub.stats().dropped, 44);

        // The earliest 256 remain, in order.
        for expected in frames.iter().take(256) {
            assert_eq!(&rx.recv().await.expect("queued"), expected);
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_users_serializes_once_for_listed_users() {
        let (hub, _task) = Hub::spawn(8);
        let mut rx_a = connect(&hub, "a", &[], 16).await;
        let mut rx_b = connect(&hub, "b", &[], 16).await;
        drain_presence(&mut rx_a);
        drain_presence(&mut rx_b);

        let report = hub.send_to_users(["a", "ghost"], &ServerMessage::success("hi"));
        assert_eq!(report.delivered, 1);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }
}
