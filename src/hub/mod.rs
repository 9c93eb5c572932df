//! The Registry (hub): the single authority over who is connected and who is in
//! which group.
//!
//! # Architecture
//!
//! - **Single writer**: one task owns the command loop and is the only code that
//!   mutates the tables. Everyone else sends it a [`HubCommand`] over a bounded
//!   channel and awaits the acknowledgement.
//! - **Read path**: delivery primitives take the read lock just long enough to
//!   snapshot the target queues, then enqueue outside the lock.
//! - **Stopped registry**: a command sent after shutdown is dropped with a warning
//!   and surfaces as [`HubError::Stopped`]; it is never fatal.

mod client;
mod delivery;
mod registry;
mod stats;

pub use client::{ClientHandle, DeliveryOutcome};
pub use delivery::DeliveryReport;
pub use stats::{HubStats, HubStatsSnapshot};

use crate::protocol::{GroupId, PresenceStatus, ServerMessage, UserId};
use parking_lot::RwLock;
use registry::Tables;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Registry failures. Callers log them; none is fatal to the process.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("registry has stopped")]
    Stopped,
    #[error("registry did not answer within {0:?}")]
    Timeout(Duration),
}

/// Commands consumed by the Registry task.
#[derive(Debug)]
enum HubCommand {
    Register {
        client: ClientHandle,
        ack: oneshot::Sender<()>,
    },
    Unregister {
        user_id: UserId,
        conn_id: Uuid,
        ack: oneshot::Sender<bool>,
    },
    JoinGroup {
        user_id: UserId,
        group_id: GroupId,
        ack: oneshot::Sender<bool>,
    },
    LeaveGroup {
        user_id: UserId,
        group_id: GroupId,
        ack: oneshot::Sender<bool>,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

impl HubCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Unregister { .. } => "unregister",
            Self::JoinGroup { .. } => "join_group",
            Self::LeaveGroup { .. } => "leave_group",
            Self::Shutdown { .. } => "shutdown",
        }
    }
}

struct Shared {
    tables: RwLock<Tables>,
    stats: HubStats,
}

/// Cloneable handle to the Registry.
#[derive(Clone)]
pub struct Hub {
    shared: Arc<Shared>,
    commands: mpsc::Sender<HubCommand>,
}

impl Hub {
    /// Start the Registry task with a command channel of `command_capacity`.
    ///
    /// The returned handle completes once the Registry has shut down.
    pub fn spawn(command_capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(command_capacity.max(1));
        let shared = Arc::new(Shared {
            tables: RwLock::new(Tables::default()),
            stats: HubStats::default(),
        });

        let hub = Self {
            shared: Arc::clone(&shared),
            commands: tx,
        };
        let task = tokio::spawn(run(shared, rx));
        (hub, task)
    }

    pub fn stats(&self) -> HubStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Whether a client for `user_id` is currently registered.
    pub fn is_online(&self, user_id: &str) -> bool {
        self.shared.tables.read().contains(user_id)
    }

    /// Live members of a group, as currently indexed.
    pub fn group_members(&self, group_id: &str) -> Vec<UserId> {
        let tables = self.shared.tables.read();
        let mut members: Vec<UserId> = tables
            .group_members(group_id)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Connection id of the user's live client.
    pub fn connection_of(&self, user_id: &str) -> Option<Uuid> {
        self.shared.tables.read().client(user_id).map(|c| c.conn_id)
    }

    /// Add a client to the live set and index its groups.
    ///
    /// A client already registered for the same user is replaced and told to shut down.
    pub async fn register(&self, client: ClientHandle) -> Result<(), HubError> {
        self.request(|ack| HubCommand::Register { client, ack }).await
    }

    /// Remove connection `conn_id` of `user_id`. Returns whether anything was removed.
    pub async fn unregister(&self, user_id: &str, conn_id: Uuid) -> Result<bool, HubError> {
        self.request(|ack| HubCommand::Unregister {
            user_id: user_id.to_string(),
            conn_id,
            ack,
        })
        .await
    }

    /// [`Hub::unregister`] bounded by `timeout`, so a stuck Registry cannot wedge the caller.
    pub async fn unregister_within(
        &self,
        user_id: &str,
        conn_id: Uuid,
        timeout: Duration,
    ) -> Result<bool, HubError> {
        tokio::time::timeout(timeout, self.unregister(user_id, conn_id))
            .await
            .map_err(|_| HubError::Timeout(timeout))?
    }

    /// Add a live user to a group's fan-out set.
    pub async fn join_group(&self, user_id: &str, group_id: &str) -> Result<bool, HubError> {
        self.request(|ack| HubCommand::JoinGroup {
            user_id: user_id.to_string(),
            group_id: group_id.to_string(),
            ack,
        })
        .await
    }

    /// Remove a user from a group's fan-out set.
    pub async fn leave_group(&self, user_id: &str, group_id: &str) -> Result<bool, HubError> {
        self.request(|ack| HubCommand::LeaveGroup {
            user_id: user_id.to_string(),
            group_id: group_id.to_string(),
            ack,
        })
        .await
    }

    /// Stop the Registry, asking every live client to disconnect.
    pub async fn shutdown(&self) -> Result<(), HubError> {
        self.request(|ack| HubCommand::Shutdown { ack }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> HubCommand,
    ) -> Result<T, HubError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        let command = build(ack_tx);
        let name = command.name();

        if self.commands.send(command).await.is_err() {
            warn!(command = name, "Registry stopped; command dropped");
            return Err(HubError::Stopped);
        }

        ack_rx.await.map_err(|_| {
            warn!(command = name, "Registry stopped before answering");
            HubError::Stopped
        })
    }
}

/// The Registry command loop.
async fn run(shared: Arc<Shared>, mut rx: mpsc::Receiver<HubCommand>) {
    debug!("Registry started");

    while let Some(command) = rx.recv().await {
        match command {
            HubCommand::Register { client, ack } => {
                let user_id = client.user_id.clone();
                let conn_id = client.conn_id;
                let replaced = {
                    let mut tables = shared.tables.write();
                    let replaced = tables.register(client);
                    publish_sizes(&shared, &tables);
                    replaced
                };
                shared.stats.registered(replaced.is_some());

                match replaced {
                    Some(old) => {
                        debug!(
                            user_id = %user_id,
                            old_conn = %old.conn_id,
                            new_conn = %conn_id,
                            "Client replaced"
                        );
                        old.shutdown();
                    }
                    None => {
                        debug!(user_id = %user_id, conn_id = %conn_id, "Client registered");
                        announce(&shared, &user_id, PresenceStatus::Online);
                    }
                }
                let _ = ack.send(());
            }
            HubCommand::Unregister {
                user_id,
                conn_id,
                ack,
            } => {
                let removed = {
                    let mut tables = shared.tables.write();
                    let removed = tables.unregister(&user_id, conn_id);
                    publish_sizes(&shared, &tables);
                    removed
                };
                shared.stats.unregister_requested(removed.is_some());

                if removed.is_some() {
                    debug!(user_id = %user_id, conn_id = %conn_id, "Client unregistered");
                    announce(&shared, &user_id, PresenceStatus::Offline);
                }
                let _ = ack.send(removed.is_some());
            }
            HubCommand::JoinGroup {
                user_id,
                group_id,
                ack,
            } => {
                let joined = {
                    let mut tables = shared.tables.write();
                    let joined = tables.join_group(&user_id, &group_id);
                    publish_sizes(&shared, &tables);
                    joined
                };
                debug!(user_id = %user_id, group_id = %group_id, joined, "Group join");
                let _ = ack.send(joined);
            }
            HubCommand::LeaveGroup {
                user_id,
                group_id,
                ack,
            } => {
                let left = {
                    let mut tables = shared.tables.write();
                    let left = tables.leave_group(&user_id, &group_id);
                    publish_sizes(&shared, &tables);
                    left
                };
                debug!(user_id = %user_id, group_id = %group_id, left, "Group leave");
                let _ = ack.send(left);
            }
            HubCommand::Shutdown { ack } => {
                let clients = {
                    let mut tables = shared.tables.write();
                    let clients = tables.drain();
                    publish_sizes(&shared, &tables);
                    clients
                };
                info!(clients = clients.len(), "Registry shutting down");
                for client in &clients {
                    client.shutdown();
                }
                let _ = ack.send(());
                break;
            }
        }
    }

    debug!("Registry stopped");
}

fn publish_sizes(shared: &Shared, tables: &Tables) {
    let (clients, groups) = (tables.client_count(), tables.group_count());
    shared.stats.set_sizes(clients, groups);
    crate::metrics::set_registry_size(clients, groups);
}

/// Best-effort presence broadcast; runs after the write lock is released.
fn announce(shared: &Shared, user_id: &str, status: PresenceStatus) {
    let frame = ServerMessage::presence(user_id, status).to_frame();
    let targets = shared.tables.read().all_targets(Some(user_id));
    let report = delivery::enqueue_all(&targets, &frame);
    shared.stats.deliveries(report.delivered, report.dropped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Frame;
    use serde_json::Value;
    use tokio_util::sync::CancellationToken;

    fn client(
        user: &str,
        groups: &[&str],
    ) -> (ClientHandle, mpsc::Receiver<Frame>, CancellationToken) {
        let (tx, rx) = mpsc::channel(16);
        let token = CancellationToken::new();
        let handle = ClientHandle::new(
            user.to_string(),
            Uuid::new_v4(),
            groups.iter().map(|g| g.to_string()).collect(),
            tx,
            token.clone(),
        );
        (handle, rx, token)
    }

    fn parse(frame: &Frame) -> Value {
        serde_json::from_str(frame.as_str()).expect("valid json")
    }

    #[tokio::test]
    async fn register_and_unregister_through_command_loop() {
        let (hub, _task) = Hub::spawn(8);
        let (a, _rx_a, _) = client("a", &["g"]);
        let conn = a.conn_id;

        hub.register(a).await.expect("register");
        assert!(hub.is_online("a"));
        assert_eq!(hub.group_members("g"), vec!["a"]);

        assert!(hub.unregister("a", conn).await.expect("unregister"));
        assert!(!hub.unregister("a", conn).await.expect("repeat is a no-op"));
        assert!(!hub.is_online("a"));
        assert!(hub.group_members("g").is_empty());

        let stats = hub.stats();
        assert_eq!(stats.registrations, 1);
        assert_eq!(stats.unregister_requests, 2);
        assert_eq!(stats.unregistrations, 1);
        assert_eq!(stats.live_clients, 0);
    }

    #[tokio::test]
    async fn presence_is_announced_to_others_only() {
        let (hub, _task) = Hub::spawn(8);
        let (a, mut rx_a, _) = client("a", &[]);
        let (b, mut rx_b, _) = client("b", &[]);
        let b_conn = b.conn_id;

        hub.register(a).await.expect("register a");
        hub.register(b).await.expect("register b");

        let online = parse(&rx_a.try_recv().expect("a sees b online"));
        assert_eq!(online["data"]["user_id"], "b");
        assert_eq!(online["data"]["status"], "online");
        assert!(rx_b.try_recv().is_err(), "b is not told about itself or earlier clients");

        hub.unregister("b", b_conn).await.expect("unregister");
        let offline = parse(&rx_a.try_recv().expect("a sees b offline"));
        assert_eq!(offline["data"]["status"], "offline");
    }

    #[tokio::test]
    async fn reconnect_signals_old_connection() {
        let (hub, _task) = Hub::spawn(8);
        let (first, _rx1, first_token) = client("a", &["g"]);
        let first_conn = first.conn_id;
        let (second, _rx2, second_token) = client("a", &[]);

        hub.register(first).await.expect("register");
        hub.register(second).await.expect("replace");

        assert!(first_token.is_cancelled());
        assert!(!second_token.is_cancelled());
        assert!(hub.group_members("g").is_empty());
        assert!(!hub.unregister("a", first_conn).await.expect("stale unregister"));
        assert!(hub.is_online("a"));
        assert_eq!(hub.stats().replacements, 1);
    }

    #[tokio::test]
    async fn join_and_leave_groups_live() {
        let (hub, _task) = Hub::spawn(8);
        let (a, _rx, _) = client("a", &[]);
        hub.register(a).await.expect("register");

        assert!(hub.join_group("a", "g").await.expect("join"));
        assert!(!hub.join_group("ghost", "g").await.expect("join ignored"));
        assert_eq!(hub.group_members("g"), vec!["a"]);
        assert!(hub.leave_group("a", "g").await.expect("leave"));
        assert_eq!(hub.stats().live_groups, 0);
    }

    #[tokio::test]
    async fn commands_after_shutdown_report_stopped() {
        let (hub, task) = Hub::spawn(8);
        let (a, _rx, token) = client("a", &["g"]);
        hub.register(a).await.expect("register");

        hub.shutdown().await.expect("shutdown");
        task.await.expect("registry task ends");
        assert!(token.is_cancelled());

        let (b, _rx_b, _) = client("b", &[]);
        assert_eq!(hub.register(b).await, Err(HubError::Stopped));
        assert_eq!(hub.unregister("a", Uuid::new_v4()).await, Err(HubError::Stopped));
    }

    #[tokio::test]
    async fn unregister_within_times_out_on_stuck_registry() {
        // A full command channel whose consumer never runs stands in for a wedged Registry.
        let (tx, _rx) = mpsc::channel(1);
        let hub = Hub {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                stats: HubStats::default(),
            }),
            commands: tx,
        };
        let (ack, _) = oneshot::channel();
        hub.commands
            .send(HubCommand::Shutdown { ack })
            .await
            .expect("fill channel");

        let timeout = Duration::from_millis(50);
        let result = hub.unregister_within("a", Uuid::new_v4(), timeout).await;
        assert_eq!(result, Err(HubError::Timeout(timeout)));
    }
}
