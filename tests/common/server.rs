//! Test server management.
//!
//! Runs a full gateway + registry in the test's own runtime, bound to an
//! ephemeral port, with a seeded in-memory database.

use social_hub::auth;
use social_hub::config::Config;
use social_hub::db::{Database, NewUser};
use social_hub::hub::Hub;
use social_hub::network::{Gateway, ServerContext};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Seeded users: `alice` and `carol` are public profiles, `bob` is private.
pub const USERS: &[(&str, bool)] =
    &[("alice", true), ("bob", false), ("carol", true), ("dave", true)];

/// Group `g-rust` ("Rustaceans"), administered by `alice`.
pub const GROUP: &str = "g-rust";

/// A running test server.
pub struct TestServer {
    addr: SocketAddr,
    pub db: Database,
    pub hub: Hub,
    shutdown: CancellationToken,
    gateway: Option<JoinHandle<anyhow::Result<()>>>,
}

impl TestServer {
    /// Spawn a server with default limits.
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with(|_| {}).await
    }

    /// Spawn a server after adjusting the default configuration.
    pub async fn spawn_with(configure: impl FnOnce(&mut Config)) -> anyhow::Result<Self> {
        let mut config = Config::default();
        config.server.metrics_port = 0;
        config.listen.address = "127.0.0.1:0".parse()?;
        config.database.path = ":memory:".to_string();
        configure(&mut config);

        let db = Database::new(&config.database.path).await?;
        for &(id, is_public) in USERS {
            db.users()
                .create(&NewUser {
                    id,
                    first_name: id,
                    last_name: "Tester",
                    nickname: id,
                    avatar: "",
                    is_public,
                })
                .await?;
        }
        db.groups().create(GROUP, "Rustaceans", "", "alice").await?;

        let (hub, _registry) = Hub::spawn(config.limits.hub_commands);
        let authenticator = auth::from_config(&config.auth, db.clone());
        let ctx = ServerContext {
            hub: hub.clone(),
            db: db.clone(),
            config: Arc::new(config),
        };
        let gateway = Gateway::bind(ctx, authenticator).await?;
        let addr = gateway.local_addr()?;

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(gateway.run(shutdown.clone()));

        Ok(Self {
            addr,
            db,
            hub,
            shutdown,
            gateway: Some(handle),
        })
    }

    /// WebSocket URL of the hub endpoint.
    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// URL with an arbitrary path, for handshake rejection tests.
    #[allow(dead_code)]
    pub fn url_with_path(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Wait until `user_id` is registered (or not) with the hub.
    #[allow(dead_code)]
    pub async fn wait_online(&self, user_id: &str, online: bool) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        while self.hub.is_online(user_id) != online {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("{user_id} never became online={online}");
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        Ok(())
    }

    /// Stop accepting and disconnect everyone.
    #[allow(dead_code)]
    pub async fn stop(mut self) -> anyhow::Result<()> {
        self.shutdown.cancel();
        let _ = self.hub.shutdown().await;
        if let Some(handle) = self.gateway.take() {
            handle.await??;
        }
        Ok(())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
