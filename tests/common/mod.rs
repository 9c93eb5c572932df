//! Integration test common infrastructure.
//!
//! Provides an in-process hub server backed by an in-memory database, and a
//! WebSocket test client that speaks the JSON envelope protocol.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;
