//! social-hub - real-time connection hub for a social-networking backend.
//!
//! Keeps a registry of live WebSocket clients, routes their typed messages to
//! domain handlers backed by SQLite, and fans server events out to one user, a
//! group, or everyone.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod http;
pub mod hub;
pub mod metrics;
pub mod network;
pub mod protocol;
pub mod security;
pub mod telemetry;
