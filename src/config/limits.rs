//! Queue capacity and inbound limit configuration.

use serde::Deserialize;

/// Queue capacities, frame size and inbound rate limits.
///
/// The outbound queue is the backpressure boundary: deliveries to a full queue
/// are dropped rather than stalling the sender.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Per-client outbound queue capacity (default: 256).
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    /// Per-client decoded-envelope queue capacity (default: 100).
    #[serde(default = "default_inbound_queue")]
    pub inbound_queue: usize,
    /// Registry command channel capacity (default: 100).
    #[serde(default = "default_hub_commands")]
    pub hub_commands: usize,
    /// Maximum inbound frame size in bytes (default: 512).
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Sustained inbound messages per second per connection (default: 20).
    #[serde(default = "default_messages_per_second")]
    pub messages_per_second: u32,
    /// Inbound burst allowance per connection (default: 40).
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            outbound_queue: default_outbound_queue(),
            inbound_queue: default_inbound_queue(),
            hub_commands: default_hub_commands(),
            max_frame_bytes: default_max_frame_bytes(),
            messages_per_second: default_messages_per_second(),
            burst: default_burst(),
        }
    }
}

fn default_outbound_queue() -> usize {
    256
}

fn default_inbound_queue() -> usize {
    100
}

fn default_hub_commands() -> usize {
    100
}

fn default_max_frame_bytes() -> usize {
    512
}

fn default_messages_per_second() -> u32 {
    20
}

fn default_burst() -> u32 {
    40
}
