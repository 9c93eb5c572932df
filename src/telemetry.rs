//! Telemetry utilities for handler timing and span construction.

use std::time::Instant;

/// Guard for timing one handler invocation.
///
/// Records the latency for the message kind when dropped.
pub struct HandlerTimer {
    kind: &'static str,
    start: Instant,
}

impl HandlerTimer {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            start: Instant::now(),
        }
    }
}

impl Drop for HandlerTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_message(self.kind, duration);
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};
    use uuid::Uuid;

    /// Span covering every task of one client connection.
    pub fn connection(user_id: &str, conn_id: Uuid) -> Span {
        info_span!("connection", user_id = %user_id, conn_id = %conn_id)
    }

    /// Span for one handled message.
    pub fn message(kind: &str) -> Span {
        info_span!("message", kind = %kind)
    }
}
