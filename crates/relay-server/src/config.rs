//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `8080`; `0` auto-assigns, used by tests).
    pub port: u16,
    /// Capacity of each hub intake channel (register/unregister/broadcast).
    pub intake_capacity: usize,
    /// Capacity of each client's outbound queue.
    pub outbound_queue_capacity: usize,
    /// How long the fan-out waits on one client's queue before giving up.
    pub enqueue_wait_ms: u64,
    /// Timeout for best-effort system notifications and deferred
    /// unregistrations; dropped (not retried) on expiry.
    pub notify_timeout_ms: u64,
    /// Interval between keepalive pings.
    pub ping_interval_secs: u64,
    /// How long a silent peer is tolerated before the connection is torn
    /// down.
    pub pong_timeout_secs: u64,
    /// Per-frame write timeout.
    pub write_timeout_secs: u64,
    /// Max inbound WebSocket frame size in bytes.
    pub max_frame_size: usize,
    /// Directory served as static files at the router fallback.
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            intake_capacity: 256,
            outbound_queue_capacity: 256,
            enqueue_wait_ms: 100,
            notify_timeout_ms: 1000,
            ping_interval_secs: 30,
            pong_timeout_secs: 90,
            write_timeout_secs: 10,
            max_frame_size: 16 * 1024 * 1024, // 16 MiB
            static_dir: PathBuf::from("static"),
        }
    }
}

impl ServerConfig {
    /// Bounded wait for one fan-out enqueue attempt.
    #[must_use]
    pub fn enqueue_wait(&self) -> Duration {
        Duration::from_millis(self.enqueue_wait_ms)
    }

    /// Timeout for best-effort background sends.
    #[must_use]
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }

    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    #[must_use]
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }

    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}
