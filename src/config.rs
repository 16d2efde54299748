//! Relay configuration

use hexapod_shared::protocol;
use std::time::Duration;

/// Configuration for the relay server
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bind address
    pub host: String,
    /// TCP port (0 picks an ephemeral port)
    pub port: u16,
    /// Per-read timeout before an idle connection is probed
    pub read_timeout: Duration,
    /// Bounded wait of the dispatcher on an empty queue
    pub dispatch_poll: Duration,
    /// Pause after every dispatched command
    pub dispatch_pause: Duration,
    /// Size of a single socket read
    pub read_buffer_size: usize,
    /// How long shutdown waits for each task or connection to wind down
    pub close_grace: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: protocol::DEFAULT_HOST.into(),
            port: protocol::DEFAULT_PORT,
            read_timeout: Duration::from_millis(protocol::READ_TIMEOUT_MS),
            dispatch_poll: Duration::from_millis(protocol::DISPATCH_POLL_MS),
            dispatch_pause: Duration::from_millis(protocol::DISPATCH_PAUSE_MS),
            read_buffer_size: protocol::READ_BUFFER_SIZE,
            close_grace: Duration::from_secs(1),
        }
    }
}

impl RelayConfig {
    /// Configuration bound to the given address, default timings
    pub fn with_address(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// `host:port` as accepted by the resolver
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
