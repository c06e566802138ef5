//!
//! TCP transport configuration.
//!
//! ```
//! use std::time::Duration;
//!
//! use cluck_tcp::TcpConfig;
//!
//! let config = TcpConfig {
//!     reconnect_delay: Duration::from_millis(250),
//!     reconnect_backoff: 2.0,
//!     ..Default::default()
//! };
//! ```
//!

use std::time::Duration;

/// TCP transport configuration shared by clients and servers.
#[derive(Clone, Debug)]
pub struct TcpConfig {
    // === Connection ===
    /// How long to wait for a connection and its handshake
    pub connect_timeout: Duration,

    /// Delay before the first reconnection attempt
    pub reconnect_delay: Duration,

    /// Upper bound on the delay between reconnection attempts
    pub max_reconnect_delay: Duration,

    /// Factor the reconnection delay grows by after every failed attempt
    /// (1.0 = constant delay)
    pub reconnect_backoff: f64,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub nodelay: bool,

    // === Framing ===
    /// Largest payload accepted from a peer (anti-OOM protection)
    pub max_message_size: usize,

    /// Messages that may wait for the writer thread before new ones are
    /// dropped
    pub send_queue_size: usize,

    // === Keep-alive ===
    /// Send a keep-alive when nothing else was sent for this long
    pub keepalive_interval: Duration,

    /// Silence after which a peer that sends keep-alives is considered dead
    pub timeout_period: Duration,

    // === Server ===
    /// Connections served at once
    pub max_connections: usize,

    /// Prefix of the link names given to accepted connections
    pub server_link_prefix: String,

    /// How often the server checks for new connections and shutdown
    pub accept_poll_interval: Duration,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(1),
            reconnect_backoff: 1.0,
            nodelay: true,

            max_message_size: 16 * 1024 * 1024, // 16 MB
            send_queue_size: 1024,

            keepalive_interval: Duration::from_millis(200),
            timeout_period: Duration::from_millis(600),

            max_connections: 32,
            server_link_prefix: String::from("client"),
            accept_poll_interval: Duration::from_millis(50),
        }
    }
}

impl TcpConfig {
    /// The delay to wait after a failed attempt that waited `delay`
    pub fn next_reconnect_delay(&self, delay: Duration) -> Duration {
        if self.reconnect_backoff <= 1.0 {
            return self.reconnect_delay;
        }
        delay
            .mul_f64(self.reconnect_backoff)
            .min(self.max_reconnect_delay.max(self.reconnect_delay))
    }
}
