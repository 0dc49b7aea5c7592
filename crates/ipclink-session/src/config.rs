use std::time::Duration;

use ipclink_transport::path::DEFAULT_SOCKET_BASE_PATH;

/// Smallest accepted maximum message size.
pub const MIN_MSG_SIZE: u32 = 1024;

/// Default maximum bytes allowed for each message (3 MiB).
pub const DEFAULT_MAX_MSG_SIZE: u32 = 3_145_728;

/// Default pause between dial attempts.
pub const DEFAULT_RETRY_TIMER: Duration = Duration::from_millis(200);

/// Server-side configuration overrides for [`crate::start_server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory the socket file is created in.
    pub socket_base_path: String,
    /// Reserved dial/accept deadline; zero means no timeout.
    pub timeout: Duration,
    /// Maximum message size offered to the client during the handshake.
    /// Values below [`MIN_MSG_SIZE`] reset to the default.
    pub max_msg_size: u32,
    /// Offer encrypted transport in the handshake.
    pub encryption: bool,
    /// Clear the process umask while binding, yielding a world-writable
    /// socket file.
    pub unmask_permissions: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_base_path: DEFAULT_SOCKET_BASE_PATH.to_string(),
            timeout: Duration::ZERO,
            max_msg_size: DEFAULT_MAX_MSG_SIZE,
            encryption: false,
            unmask_permissions: true,
        }
    }
}

impl ServerConfig {
    /// Apply the documented fallbacks for out-of-range fields.
    pub(crate) fn normalized(mut self) -> Self {
        if self.max_msg_size < MIN_MSG_SIZE {
            self.max_msg_size = DEFAULT_MAX_MSG_SIZE;
        }
        if self.socket_base_path.is_empty() {
            self.socket_base_path = DEFAULT_SOCKET_BASE_PATH.to_string();
        }
        self
    }
}

/// Client-side configuration overrides for the dial entry points.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Directory the server's socket file lives in.
    pub socket_base_path: String,
    /// Absolute dial (and reconnect) deadline; zero retries forever.
    pub timeout: Duration,
    /// Pause between dial attempts. Zero resets to the default.
    pub retry_timer: Duration,
    /// Maximum message size this client requires. Zero adopts the server's
    /// negotiated limit.
    pub max_msg_size: u32,
    /// Require encrypted transport; the handshake aborts when the server
    /// offers plain.
    pub encryption: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_base_path: DEFAULT_SOCKET_BASE_PATH.to_string(),
            timeout: Duration::ZERO,
            retry_timer: DEFAULT_RETRY_TIMER,
            max_msg_size: DEFAULT_MAX_MSG_SIZE,
            encryption: false,
        }
    }
}

impl ClientConfig {
    /// Apply the documented fallbacks for out-of-range fields.
    pub(crate) fn normalized(mut self) -> Self {
        if self.retry_timer.is_zero() {
            self.retry_timer = DEFAULT_RETRY_TIMER;
        }
        if self.socket_base_path.is_empty() {
            self.socket_base_path = DEFAULT_SOCKET_BASE_PATH.to_string();
        }
        self
    }
}
