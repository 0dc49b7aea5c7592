//! Endpoint path conventions.
//!
//! A connection is keyed by a short IPC name; the transport maps it to a
//! filesystem path (Unix) or a pipe path (Windows).

use std::path::PathBuf;

/// Default directory for socket files on Unix.
#[cfg(unix)]
pub const DEFAULT_SOCKET_BASE_PATH: &str = "/tmp/";

/// File extension appended to the IPC name on Unix.
#[cfg(unix)]
pub const SOCKET_EXT: &str = ".sock";

/// Default pipe namespace on Windows.
#[cfg(windows)]
pub const DEFAULT_SOCKET_BASE_PATH: &str = r"\\.\pipe\";

/// Security descriptor applied to the pipe when permissions are unmasked
/// on Windows (generic access for authenticated users).
#[cfg(windows)]
pub const UNMASKED_PIPE_SDDL: &str = "D:P(A;;GA;;;AU)";

/// Resolve the endpoint path for an IPC name.
///
/// Unix: `{base}/{name}.sock`. Windows: `{base}{name}`.
pub fn socket_path(base: &str, name: &str) -> PathBuf {
    #[cfg(unix)]
    {
        PathBuf::from(base).join(format!("{name}{SOCKET_EXT}"))
    }
    #[cfg(windows)]
    {
        PathBuf::from(format!("{base}{name}"))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn joins_base_name_and_extension() {
        let path = socket_path("/tmp/", "testing");
        assert_eq!(path, PathBuf::from("/tmp/testing.sock"));
    }

    #[test]
    fn respects_custom_base() {
        let path = socket_path("/run/myapp", "bus");
        assert_eq!(path, PathBuf::from("/run/myapp/bus.sock"));
    }
}
