use std::fmt;
use std::io;

use ipclink_session::SessionError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    let code = match &err {
        SessionError::InvalidName(_) => USAGE,
        SessionError::ReservedMsgType(_) => USAGE,
        SessionError::MessageTooLarge { .. } => DATA_INVALID,
        SessionError::MaxMsgSizeBelowRequested { .. } => DATA_INVALID,
        SessionError::Transport(_) => TRANSPORT_ERROR,
        SessionError::Frame(_) => FAILURE,
        SessionError::Crypto(_) => FAILURE,
        SessionError::Handshake(_) | SessionError::HandshakeRejected(_) => FAILURE,
        SessionError::NotConnected(_) => FAILURE,
        SessionError::QueueClosed | SessionError::Closed => FAILURE,
    };
    let code = if err.is_timeout() { TIMEOUT } else { code };
    CliError::new(code, format!("{context}: {err}"))
}
