use crate::error::SessionError;
use crate::msg_type;
use crate::status::Status;

/// Well-known application sentinel: last message of a logical exchange.
pub const FINAL_MESSAGE: &str = "°§°finalMessage°§°";

/// Well-known application sentinel: first message of a logical exchange.
pub const INITIAL_MESSAGE: &str = "°§°initialMessage°§°";

/// Well-known application sentinel: intermediate action marker.
pub const INTERMEDIATE_ACTION_MESSAGE: &str = "°§°aaaaandAction°§°";

/// Classifies a [`Message`] as ordinary traffic or library-internal.
///
/// The numeric values are reserved on the wire alongside every other
/// non-positive message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum IpcMsgType {
    ConnectionError = -5,
    OtherError = -4,
    IpcLocal = -3,
    IpcRemote = -2,
    IpcHandshake = -1,
    #[default]
    None = 0,
}

impl IpcMsgType {
    pub fn name(self) -> &'static str {
        match self {
            IpcMsgType::ConnectionError => "ConnectionError",
            IpcMsgType::OtherError => "OtherError",
            IpcMsgType::IpcLocal => "IpcLocalMsg",
            IpcMsgType::IpcRemote => "IpcRemoteMsg",
            IpcMsgType::IpcHandshake => "IpcHandshake",
            IpcMsgType::None => "NoIpcMsg",
        }
    }
}

impl std::fmt::Display for IpcMsgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One received or to-be-sent message.
///
/// Exactly one `Message` is produced per received frame. `msg_type > 0` is
/// user payload; errors injected by the connection machinery carry a
/// non-`None` `err` and an `ipc_type` describing the failure class.
#[derive(Debug, Default)]
pub struct Message {
    /// Details of any error carried by this message.
    pub err: Option<SessionError>,
    /// Non-`None` when this is a library-internal message.
    pub ipc_type: IpcMsgType,
    /// User message type tag; `≤ 0` is reserved.
    pub msg_type: i32,
    /// Connection status snapshot, for internal status messages.
    pub status: Status,
    /// Opaque message data.
    pub data: Vec<u8>,
}

impl Message {
    /// An ordinary user message.
    pub fn new(msg_type: i32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            msg_type,
            data: data.into(),
            ..Self::default()
        }
    }

    /// A string message with the [`msg_type::STRING`] tag.
    pub fn from_string(data: impl Into<String>) -> Self {
        Self::new(msg_type::STRING, data.into().into_bytes())
    }

    /// An error injected by the connection machinery.
    pub fn from_error(err: SessionError) -> Self {
        Self {
            err: Some(err),
            ipc_type: IpcMsgType::OtherError,
            msg_type: msg_type::ERROR,
            ..Self::default()
        }
    }

    /// A connection-level error (the peer or the transport went away).
    pub fn from_connection_error(err: SessionError) -> Self {
        Self {
            err: Some(err),
            ipc_type: IpcMsgType::ConnectionError,
            msg_type: msg_type::ERROR,
            ..Self::default()
        }
    }

    /// A locally generated status notification.
    pub fn local_status(status: impl Into<Status>) -> Self {
        Self {
            ipc_type: IpcMsgType::IpcLocal,
            msg_type: msg_type::STRING,
            status: status.into(),
            ..Self::default()
        }
    }

    /// Message data reinterpreted as UTF-8, lossily.
    pub fn data_as_string(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}
