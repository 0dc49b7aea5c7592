//! Connection lifecycle for ipclink.
//!
//! This is the "just works" layer: one server, one client, an
//! authenticated and optionally encrypted typed-message stream between
//! them. The server accepts one connection at a time and re-accepts after
//! a disconnect; the client reconnects on its own.
//!
//! Entry points are [`start_server`] and the [`dial_and_handshake`]
//! family. Messages move through [`Server::write`] / [`Client::read`] and
//! their mirrors; connection state is observed via status callbacks and
//! the `status()` snapshot getters.

pub mod client;
pub mod config;
pub mod error;
pub mod handshake;
pub mod message;
pub mod msg_type;
pub mod name;
pub mod server;
pub mod status;

pub use client::{
    dial_and_handshake, dial_and_handshake_async, dial_and_handshake_with_callback, Client,
};
pub use config::{ClientConfig, ServerConfig, DEFAULT_MAX_MSG_SIZE, MIN_MSG_SIZE};
pub use error::{Result, SessionError};
pub use handshake::{HandshakeReply, IPC_VERSION};
pub use message::{
    IpcMsgType, Message, FINAL_MESSAGE, INITIAL_MESSAGE, INTERMEDIATE_ACTION_MESSAGE,
};
pub use name::{is_valid_ipc_name, validate_ipc_name};
pub use server::{start_server, start_server_with_callback, Server};
pub use status::{ClientStatus, ServerStatus, Status};
