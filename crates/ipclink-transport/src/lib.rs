//! Local transport endpoints for ipclink.
//!
//! Provides the bidirectional byte stream the upper layers build on:
//! - Unix domain sockets (Linux/macOS)
//! - Named pipes (Windows) — path conventions are defined here, the
//!   concrete binding is not part of this Unix-first tree
//!
//! This is the lowest layer of ipclink. Everything else builds on top of
//! the [`IpcStream`] type provided here.

pub mod error;
pub mod path;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use path::socket_path;
pub use stream::IpcStream;

#[cfg(unix)]
pub use uds::{connect, connect_with_retry, SocketEndpoint};
