//! Server side of the connection lifecycle.
//!
//! `start_server` binds the endpoint and spawns the long-lived tasks: an
//! accept loop, a single writer pump draining the outgoing queue through a
//! swappable writer slot, and a status drain. A reader pump is spawned per
//! accepted connection and ends with it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use ipclink_frame::{FrameError, FrameReader, FrameWriter};
use ipclink_transport::{socket_path, IpcStream, SocketEndpoint};
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::error::{Result, SessionError};
use crate::handshake::server_handshake;
use crate::message::Message;
use crate::name::validate_ipc_name;
use crate::status::{ServerStatus, Status, StatusCell};

const STATUS_QUEUE_DEPTH: usize = 16;
const INCOMING_QUEUE_DEPTH: usize = 1;

/// The server half of an IPC connection.
///
/// Serves one client at a time; after a disconnect the accept loop takes
/// the next connection on the same endpoint.
pub struct Server {
    shared: Arc<ServerShared>,
    incoming: Mutex<Receiver<Message>>,
    outgoing: Mutex<Option<SyncSender<Message>>>,
}

struct ServerShared {
    name: String,
    conf: ServerConfig,
    endpoint: SocketEndpoint,
    status: StatusCell<ServerStatus>,
    status_tx: SyncSender<ServerStatus>,
    /// Shutdown handle for the active connection. Held separately from the
    /// writer so `close` never waits behind a blocked write.
    conn: Mutex<Option<IpcStream>>,
    writer: Mutex<Option<FrameWriter<IpcStream>>>,
    incoming_tx: Mutex<Option<SyncSender<Message>>>,
    connection_count: AtomicU32,
}

/// Start the IPC server.
///
/// Binds the endpoint for `name`, transitions to `Listening`, and begins
/// accepting in the background. The returned server is ready for
/// [`Server::read`] as soon as a client completes its handshake.
pub fn start_server(name: &str, config: Option<ServerConfig>) -> Result<Server> {
    start_server_with_callback(name, config, |_| {})
}

/// Like [`start_server`], invoking `on_status` for every status transition.
pub fn start_server_with_callback(
    name: &str,
    config: Option<ServerConfig>,
    on_status: impl Fn(ServerStatus) + Send + 'static,
) -> Result<Server> {
    validate_ipc_name(name)?;
    let conf = config.unwrap_or_default().normalized();

    let path = socket_path(&conf.socket_base_path, name);
    let endpoint = SocketEndpoint::bind(&path, conf.unmask_permissions)?;

    let (status_tx, status_rx) = sync_channel(STATUS_QUEUE_DEPTH);
    let (incoming_tx, incoming_rx) = sync_channel(INCOMING_QUEUE_DEPTH);
    let (outgoing_tx, outgoing_rx) = sync_channel(0);

    let shared = Arc::new(ServerShared {
        name: name.to_string(),
        conf,
        endpoint,
        status: StatusCell::new(ServerStatus::NotConnected),
        status_tx,
        conn: Mutex::new(None),
        writer: Mutex::new(None),
        incoming_tx: Mutex::new(Some(incoming_tx)),
        connection_count: AtomicU32::new(0),
    });

    thread::spawn(move || run_status_drain(status_rx, on_status));

    shared.transition(ServerStatus::Listening);

    let writer_shared = Arc::clone(&shared);
    thread::spawn(move || run_writer_pump(writer_shared, outgoing_rx));

    let accept_shared = Arc::clone(&shared);
    thread::spawn(move || run_accept_loop(accept_shared));

    Ok(Server {
        shared,
        incoming: Mutex::new(incoming_rx),
        outgoing: Mutex::new(Some(outgoing_tx)),
    })
}

impl Server {
    /// Receive the next message, blocking until one arrives.
    ///
    /// Returns an error when the incoming queue has been closed or when the
    /// message carries a connection or decryption failure; reading an error
    /// closes both queues.
    pub fn read(&self) -> Result<Message> {
        let received = {
            let incoming = lock(&self.incoming);
            incoming.recv()
        };

        match received {
            Ok(msg) => match msg.err {
                Some(err) => {
                    *lock(&self.shared.incoming_tx) = None;
                    *lock(&self.outgoing) = None;
                    Err(err)
                }
                None => Ok(msg),
            },
            Err(_) => Err(SessionError::QueueClosed),
        }
    }

    /// Queue a message for the connected client.
    ///
    /// `msg_type` must be positive; data is bounded by the configured
    /// maximum; the connection must be established.
    pub fn write(&self, msg_type: i32, data: &[u8]) -> Result<()> {
        if msg_type <= 0 {
            return Err(SessionError::ReservedMsgType(msg_type));
        }

        let max = self.shared.conf.max_msg_size as usize;
        if data.len() > max {
            return Err(SessionError::MessageTooLarge {
                size: data.len(),
                max,
            });
        }

        let status = self.shared.status.load();
        if status != ServerStatus::Connected {
            return Err(SessionError::NotConnected(Status::Server(status)));
        }

        let tx = lock(&self.outgoing).clone();
        match tx {
            Some(tx) => tx
                .send(Message::new(msg_type, data.to_vec()))
                .map_err(|_| SessionError::QueueClosed),
            None => Err(SessionError::QueueClosed),
        }
    }

    /// Best-effort snapshot of the current connection status.
    pub fn status(&self) -> ServerStatus {
        self.shared.status.load()
    }

    /// The IPC name this server was started with.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// How many client connections have been accepted over the server's
    /// lifetime.
    pub fn connection_count(&self) -> u32 {
        self.shared.connection_count.load(Ordering::Relaxed)
    }

    /// Close the server: stop accepting, drop the active connection, and
    /// close both message queues.
    pub fn close(&self) {
        let status = self.shared.status.load();
        if matches!(status, ServerStatus::Closing | ServerStatus::Closed) {
            return;
        }

        let had_connection = lock(&self.shared.conn).is_some();

        self.shared.transition(ServerStatus::Closing);
        self.shared.endpoint.shutdown();

        if let Some(conn) = lock(&self.shared.conn).as_ref() {
            let _ = conn.shutdown();
        }

        if let Some(tx) = lock(&self.shared.incoming_tx).take() {
            // Park the sentinel if there is room; a closed queue reports
            // the same condition to a later read.
            let _ = tx.try_send(Message::from_connection_error(SessionError::Closed));
        }
        *lock(&self.outgoing) = None;

        if !had_connection {
            // No reader pump exists to perform the Closing -> Closed step.
            self.shared.transition(ServerStatus::Closed);
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.shared.name)
            .field("status", &self.shared.status.load())
            .finish_non_exhaustive()
    }
}

impl ServerShared {
    fn transition(&self, status: ServerStatus) {
        self.status.store(status);
        match self.status_tx.try_send(status) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(status = %status, "status queue full, dropping transition")
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Deliver a message to the incoming queue. Returns false when the
    /// queue is gone and the pump should stop.
    fn push_incoming(&self, msg: Message) -> bool {
        let tx = lock(&self.incoming_tx).clone();
        match tx {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }
}

fn run_status_drain(
    status_rx: Receiver<ServerStatus>,
    on_status: impl Fn(ServerStatus) + Send + 'static,
) {
    for status in status_rx.iter() {
        debug!(status = %status, "server status changed");
        on_status(status);
    }
}

fn run_accept_loop(shared: Arc<ServerShared>) {
    loop {
        let mut stream = match shared.endpoint.accept() {
            Ok(stream) => stream,
            Err(err) => {
                debug!(%err, "accept loop ending");
                break;
            }
        };

        let status = shared.status.load();
        if !matches!(
            status,
            ServerStatus::Listening | ServerStatus::Disconnected
        ) {
            debug!(status = %status, "dropping connection attempt while not accepting");
            continue;
        }

        debug!("client connected, initiating handshake");
        match server_handshake(&mut stream, shared.conf.encryption, shared.conf.max_msg_size) {
            Ok(outcome) => {
                let cloned = stream.try_clone().and_then(|reader| {
                    stream.try_clone().map(|shutdown_handle| (reader, shutdown_handle))
                });
                let (reader_stream, shutdown_handle) = match cloned {
                    Ok(streams) => streams,
                    Err(err) => {
                        warn!(%err, "failed to split accepted connection");
                        shared.transition(ServerStatus::Error);
                        shared.endpoint.shutdown();
                        break;
                    }
                };

                *lock(&shared.conn) = Some(shutdown_handle);
                *lock(&shared.writer) = Some(FrameWriter::new(
                    stream,
                    outcome.cipher.clone(),
                    outcome.max_msg_size,
                ));

                shared.connection_count.fetch_add(1, Ordering::Relaxed);
                shared.transition(ServerStatus::Connected);

                let reader =
                    FrameReader::new(reader_stream, outcome.cipher, outcome.max_msg_size);
                let reader_shared = Arc::clone(&shared);
                thread::spawn(move || run_reader_pump(reader_shared, reader));
            }
            Err(err) => {
                warn!(%err, "server handshake failed");
                shared.transition(ServerStatus::Error);
                shared.endpoint.shutdown();
                let _ = stream.shutdown();
                break;
            }
        }
    }
}

fn run_reader_pump(shared: Arc<ServerShared>, mut reader: FrameReader<IpcStream>) {
    let next_status = loop {
        match reader.read_message() {
            Ok(msg) if msg.msg_type < 0 => {
                // Reserved for future control traffic.
                debug!(msg_type = msg.msg_type, "dropping reserved inbound message");
            }
            Ok(msg) => {
                if !shared.push_incoming(Message::new(msg.msg_type, msg.data.to_vec())) {
                    break None;
                }
            }
            Err(FrameError::Crypto(err)) => {
                debug!(%err, "dropping undecryptable frame");
                if !shared.push_incoming(Message::from_error(err.into())) {
                    break None;
                }
            }
            Err(FrameError::ConnectionClosed) => {
                if shared.status.load() == ServerStatus::Closing {
                    break Some(ServerStatus::Closed);
                }
                break Some(ServerStatus::Disconnected);
            }
            Err(err) => {
                if shared.status.load() == ServerStatus::Closing {
                    break Some(ServerStatus::Closed);
                }
                debug!(%err, "server read error, dropping connection");
                break Some(ServerStatus::Disconnected);
            }
        }
    };

    // Release the connection before publishing the transition that lets
    // the accept loop install the next one.
    if let Some(conn) = lock(&shared.conn).take() {
        let _ = conn.shutdown();
    }

    if let Some(status) = next_status {
        shared.transition(status);
    }
}

fn run_writer_pump(shared: Arc<ServerShared>, outgoing: Receiver<Message>) {
    while let Ok(msg) = outgoing.recv() {
        let mut slot = lock(&shared.writer);
        match slot.as_mut() {
            Some(writer) => {
                if let Err(err) = writer.send(msg.msg_type, &msg.data) {
                    debug!(%err, "server write failed, dropping message");
                }
            }
            None => debug!("no active connection, dropping outbound message"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
