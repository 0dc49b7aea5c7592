//! Client side of the connection lifecycle.
//!
//! Three ways in: [`dial_and_handshake`] blocks until connected and starts
//! the message pumps; [`dial_and_handshake_with_callback`] does the same
//! with a status subscriber; [`dial_and_handshake_async`] returns at once
//! and dials in the background — the caller watches the callback and then
//! calls [`Client::start_processing_messages`].
//!
//! When the peer goes away the reader pump triggers a reconnect with the
//! same retry policy as the initial dial; the writer pump keeps running
//! against the swappable writer slot.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use ipclink_frame::{FrameError, FrameReader, FrameWriter};
use ipclink_transport::{connect_with_retry, socket_path, IpcStream, TransportError};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{Result, SessionError};
use crate::handshake::client_handshake;
use crate::message::Message;
use crate::name::validate_ipc_name;
use crate::status::{ClientStatus, Status, StatusCell};

const STATUS_QUEUE_DEPTH: usize = 16;
const INCOMING_QUEUE_DEPTH: usize = 1;

/// The client half of an IPC connection.
pub struct Client {
    shared: Arc<ClientShared>,
    incoming: Mutex<Receiver<Message>>,
    outgoing: Mutex<Option<SyncSender<Message>>>,
    outgoing_rx: Mutex<Option<Receiver<Message>>>,
}

struct ClientShared {
    name: String,
    conf: ClientConfig,
    status: StatusCell<ClientStatus>,
    status_tx: SyncSender<ClientStatus>,
    max_msg_size: AtomicU32,
    /// Shutdown handle for the active connection. Held separately from the
    /// writer so `close` never waits behind a blocked write.
    conn: Mutex<Option<IpcStream>>,
    writer: Mutex<Option<FrameWriter<IpcStream>>>,
    reader_slot: Mutex<Option<FrameReader<IpcStream>>>,
    incoming_tx: Mutex<Option<SyncSender<Message>>>,
}

/// Dial the server and return once connected (or failed), with the message
/// pumps running.
pub fn dial_and_handshake(name: &str, config: Option<ClientConfig>) -> Result<Client> {
    dial_and_handshake_with_callback(name, config, |_| {})
}

/// Like [`dial_and_handshake`], invoking `on_status` for every status
/// transition.
pub fn dial_and_handshake_with_callback(
    name: &str,
    config: Option<ClientConfig>,
    on_status: impl Fn(ClientStatus) + Send + 'static,
) -> Result<Client> {
    let client = create_client(name, config, on_status)?;
    client.shared.dial()?;
    client.start_processing_messages()?;
    Ok(client)
}

/// Dial in the background and return immediately.
///
/// Subscribe through `on_status` to observe the dial completing, then call
/// [`Client::start_processing_messages`].
pub fn dial_and_handshake_async(
    name: &str,
    config: Option<ClientConfig>,
    on_status: impl Fn(ClientStatus) + Send + 'static,
) -> Result<Client> {
    let client = create_client(name, config, on_status)?;
    let shared = Arc::clone(&client.shared);
    thread::spawn(move || {
        let _ = shared.dial();
    });
    debug!("client dialing in background");
    Ok(client)
}

fn create_client(
    name: &str,
    config: Option<ClientConfig>,
    on_status: impl Fn(ClientStatus) + Send + 'static,
) -> Result<Client> {
    validate_ipc_name(name)?;
    let conf = config.unwrap_or_default().normalized();

    let (status_tx, status_rx) = sync_channel(STATUS_QUEUE_DEPTH);
    let (incoming_tx, incoming_rx) = sync_channel(INCOMING_QUEUE_DEPTH);
    let (outgoing_tx, outgoing_rx) = sync_channel(0);

    thread::spawn(move || run_status_drain(status_rx, on_status));

    let max_msg_size = conf.max_msg_size;
    let shared = Arc::new(ClientShared {
        name: name.to_string(),
        conf,
        status: StatusCell::new(ClientStatus::NotConnected),
        status_tx,
        max_msg_size: AtomicU32::new(max_msg_size),
        conn: Mutex::new(None),
        writer: Mutex::new(None),
        reader_slot: Mutex::new(None),
        incoming_tx: Mutex::new(Some(incoming_tx)),
    });

    Ok(Client {
        shared,
        incoming: Mutex::new(incoming_rx),
        outgoing: Mutex::new(Some(outgoing_tx)),
        outgoing_rx: Mutex::new(Some(outgoing_rx)),
    })
}

impl Client {
    /// Spawn the reader and writer pumps. Requires the dial to have
    /// completed; idempotent afterwards.
    pub fn start_processing_messages(&self) -> Result<()> {
        let status = self.shared.status.load();
        if status != ClientStatus::Connected {
            return Err(SessionError::NotConnected(Status::Client(status)));
        }

        if let Some(reader) = lock(&self.shared.reader_slot).take() {
            let shared = Arc::clone(&self.shared);
            thread::spawn(move || run_reader_pump(shared, reader));
        }

        if let Some(outgoing_rx) = lock(&self.outgoing_rx).take() {
            let shared = Arc::clone(&self.shared);
            thread::spawn(move || run_writer_pump(shared, outgoing_rx));
        }

        Ok(())
    }

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

    /// Queue a message for the server.
    ///
    /// `msg_type` must be positive; the connection must be established;
    /// data is bounded by the negotiated maximum.
    pub fn write(&self, msg_type: i32, data: &[u8]) -> Result<()> {
        if msg_type <= 0 {
            return Err(SessionError::ReservedMsgType(msg_type));
        }

        let status = self.shared.status.load();
        if status != ClientStatus::Connected {
            return Err(SessionError::NotConnected(Status::Client(status)));
        }

        let max = self.shared.max_msg_size.load(Ordering::Relaxed) as usize;
        if data.len() > max {
            return Err(SessionError::MessageTooLarge {
                size: data.len(),
                max,
            });
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
    pub fn status(&self) -> ClientStatus {
        self.shared.status.load()
    }

    /// The IPC name this client dials.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The message size limit agreed with the server.
    pub fn max_msg_size(&self) -> u32 {
        self.shared.max_msg_size.load(Ordering::Relaxed)
    }

    /// Close the connection; the pumps observe this and terminate.
    pub fn close(&self) {
        let status = self.shared.status.load();
        if matches!(status, ClientStatus::Closing | ClientStatus::Closed) {
            return;
        }

        let had_connection = lock(&self.shared.conn).is_some();

        self.shared.transition(ClientStatus::Closing);

        if let Some(conn) = lock(&self.shared.conn).as_ref() {
            let _ = conn.shutdown();
        }

        *lock(&self.shared.incoming_tx) = None;
        *lock(&self.outgoing) = None;

        if !had_connection {
            self.shared.transition(ClientStatus::Closed);
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.shared.name)
            .field("status", &self.shared.status.load())
            .finish_non_exhaustive()
    }
}

impl ClientShared {
    fn transition(&self, status: ClientStatus) {
        self.status.store(status);
        match self.status_tx.try_send(status) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(status = %status, "status queue full, dropping transition")
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn push_incoming(&self, msg: Message) -> bool {
        let tx = lock(&self.incoming_tx).clone();
        match tx {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }

    /// Dial and handshake, driving the status transitions for the initial
    /// connect.
    fn dial(&self) -> Result<()> {
        debug!(name = %self.name, "client dialing server");
        self.transition(ClientStatus::Connecting);

        match self.connect_and_handshake() {
            Ok(()) => {
                self.transition(ClientStatus::Connected);
                Ok(())
            }
            Err(err) => {
                warn!(%err, "client dial failed");
                if err.is_timeout() {
                    self.transition(ClientStatus::Timeout);
                } else {
                    self.transition(ClientStatus::Error);
                }
                Err(err)
            }
        }
    }

    /// Establish the transport connection, run the handshake, and install
    /// the reader and writer for the new connection.
    fn connect_and_handshake(&self) -> Result<()> {
        let path = socket_path(&self.conf.socket_base_path, &self.name);

        let mut stream =
            match connect_with_retry(&path, self.conf.retry_timer, self.conf.timeout) {
                Ok(stream) => stream,
                Err(err @ TransportError::DialTimeout { .. }) => {
                    // The dialer parks the state machine before the timeout
                    // status is published by the caller.
                    self.transition(ClientStatus::Closed);
                    return Err(err.into());
                }
                Err(err) => return Err(err.into()),
            };

        let outcome = client_handshake(&mut stream, self.conf.encryption, self.conf.max_msg_size)?;
        self.max_msg_size
            .store(outcome.max_msg_size, Ordering::Relaxed);

        let reader_stream = stream.try_clone()?;
        let shutdown_handle = stream.try_clone()?;
        *lock(&self.conn) = Some(shutdown_handle);
        *lock(&self.writer) = Some(FrameWriter::new(
            stream,
            outcome.cipher.clone(),
            outcome.max_msg_size,
        ));
        *lock(&self.reader_slot) = Some(FrameReader::new(
            reader_stream,
            outcome.cipher,
            outcome.max_msg_size,
        ));

        Ok(())
    }

    /// Re-establish a dropped connection with the initial dial policy, then
    /// respawn the reader pump. The writer pump keeps running against the
    /// swapped writer slot.
    fn reconnect(self: Arc<Self>) {
        self.transition(ClientStatus::NotConnected);
        self.transition(ClientStatus::Reconnecting);

        match self.connect_and_handshake() {
            Ok(()) => {
                self.transition(ClientStatus::Connected);
                if let Some(reader) = lock(&self.reader_slot).take() {
                    let shared = Arc::clone(&self);
                    thread::spawn(move || run_reader_pump(shared, reader));
                }
            }
            Err(err) => {
                warn!(%err, "client reconnect failed");
                if err.is_timeout() {
                    self.transition(ClientStatus::Timeout);
                } else {
                    self.transition(ClientStatus::Error);
                }
            }
        }
    }
}

fn run_status_drain(
    status_rx: Receiver<ClientStatus>,
    on_status: impl Fn(ClientStatus) + Send + 'static,
) {
    for status in status_rx.iter() {
        debug!(status = %status, "client status changed");
        on_status(status);
    }
}

enum PumpExit {
    QueueGone,
    Closed,
    Reconnect,
}

fn run_reader_pump(shared: Arc<ClientShared>, mut reader: FrameReader<IpcStream>) {
    let exit = loop {
        match reader.read_message() {
            Ok(msg) if msg.msg_type < 0 => {
                // Reserved for future control traffic.
                debug!(msg_type = msg.msg_type, "dropping reserved inbound message");
            }
            Ok(msg) => {
                if !shared.push_incoming(Message::new(msg.msg_type, msg.data.to_vec())) {
                    break PumpExit::QueueGone;
                }
            }
            Err(FrameError::Crypto(err)) => {
                debug!(%err, "dropping undecryptable frame");
                if !shared.push_incoming(Message::from_error(err.into())) {
                    break PumpExit::QueueGone;
                }
            }
            Err(FrameError::ConnectionClosed) => {
                if shared.status.load() == ClientStatus::Closing {
                    break PumpExit::Closed;
                }
                break PumpExit::Reconnect;
            }
            Err(err) => {
                if shared.status.load() == ClientStatus::Closing {
                    break PumpExit::Closed;
                }
                // A dead connection without a clean EOF still warrants
                // recovery rather than stranding the client.
                debug!(%err, "client read error");
                shared.transition(ClientStatus::Error);
                break PumpExit::Reconnect;
            }
        }
    };

    // Drop the dead connection before a reconnect installs a fresh one.
    if let Some(conn) = lock(&shared.conn).take() {
        let _ = conn.shutdown();
    }

    match exit {
        PumpExit::Closed => shared.transition(ClientStatus::Closed),
        PumpExit::Reconnect => {
            let reconnecting = Arc::clone(&shared);
            thread::spawn(move || reconnecting.reconnect());
        }
        PumpExit::QueueGone => {}
    }
}

fn run_writer_pump(shared: Arc<ClientShared>, outgoing: Receiver<Message>) {
    while let Ok(msg) = outgoing.recv() {
        let mut slot = lock(&shared.writer);
        match slot.as_mut() {
            Some(writer) => {
                if let Err(err) = writer.send(msg.msg_type, &msg.data) {
                    debug!(%err, "client write failed, dropping message");
                }
            }
            None => debug!("no active connection, dropping outbound message"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
