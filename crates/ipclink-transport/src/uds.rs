use std::io::ErrorKind;
use std::os::fd::AsRawFd;
use std::os::unix::fs::MetadataExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::IpcStream;

/// Unix domain socket listening endpoint.
///
/// Binds a filesystem-path UDS, accepts one connection at a time, and
/// removes the socket file on drop. `shutdown` unblocks a thread parked in
/// [`SocketEndpoint::accept`].
pub struct SocketEndpoint {
    listener: UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

/// Temporarily clears the process umask, restoring the previous mask on
/// drop. With the umask cleared, a freshly bound socket file is
/// world-writable, letting unprivileged peers connect.
struct UmaskGuard {
    previous: libc::mode_t,
}

impl UmaskGuard {
    fn clear() -> Self {
        // SAFETY: umask only swaps the process file-mode creation mask.
        let previous = unsafe { libc::umask(0) };
        Self { previous }
    }
}

impl Drop for UmaskGuard {
    fn drop(&mut self) {
        // SAFETY: restores the mask captured in `clear`.
        unsafe {
            libc::umask(self.previous);
        }
    }
}

impl SocketEndpoint {
    /// Bind and listen on a filesystem-path Unix domain socket.
    ///
    /// Any existing file at `path` is removed first — the previous owner of
    /// the name may have exited without cleanup. When `unmask_permissions`
    /// is set the process umask is cleared for the duration of the bind so
    /// the socket file comes out world-writable.
    pub fn bind(path: impl AsRef<Path>, unmask_permissions: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        match std::fs::remove_file(&path) {
            Ok(()) => debug!(?path, "removed stale socket path"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(TransportError::Bind { path, source: err });
            }
        }

        let listener = {
            let _guard = unmask_permissions.then(UmaskGuard::clear);
            UnixListener::bind(&path).map_err(|err| TransportError::Bind {
                path: path.clone(),
                source: err,
            })?
        };

        let created_inode = std::fs::symlink_metadata(&path)
            .ok()
            .map(|meta| (meta.dev(), meta.ino()));

        info!(?path, "listening on unix domain socket");

        Ok(Self {
            listener,
            path,
            created_inode,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<IpcStream> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!("accepted connection");
        Ok(IpcStream::from_unix(stream))
    }

    /// Shut down the listener, unblocking a pending `accept`.
    ///
    /// Subsequent `accept` calls return an error. The socket file stays on
    /// disk until the endpoint is dropped.
    pub fn shutdown(&self) {
        // SAFETY: the fd is owned by `self.listener` and stays open; a
        // failed shutdown (already shut down) is benign.
        unsafe {
            libc::shutdown(self.listener.as_raw_fd(), libc::SHUT_RDWR);
        }
    }

    /// The path this endpoint is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketEndpoint {
    fn drop(&mut self) {
        // Only remove the path if it is still the socket this endpoint
        // created; a successor may have already rebound the same name.
        if let Some((expected_dev, expected_ino)) = self.created_inode {
            if let Ok(meta) = std::fs::symlink_metadata(&self.path) {
                if meta.dev() == expected_dev && meta.ino() == expected_ino {
                    debug!(path = ?self.path, "cleaning up socket file");
                    let _ = std::fs::remove_file(&self.path);
                }
            }
        }
    }
}

/// Connect to a listening endpoint, retrying until it appears.
///
/// `NotFound` and `ConnectionRefused` mean the server is not up yet; they
/// (and, on Unix, any other dial error) cause a silent sleep of
/// `retry_timer` and another attempt. A non-zero `timeout` bounds the whole
/// loop; when it lapses the dial fails with [`TransportError::DialTimeout`].
pub fn connect_with_retry(
    path: impl AsRef<Path>,
    retry_timer: Duration,
    timeout: Duration,
) -> Result<IpcStream> {
    let path = path.as_ref();
    let start = Instant::now();

    loop {
        if !timeout.is_zero() && start.elapsed() > timeout {
            return Err(TransportError::DialTimeout {
                path: path.to_path_buf(),
                elapsed: start.elapsed(),
            });
        }

        match UnixStream::connect(path) {
            Ok(stream) => {
                debug!(?path, "connected to unix domain socket");
                return Ok(IpcStream::from_unix(stream));
            }
            Err(err)
                if err.kind() == ErrorKind::NotFound
                    || err.kind() == ErrorKind::ConnectionRefused =>
            {
                // Server not up yet.
            }
            Err(err) => {
                debug!(?path, %err, "dial attempt failed, retrying");
            }
        }

        std::thread::sleep(retry_timer);
    }
}

/// Connect once, without retry. Used where the caller owns the retry policy.
pub fn connect(path: impl AsRef<Path>) -> Result<IpcStream> {
    let path = path.as_ref();
    let stream = UnixStream::connect(path).map_err(|err| TransportError::Connect {
        path: path.to_path_buf(),
        source: err,
    })?;
    Ok(IpcStream::from_unix(stream))
}
