use std::io::{Read, Write};

use crate::error::Result;

/// A connected IPC byte stream — implements Read + Write.
///
/// On Unix this wraps a Unix domain socket stream. Exactly one reader and
/// one writer operate on a stream at a time; [`IpcStream::try_clone`]
/// produces the second handle for the opposite direction.
pub struct IpcStream {
    inner: IpcStreamInner,
}

enum IpcStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for IpcStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for IpcStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl IpcStream {
    /// Create an IpcStream from a Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: IpcStreamInner::Unix(stream),
        }
    }

    /// Try to clone this stream (creates a new file descriptor sharing the
    /// same underlying connection).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => {
                let cloned = stream.try_clone()?;
                Ok(Self::from_unix(cloned))
            }
        }
    }

    /// Shut down both directions of the connection.
    ///
    /// Unblocks any thread blocked in a read or write on this stream or on
    /// a clone of it. This is the cancellation primitive `close` relies on.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => {
                match stream.shutdown(std::net::Shutdown::Both) {
                    Ok(()) => Ok(()),
                    // Already closed by the peer.
                    Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                    Err(err) => Err(err.into()),
                }
            }
        }
    }
}

impl std::fmt::Debug for IpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(_) => f.debug_struct("IpcStream").field("type", &"unix").finish(),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn clone_shares_connection() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let stream = IpcStream::from_unix(left);
        let mut clone = stream.try_clone().unwrap();
        let mut peer = IpcStream::from_unix(right);

        clone.write_all(b"via clone").unwrap();
        let mut buf = [0u8; 9];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"via clone");
    }

    #[test]
    fn shutdown_unblocks_reader() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let stream = IpcStream::from_unix(left);
        let mut reader = stream.try_clone().unwrap();
        let _peer = IpcStream::from_unix(right);

        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 1];
            reader.read(&mut buf)
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        stream.shutdown().unwrap();

        let res = handle.join().unwrap();
        // Either clean EOF (Ok(0)) or an error; never a hang.
        match res {
            Ok(n) => assert_eq!(n, 0),
            Err(_) => {}
        }
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let stream = IpcStream::from_unix(left);
        stream.shutdown().unwrap();
        stream.shutdown().unwrap();
    }
}
