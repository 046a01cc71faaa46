use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr};

use crate::error::Result;

/// A connected stream implementing `Read` and `Write`.
///
/// This is the fundamental I/O type returned by transport operations.
/// Only TCP is wired up today; the inner enum keeps the variant set closed.
pub struct IsoStream {
    inner: IsoStreamInner,
}

enum IsoStreamInner {
    Tcp(std::net::TcpStream),
}

impl Read for IsoStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            IsoStreamInner::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for IsoStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            IsoStreamInner::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            IsoStreamInner::Tcp(stream) => stream.flush(),
        }
    }
}

impl IsoStream {
    /// Create an IsoStream from a TCP stream.
    pub(crate) fn from_tcp(stream: std::net::TcpStream) -> Self {
        Self {
            inner: IsoStreamInner::Tcp(stream),
        }
    }

    /// Set read timeout on the underlying stream.
    ///
    /// `None` blocks indefinitely. A zero duration is treated as `None`.
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        let timeout = timeout.filter(|t| !t.is_zero());
        match &self.inner {
            IsoStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    ///
    /// `None` blocks indefinitely. A zero duration is treated as `None`.
    pub fn set_write_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        let timeout = timeout.filter(|t| !t.is_zero());
        match &self.inner {
            IsoStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            IsoStreamInner::Tcp(stream) => {
                let cloned = stream.try_clone()?;
                Ok(Self::from_tcp(cloned))
            }
        }
    }

    /// Shut down both directions of the connection.
    ///
    /// Unblocks any thread parked in a read on a clone of this stream.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            IsoStreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both).map_err(Into::into),
        }
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        match &self.inner {
            IsoStreamInner::Tcp(stream) => stream.peer_addr().map_err(Into::into),
        }
    }

    /// Address of the local end.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        match &self.inner {
            IsoStreamInner::Tcp(stream) => stream.local_addr().map_err(Into::into),
        }
    }
}

impl std::fmt::Debug for IsoStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            IsoStreamInner::Tcp(stream) => f
                .debug_struct("IsoStream")
                .field("type", &"tcp")
                .field("peer", &stream.peer_addr().ok())
                .finish(),
        }
    }
}
