use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::IsoStream;

/// Client-side TCP connector.
pub struct TcpTransport;

impl TcpTransport {
    /// Resolve `host:port` and connect to the first address that accepts.
    ///
    /// A zero `timeout` falls back to the OS connect timeout.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<IsoStream> {
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|_| TransportError::Resolve {
                host: host.to_string(),
                port,
            })?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            match Self::connect_addr(addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(err) => last_err = Some(err),
            }
        }

        Err(last_err.unwrap_or_else(|| TransportError::Resolve {
            host: host.to_string(),
            port,
        }))
    }

    /// Connect to an already-resolved address.
    pub fn connect_addr(addr: SocketAddr, timeout: Duration) -> Result<IsoStream> {
        let stream = if timeout.is_zero() {
            TcpStream::connect(addr)
        } else {
            TcpStream::connect_timeout(&addr, timeout)
        }
        .map_err(|source| TransportError::Connect { addr, source })?;

        // Small request/response frames: do not let Nagle hold them back.
        stream.set_nodelay(true)?;
        debug!(%addr, "connected");
        Ok(IsoStream::from_tcp(stream))
    }
}

/// TCP listener for the server side of a link.
pub struct IsoListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl IsoListener {
    /// Bind and listen on `addr` (e.g. `127.0.0.1:0`).
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "listening");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<IsoStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nodelay(true)?;
        debug!(%peer, "accepted connection");
        Ok(IsoStream::from_tcp(stream))
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}
