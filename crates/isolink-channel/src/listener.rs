use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use isolink_field::Packager;
use isolink_transport::IsoListener;
use tracing::debug;

use crate::config::ChannelConfig;
use crate::error::Result;
use crate::filter::MessageFilter;
use crate::nac::NacChannel;

/// Listens for and accepts incoming channel connections.
///
/// Every accepted connection becomes a connected [`NacChannel`] sharing the
/// listener's header, swap and timeout settings and its packager.
pub struct ChannelListener {
    socket: IsoListener,
    config: ChannelConfig,
    packager: Arc<Packager>,
    incoming: Vec<Arc<dyn MessageFilter>>,
    outgoing: Vec<Arc<dyn MessageFilter>>,
    next_session: AtomicU64,
}

impl ChannelListener {
    /// Bind to `addr` (e.g. `0.0.0.0:8000`).
    pub fn bind(addr: &str, config: ChannelConfig, packager: Arc<Packager>) -> Result<Self> {
        let socket = IsoListener::bind(addr)?;
        Ok(Self {
            socket,
            config,
            packager,
            incoming: Vec::new(),
            outgoing: Vec::new(),
            next_session: AtomicU64::new(1),
        })
    }

    /// Attach an incoming filter to every accepted channel.
    pub fn with_incoming_filter(mut self, filter: Arc<dyn MessageFilter>) -> Self {
        self.incoming.push(filter);
        self
    }

    /// Attach an outgoing filter to every accepted channel.
    pub fn with_outgoing_filter(mut self, filter: Arc<dyn MessageFilter>) -> Self {
        self.outgoing.push(filter);
        self
    }

    /// Accept next connection and assign an auto-generated session name.
    pub fn accept(&self) -> Result<NacChannel> {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        self.accept_with_name(&format!("session-{id}"))
    }

    /// Accept next connection and use an explicit channel name.
    pub fn accept_with_name(&self, name: &str) -> Result<NacChannel> {
        let stream = self.socket.accept()?;
        let peer = stream.peer_addr().ok();

        let mut channel =
            NacChannel::from_stream(name, self.config.clone(), Arc::clone(&self.packager), stream)?;
        for filter in &self.incoming {
            channel = channel.with_incoming_filter(Arc::clone(filter));
        }
        for filter in &self.outgoing {
            channel = channel.with_outgoing_filter(Arc::clone(filter));
        }

        debug!(channel = name, peer = ?peer, "accepted channel");
        Ok(channel)
    }

    /// Bound socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }
}
