use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use isolink_field::{Message, Packager};
use isolink_frame::{
    parse_header, write_header, FrameConfig, FrameError, FrameReader, FrameWriter, MAX_FRAME_LENGTH,
};
use isolink_transport::{IsoStream, TcpTransport};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::channel::IsoChannel;
use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::filter::MessageFilter;

/// Client channel speaking the 2-byte length + TPDU framing.
///
/// The read half, write half and a control handle of the socket sit behind
/// separate locks: a receive blocked on the socket never holds up `send`,
/// and `disconnect` shuts the socket down through the control handle to
/// release that receive.
pub struct NacChannel {
    name: String,
    config: ChannelConfig,
    packager: Arc<Packager>,
    header: Option<Vec<u8>>,
    incoming: Vec<Arc<dyn MessageFilter>>,
    outgoing: Vec<Arc<dyn MessageFilter>>,
    reader: Mutex<Option<FrameReader<IsoStream>>>,
    writer: Mutex<Option<FrameWriter<IsoStream>>>,
    control: Mutex<Option<IsoStream>>,
    connected: AtomicBool,
}

impl NacChannel {
    /// Create a disconnected channel.
    ///
    /// Fails when the configured header is not a decimal-digit string or the
    /// max packet length does not fit the 2-byte length prefix.
    pub fn new(
        name: impl Into<String>,
        config: ChannelConfig,
        packager: Arc<Packager>,
    ) -> Result<Self> {
        if config.max_packet_length > MAX_FRAME_LENGTH {
            return Err(FrameError::LengthOutOfRange {
                len: config.max_packet_length,
                max: MAX_FRAME_LENGTH,
            }
            .into());
        }
        let header = config.header.as_deref().map(parse_header).transpose()?;
        Ok(Self {
            name: name.into(),
            config,
            packager,
            header,
            incoming: Vec::new(),
            outgoing: Vec::new(),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            control: Mutex::new(None),
            connected: AtomicBool::new(false),
        })
    }

    /// Create a channel around an already-connected stream.
    pub fn from_stream(
        name: impl Into<String>,
        config: ChannelConfig,
        packager: Arc<Packager>,
        stream: IsoStream,
    ) -> Result<Self> {
        let channel = Self::new(name, config, packager)?;
        channel.install(stream)?;
        Ok(channel)
    }

    /// Replace the default header with the packed form of `digits`.
    pub fn set_header(&mut self, digits: &str) -> Result<()> {
        self.header = Some(parse_header(digits)?);
        Ok(())
    }

    /// Default header written when a message carries none.
    pub fn header(&self) -> Option<&[u8]> {
        self.header.as_deref()
    }

    /// Add a filter run on every received message.
    pub fn with_incoming_filter(mut self, filter: Arc<dyn MessageFilter>) -> Self {
        self.incoming.push(filter);
        self
    }

    /// Add a filter run on every message before it is packed.
    pub fn with_outgoing_filter(mut self, filter: Arc<dyn MessageFilter>) -> Self {
        self.outgoing.push(filter);
        self
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn packager(&self) -> &Arc<Packager> {
        &self.packager
    }

    fn frame_config(&self) -> FrameConfig {
        let timeout = self.config.socket_timeout();
        FrameConfig {
            header_len: self.header.as_ref().map_or(0, Vec::len),
            max_packet_length: self.config.max_packet_length,
            read_timeout: timeout,
            write_timeout: timeout,
        }
    }

    fn install(&self, stream: IsoStream) -> Result<()> {
        let frame_config = self.frame_config();
        let control = stream.try_clone()?;
        let reader = FrameReader::with_config_stream(stream.try_clone()?, frame_config.clone())?;
        let writer = FrameWriter::with_config_stream(stream, frame_config)?;

        *self.reader.lock() = Some(reader);
        *self.writer.lock() = Some(writer);
        *self.control.lock() = Some(control);
        self.connected.store(true, Ordering::Release);
        Ok(())
    }
}

impl IsoChannel for NacChannel {
    fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        let stream = TcpTransport::connect(
            &self.config.host,
            self.config.port,
            self.config.connect_timeout(),
        )?;
        self.install(stream)?;
        debug!(
            channel = %self.name,
            host = %self.config.host,
            port = self.config.port,
            "channel connected"
        );
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        let was_connected = self.connected.swap(false, Ordering::AcqRel);

        let shutdown = match self.control.lock().take() {
            Some(control) => control.shutdown(),
            None => Ok(()),
        };
        self.writer.lock().take();
        // A blocked receive holds the reader lock; it drops the reader itself
        // once the shutdown wakes it.
        if let Some(mut reader) = self.reader.try_lock() {
            reader.take();
        }

        if was_connected {
            debug!(channel = %self.name, "channel disconnected");
        }
        match shutdown {
            Err(isolink_transport::TransportError::Io(err))
                if err.kind() == std::io::ErrorKind::NotConnected =>
            {
                Ok(())
            }
            other => other.map_err(Into::into),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn send(&self, msg: &mut Message) -> Result<()> {
        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }
        for filter in &self.outgoing {
            filter.filter(msg)?;
        }
        let body = self.packager.pack(msg).map_err(ChannelError::Pack)?;

        // Swap a copy; the message keeps its header until the frame is out,
        // so a retry after a failed write swaps from the same starting point.
        let mut swapped = msg.header().map(<[u8]>::to_vec);
        let mut header = BytesMut::new();
        write_header(
            &mut header,
            swapped.as_deref_mut(),
            self.header.as_deref(),
            self.config.tpdu_swap,
        );
        let size = header.len() + body.len();
        if size > self.config.max_packet_length {
            return Err(ChannelError::Oversize {
                size,
                max: self.config.max_packet_length,
            });
        }

        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or(ChannelError::NotConnected)?;
        writer.send(&header, &body)?;
        drop(guard);
        if swapped.is_some() {
            msg.set_header(swapped);
        }
        trace!(channel = %self.name, size, "sent message");
        Ok(())
    }

    fn receive(&self) -> Result<Message> {
        let frame = {
            let mut guard = self.reader.lock();
            let reader = guard.as_mut().ok_or(ChannelError::NotConnected)?;
            match reader.read_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    if !self.is_connected() {
                        guard.take();
                    }
                    return Err(err.into());
                }
            }
        };

        let mut msg = self.packager.unpack(&frame.body).map_err(ChannelError::Unpack)?;
        if !frame.header.is_empty() {
            msg.set_header(Some(frame.header.to_vec()));
        }
        for filter in &self.incoming {
            filter.filter(&mut msg)?;
        }
        trace!(channel = %self.name, size = frame.body.len(), "received message");
        Ok(msg)
    }

    fn send_keep_alive(&self) -> Result<()> {
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or(ChannelError::NotConnected)?;
        writer.send_keep_alive()?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for NacChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NacChannel")
            .field("name", &self.name)
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use isolink_field::FieldCodec;

    use super::*;
    use crate::error::{Disposition, FaultKind};
    use crate::filter::FilterVeto;
    use crate::listener::ChannelListener;

    fn packager() -> Arc<Packager> {
        Arc::new(
            Packager::new()
                .with_field(0, FieldCodec::fixed_hex(2, "MTI"))
                .unwrap()
                .with_field(11, FieldCodec::fixed_hex(3, "STAN"))
                .unwrap()
                .with_field(55, FieldCodec::lll_binary(255, "ICC data").unwrap())
                .unwrap(),
        )
    }

    fn config(port: u16) -> ChannelConfig {
        ChannelConfig {
            header: Some("6000010002".to_string()),
            timeout: 5_000,
            ..ChannelConfig::new("127.0.0.1", port)
        }
    }

    fn listener() -> ChannelListener {
        ChannelListener::bind("127.0.0.1:0", config(0), packager()).unwrap()
    }

    fn echo_request() -> Message {
        Message::new()
            .with_field(0, vec![0x08, 0x00])
            .with_field(11, vec![0x00, 0x00, 0x01])
    }

    #[test]
    fn new_parses_header_digits() {
        let channel = NacChannel::new("c", config(1), packager()).unwrap();
        assert_eq!(channel.header(), Some(&[0x60, 0x00, 0x01, 0x00, 0x02][..]));
        assert!(!channel.is_connected());
    }

    #[test]
    fn new_rejects_non_digit_header() {
        let cfg = ChannelConfig {
            header: Some("60000G0000".to_string()),
            ..ChannelConfig::default()
        };
        let err = NacChannel::new("c", cfg, packager()).unwrap_err();
        assert!(matches!(err, ChannelError::Frame(FrameError::InvalidHeader(_))));
    }

    #[test]
    fn set_header_replaces_default() {
        let mut channel = NacChannel::new("c", ChannelConfig::default(), packager()).unwrap();
        assert!(channel.header().is_none());
        channel.set_header("123").unwrap();
        assert_eq!(channel.header(), Some(&[0x12, 0x30][..]));
    }

    #[test]
    fn send_without_connection_fails() {
        let channel = NacChannel::new("c", config(1), packager()).unwrap();
        let err = channel.send(&mut echo_request()).unwrap_err();
        assert!(matches!(err, ChannelError::NotConnected));
        assert!(matches!(
            channel.receive().unwrap_err(),
            ChannelError::NotConnected
        ));
    }

    #[test]
    fn echo_roundtrip_swaps_tpdu() {
        let listener = listener();
        let port = listener.local_addr().port();

        let server = thread::spawn(move || {
            let channel = listener.accept().unwrap();
            let mut msg = channel.receive().unwrap();
            assert_eq!(msg.header(), Some(&[0x60, 0x00, 0x01, 0x00, 0x02][..]));
            msg.set(0, vec![0x08, 0x10]);
            channel.send(&mut msg).unwrap();
        });

        let client = NacChannel::new("client", config(port), packager()).unwrap();
        client.connect().unwrap();
        assert!(client.is_connected());

        client.send(&mut echo_request()).unwrap();
        let reply = client.receive().unwrap();
        assert_eq!(reply.get(0).unwrap().as_ref(), &[0x08, 0x10]);
        assert_eq!(reply.get(11).unwrap().as_ref(), &[0x00, 0x00, 0x01]);
        assert_eq!(reply.header(), Some(&[0x60, 0x00, 0x02, 0x00, 0x01][..]));

        server.join().unwrap();
        client.disconnect().unwrap();
    }

    #[test]
    fn resending_same_message_alternates_addresses() {
        let listener = listener();
        let port = listener.local_addr().port();

        let server = thread::spawn(move || {
            let channel = listener.accept().unwrap();
            let first = channel.receive().unwrap();
            let second = channel.receive().unwrap();
            (first.header().map(<[u8]>::to_vec), second.header().map(<[u8]>::to_vec))
        });

        let client = NacChannel::new("client", config(port), packager()).unwrap();
        client.connect().unwrap();
        let mut msg = echo_request();
        msg.set_header(Some(vec![0x60, 0x00, 0x01, 0x00, 0x02]));
        client.send(&mut msg).unwrap();
        client.send(&mut msg).unwrap();

        let (first, second) = server.join().unwrap();
        assert_eq!(first, Some(vec![0x60, 0x00, 0x02, 0x00, 0x01]));
        assert_eq!(second, Some(vec![0x60, 0x00, 0x01, 0x00, 0x02]));
    }

    #[test]
    fn failed_write_leaves_header_unswapped_for_retry() {
        let listener = listener();
        let port = listener.local_addr().port();

        let server = thread::spawn(move || {
            let _first = listener.accept().unwrap();
            let second = listener.accept().unwrap();
            second.receive().unwrap()
        });

        let client = NacChannel::new("client", config(port), packager()).unwrap();
        client.connect().unwrap();
        client
            .control
            .lock()
            .as_ref()
            .unwrap()
            .shutdown()
            .unwrap();

        let mut msg = echo_request();
        msg.set_header(Some(vec![0x60, 0x00, 0x01, 0x00, 0x02]));
        let err = client.send(&mut msg).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(msg.header(), Some(&[0x60, 0x00, 0x01, 0x00, 0x02][..]));

        client.disconnect().unwrap();
        client.connect().unwrap();
        client.send(&mut msg).unwrap();
        assert_eq!(msg.header(), Some(&[0x60, 0x00, 0x02, 0x00, 0x01][..]));

        let received = server.join().unwrap();
        assert_eq!(received.header(), Some(&[0x60, 0x00, 0x02, 0x00, 0x01][..]));
    }

    #[test]
    fn keep_alives_are_skipped_by_receiver() {
        let listener = listener();
        let port = listener.local_addr().port();

        let server = thread::spawn(move || {
            let channel = listener.accept().unwrap();
            channel.receive().unwrap()
        });

        let client = NacChannel::new("client", config(port), packager()).unwrap();
        client.connect().unwrap();
        client.send_keep_alive().unwrap();
        client.send_keep_alive().unwrap();
        client.send(&mut echo_request()).unwrap();

        let received = server.join().unwrap();
        assert_eq!(received.get(0).unwrap().as_ref(), &[0x08, 0x00]);
    }

    #[test]
    fn disconnect_unblocks_pending_receive() {
        let listener = listener();
        let port = listener.local_addr().port();
        let server = thread::spawn(move || listener.accept().unwrap());

        let client = Arc::new(NacChannel::new("client", config(port), packager()).unwrap());
        client.connect().unwrap();
        let _peer = server.join().unwrap();

        let reader = {
            let client = Arc::clone(&client);
            thread::spawn(move || client.receive())
        };
        thread::sleep(Duration::from_millis(50));
        client.disconnect().unwrap();

        let err = reader.join().unwrap().unwrap_err();
        assert!(err.is_recoverable());
        assert!(!client.is_connected());

        // Idempotent, and the reader slot was released.
        client.disconnect().unwrap();
        assert!(matches!(
            client.receive().unwrap_err(),
            ChannelError::NotConnected
        ));
    }

    #[test]
    fn reconnect_after_disconnect() {
        let listener = listener();
        let port = listener.local_addr().port();
        let server = thread::spawn(move || {
            let first = listener.accept().unwrap();
            let second = listener.accept().unwrap();
            let msg = second.receive().unwrap();
            drop(first);
            msg
        });

        let client = NacChannel::new("client", config(port), packager()).unwrap();
        client.connect().unwrap();
        client.disconnect().unwrap();
        client.connect().unwrap();
        client.send(&mut echo_request()).unwrap();

        assert_eq!(server.join().unwrap().get(11).unwrap().as_ref(), &[0, 0, 1]);
    }

    #[test]
    fn peer_close_is_end_of_stream() {
        let listener = listener();
        let port = listener.local_addr().port();
        let server = thread::spawn(move || drop(listener.accept().unwrap()));

        let client = NacChannel::new("client", config(port), packager()).unwrap();
        client.connect().unwrap();
        server.join().unwrap();

        let err = client.receive().unwrap_err();
        assert_eq!(
            err.disposition(),
            Disposition::Recoverable(FaultKind::EndOfStream)
        );
    }

    #[test]
    fn read_timeout_is_timeout_fault() {
        let listener = listener();
        let port = listener.local_addr().port();
        let server = thread::spawn(move || listener.accept().unwrap());

        let cfg = ChannelConfig {
            timeout: 30,
            ..config(port)
        };
        let client = NacChannel::new("client", cfg, packager()).unwrap();
        client.connect().unwrap();
        let _peer = server.join().unwrap();

        assert!(client.receive().unwrap_err().is_timeout());
    }

    #[test]
    fn pack_failure_is_fatal_and_keeps_connection() {
        let listener = listener();
        let port = listener.local_addr().port();
        let server = thread::spawn(move || listener.accept().unwrap());

        let client = NacChannel::new("client", config(port), packager()).unwrap();
        client.connect().unwrap();
        let _peer = server.join().unwrap();

        let mut bad = Message::new()
            .with_field(0, vec![0x08, 0x00])
            .with_field(11, vec![0x01]);
        let err = client.send(&mut bad).unwrap_err();
        assert_eq!(err.disposition(), Disposition::Fatal(FaultKind::Codec));
        assert!(client.is_connected());
    }

    #[test]
    fn oversize_message_is_rejected_before_writing() {
        let listener = listener();
        let port = listener.local_addr().port();
        let server = thread::spawn(move || listener.accept().unwrap());

        let cfg = ChannelConfig {
            max_packet_length: 16,
            ..config(port)
        };
        let client = NacChannel::new("client", cfg, packager()).unwrap();
        client.connect().unwrap();
        let _peer = server.join().unwrap();

        let mut big = echo_request().with_field(55, vec![0xAA; 32]);
        let err = client.send(&mut big).unwrap_err();
        assert!(matches!(err, ChannelError::Oversize { max: 16, .. }));
    }

    #[test]
    fn max_packet_length_above_prefix_range_is_rejected() {
        let cfg = ChannelConfig {
            max_packet_length: MAX_FRAME_LENGTH + 1,
            ..config(1)
        };
        let err = NacChannel::new("c", cfg, packager()).unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Frame(FrameError::LengthOutOfRange { len: 65536, .. })
        ));
    }

    #[test]
    fn outgoing_filter_veto_drops_message() {
        let listener = listener();
        let port = listener.local_addr().port();
        let server = thread::spawn(move || listener.accept().unwrap());

        let veto_0200 = |msg: &mut Message| -> std::result::Result<(), FilterVeto> {
            if msg.get(0).map(|mti| mti.as_ref()) == Some(&[0x02, 0x00][..]) {
                Err(FilterVeto::new("financial messages disabled"))
            } else {
                Ok(())
            }
        };
        let client = NacChannel::new("client", config(port), packager())
            .unwrap()
            .with_outgoing_filter(Arc::new(veto_0200));
        client.connect().unwrap();
        let _peer = server.join().unwrap();

        let mut msg = Message::new().with_field(0, vec![0x02, 0x00]);
        let err = client.send(&mut msg).unwrap_err();
        assert_eq!(err.disposition(), Disposition::Veto);
        client.send(&mut echo_request()).unwrap();
    }

    #[test]
    fn incoming_filter_can_rewrite() {
        let listener = listener();
        let port = listener.local_addr().port();

        let server = thread::spawn(move || {
            let channel = listener.accept().unwrap();
            channel.send(&mut echo_request()).unwrap();
            channel
        });

        let stamp = |msg: &mut Message| -> std::result::Result<(), FilterVeto> {
            msg.set(55, b"seen".to_vec());
            Ok(())
        };
        let client = NacChannel::new("client", config(port), packager())
            .unwrap()
            .with_incoming_filter(Arc::new(stamp));
        client.connect().unwrap();

        let msg = client.receive().unwrap();
        assert_eq!(msg.get(55).unwrap().as_ref(), b"seen");
        drop(server.join().unwrap());
    }

    #[test]
    fn connect_refused_is_recoverable() {
        let port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let client = NacChannel::new("client", config(port), packager()).unwrap();
        let err = client.connect().unwrap_err();
        assert!(err.is_recoverable());
        assert!(!client.is_connected());
    }
}
