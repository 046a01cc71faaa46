//! In-memory channel and helpers for pump tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use isolink_channel::{ChannelError, IsoChannel, Result};
use isolink_field::Message;
use isolink_frame::FrameError;
use isolink_transport::TransportError;
use parking_lot::{Condvar, Mutex};

use crate::config::{AdaptorConfig, PumpTimings};

/// Channel whose peer is the test itself.
pub(crate) struct ScriptedChannel {
    connected: AtomicBool,
    accept_connects: AtomicBool,
    connect_delay_ms: AtomicU64,
    connect_calls: AtomicU64,
    disconnect_calls: AtomicU64,
    keep_alives: AtomicU64,
    sent_while_disconnected: AtomicU64,
    sent: Mutex<Vec<Message>>,
    send_failures: Mutex<VecDeque<ChannelError>>,
    inbound: Mutex<VecDeque<Result<Message>>>,
    inbound_ready: Condvar,
}

impl ScriptedChannel {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(false),
            accept_connects: AtomicBool::new(true),
            connect_delay_ms: AtomicU64::new(0),
            connect_calls: AtomicU64::new(0),
            disconnect_calls: AtomicU64::new(0),
            keep_alives: AtomicU64::new(0),
            sent_while_disconnected: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
            send_failures: Mutex::new(VecDeque::new()),
            inbound: Mutex::new(VecDeque::new()),
            inbound_ready: Condvar::new(),
        })
    }

    pub(crate) fn refusing() -> Arc<Self> {
        let channel = Self::new();
        channel.set_accept_connects(false);
        channel
    }

    pub(crate) fn set_accept_connects(&self, accept: bool) {
        self.accept_connects.store(accept, Ordering::SeqCst);
    }

    /// Make every connect take `delay` before it completes.
    pub(crate) fn set_connect_delay(&self, delay: Duration) {
        self.connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Lose the connection as if the peer went away, without a disconnect call.
    pub(crate) fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.inbound_ready.notify_all();
    }

    pub(crate) fn fail_next_send(&self, err: ChannelError) {
        self.send_failures.lock().push_back(err);
    }

    pub(crate) fn deliver(&self, msg: Message) {
        self.inbound.lock().push_back(Ok(msg));
        self.inbound_ready.notify_all();
    }

    pub(crate) fn deliver_error(&self, err: ChannelError) {
        self.inbound.lock().push_back(Err(err));
        self.inbound_ready.notify_all();
    }

    pub(crate) fn sent(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }

    pub(crate) fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub(crate) fn connect_calls(&self) -> u64 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnect_calls(&self) -> u64 {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn keep_alives(&self) -> u64 {
        self.keep_alives.load(Ordering::SeqCst)
    }

    pub(crate) fn sent_while_disconnected(&self) -> u64 {
        self.sent_while_disconnected.load(Ordering::SeqCst)
    }
}

impl IsoChannel for ScriptedChannel {
    fn connect(&self) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }
        if self.accept_connects.load(Ordering::SeqCst) {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            Err(ChannelError::Transport(TransportError::Connect {
                addr: "127.0.0.1:9".parse().expect("static address"),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            }))
        }
    }

    fn disconnect(&self) -> Result<()> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.inbound_ready.notify_all();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send(&self, msg: &mut Message) -> Result<()> {
        if !self.is_connected() {
            self.sent_while_disconnected.fetch_add(1, Ordering::SeqCst);
            return Err(ChannelError::NotConnected);
        }
        if let Some(err) = self.send_failures.lock().pop_front() {
            return Err(err);
        }
        self.sent.lock().push(msg.clone());
        Ok(())
    }

    fn receive(&self) -> Result<Message> {
        let mut inbound = self.inbound.lock();
        loop {
            if !self.is_connected() {
                return Err(ChannelError::Frame(FrameError::ConnectionClosed));
            }
            if let Some(item) = inbound.pop_front() {
                return item;
            }
            self.inbound_ready
                .wait_for(&mut inbound, Duration::from_millis(20));
        }
    }

    fn send_keep_alive(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }
        self.keep_alives.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Configuration with short pump timings.
pub(crate) fn fast_config(name: &str) -> AdaptorConfig {
    let mut config = AdaptorConfig::new(name, format!("{name}-in"), format!("{name}-out"));
    config.reconnect_delay = 100;
    config.timings = PumpTimings {
        reconnect_poll: Duration::from_millis(10),
        error_backoff: Duration::from_millis(10),
        ready_poll: Duration::from_millis(50),
        foreign_sentinel_ttl: Duration::from_millis(30),
        foreign_sentinel_backoff: Duration::from_millis(60),
        min_stop_wait: Duration::from_secs(2),
    };
    config
}

/// Message with an MTI and a trace number.
pub(crate) fn message(stan: u8) -> Message {
    Message::new()
        .with_field(0, vec![0x02, 0x00])
        .with_field(11, vec![0x00, 0x00, stan])
}

pub(crate) fn stan(msg: &Message) -> u8 {
    msg.get(11).map_or(0, |value| value[2])
}

/// Poll `check` until it holds or `timeout` passes.
pub(crate) fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}
