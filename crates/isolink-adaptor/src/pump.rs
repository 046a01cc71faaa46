//! Sender and Receiver loops.

use std::thread;
use std::time::{Duration, Instant, SystemTime};

use isolink_channel::{ChannelError, Disposition, FaultKind};
use isolink_field::Message;
use tracing::{debug, info, warn};

use crate::adaptor::{AdaptorState, ChannelAdaptor};
use crate::envelope::Envelope;

/// Longest single sleep; keeps stop requests visible while pausing.
const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// Receiver poll step while draining a disconnected channel during soft-stop.
const DRAIN_POLL: Duration = Duration::from_millis(50);

impl ChannelAdaptor {
    pub(crate) fn run_sender(&self) {
        debug!(adaptor = %self.name(), "sender started");
        let delay = self.config.reconnect_delay();

        while self.is_running() {
            self.check_connection();
            if !self.is_running() {
                break;
            }

            match self.space.take_timeout(&self.keys.input, delay) {
                Some(Envelope::Message(mut msg)) => {
                    if !self.channel.is_connected() {
                        // Lost the connection since the check; let this or a
                        // companion adaptor pick the message up again.
                        self.space.push(&self.keys.input, Envelope::Message(msg));
                        continue;
                    }
                    match self.channel.send(&mut msg) {
                        Ok(()) => self.counters.record_tx(),
                        Err(err) => self.on_send_error(err, Some(msg)),
                    }
                }
                Some(Envelope::Stop(id)) if id == self.id => {
                    if !self.is_running() {
                        break;
                    }
                    debug!(adaptor = %self.name(), "discarding stale stop request");
                }
                Some(Envelope::Wake(id)) if id == self.id => {}
                Some(sentinel @ (Envelope::Stop(_) | Envelope::Wake(_))) => {
                    // Owned by a companion adaptor on the same queue: hand it
                    // back and stay away long enough for it to be claimed.
                    self.space.push_with_ttl(
                        &self.keys.input,
                        sentinel,
                        self.config.timings.foreign_sentinel_ttl,
                    );
                    self.pause(self.config.timings.foreign_sentinel_backoff);
                }
                Some(other) => {
                    warn!(adaptor = %self.name(), envelope = ?other, "dropping unexpected envelope on input queue");
                }
                None => {
                    if self.config.keep_alive && self.channel.is_connected() {
                        if let Err(err) = self.channel.send_keep_alive() {
                            self.on_send_error(err, None);
                        }
                    }
                }
            }
        }

        // Without a Receiver nobody else closes a connect that finished
        // after the stop; an open soft-stop window is closed by its timer.
        if self.keys.output.is_none() && self.state() != AdaptorState::SoftStopping {
            self.disconnect();
        }
        debug!(adaptor = %self.name(), "sender stopped");
    }

    fn on_send_error(&self, err: ChannelError, msg: Option<Message>) {
        match err.disposition() {
            Disposition::Veto => {
                debug!(adaptor = %self.name(), error = %err, "outgoing message vetoed");
            }
            Disposition::Fatal(kind) => {
                warn!(adaptor = %self.name(), error = %err, ?kind, "dropping message that cannot be sent");
            }
            Disposition::Recoverable(FaultKind::Protocol) => {
                warn!(adaptor = %self.name(), error = %err, "protocol error on send");
                if !self.config.ignore_iso_exceptions {
                    self.disconnect();
                }
                self.pause(self.config.timings.error_backoff);
            }
            Disposition::Recoverable(kind) => {
                warn!(adaptor = %self.name(), error = %err, ?kind, "send failed; reconnecting");
                if let Some(msg) = msg {
                    self.space.push(&self.keys.input, Envelope::Message(msg));
                }
                self.disconnect();
                self.pause(self.config.timings.error_backoff);
            }
        }
    }

    /// Make sure the channel is connected and `ready` is published.
    ///
    /// Yields while the Receiver has a reconnect pending so only one side
    /// reconnects at a time.
    pub(crate) fn check_connection(&self) {
        while self.is_running() && self.space.peek(&self.keys.reconnect).is_some() {
            self.pause(self.config.timings.reconnect_poll);
        }

        while self.is_running() && !self.channel.is_connected() {
            self.space.clear(&self.keys.ready);
            if let Err(err) = self.channel.connect() {
                debug!(adaptor = %self.name(), error = %err, "connect failed");
            }
            if self.channel.is_connected() {
                self.counters.record_connect();
                info!(
                    adaptor = %self.name(),
                    connects = self.counters.connects(),
                    "channel connected"
                );
            } else {
                self.pause(self.config.reconnect_delay());
            }
        }

        // Published under the disconnect lock so a concurrent stop cannot
        // leave a stale ready signal behind.
        let _guard = self.disconnect_lock.lock();
        if self.is_running()
            && self.channel.is_connected()
            && self.space.peek(&self.keys.ready).is_none()
        {
            self.space
                .out(&self.keys.ready, Envelope::Ready(SystemTime::now()));
        }
    }

    pub(crate) fn run_receiver(&self) {
        debug!(adaptor = %self.name(), "receiver started");
        let Some(output) = self.keys.output.clone() else {
            return;
        };
        let grace = self.config.soft_stop();
        let mut deadline: Option<Instant> = None;

        loop {
            if deadline.is_none() && !self.is_running() {
                if grace.is_zero() {
                    break;
                }
                let since = (*self.stop_requested.lock()).unwrap_or_else(Instant::now);
                deadline = Some(since + grace);
                info!(adaptor = %self.name(), grace_ms = grace.as_millis() as u64, "soft-stop: draining");
            }

            let exit = match deadline {
                Some(deadline) => Instant::now() > deadline,
                None => !self.is_running(),
            };
            if exit {
                break;
            }

            // The ready signal is withdrawn at stop; while draining, the
            // socket itself decides whether reads are still possible.
            let readable = match deadline {
                Some(deadline) => {
                    let connected = self.channel.is_connected();
                    if !connected {
                        let left = deadline.saturating_duration_since(Instant::now());
                        thread::sleep(left.min(DRAIN_POLL));
                    }
                    connected
                }
                None => self
                    .space
                    .read_timeout(&self.keys.ready, self.config.timings.ready_poll)
                    .is_some(),
            };
            if !readable {
                continue;
            }

            match self.channel.receive() {
                Ok(msg) => {
                    self.counters.record_rx();
                    let envelope = Envelope::Message(msg);
                    match self.config.delivery_timeout() {
                        Some(ttl) => self.space.out_with_ttl(&output, envelope, ttl),
                        None => self.space.out(&output, envelope),
                    }
                }
                Err(err) => self.on_receive_error(err, deadline.is_some()),
            }
        }

        self.disconnect();
        debug!(adaptor = %self.name(), "receiver stopped");
    }

    fn on_receive_error(&self, err: ChannelError, draining: bool) {
        let disposition = err.disposition();
        if disposition == Disposition::Veto {
            debug!(adaptor = %self.name(), error = %err, "incoming message vetoed");
            return;
        }
        if !self.is_running() {
            if draining {
                thread::sleep(DRAIN_POLL);
            }
            return;
        }

        let ignore = self.config.ignore_iso_exceptions
            && disposition == Disposition::Recoverable(FaultKind::Protocol);
        if ignore {
            warn!(adaptor = %self.name(), error = %err, "ignoring protocol error on receive");
        } else {
            warn!(adaptor = %self.name(), error = %err, "receive failed; reconnecting");
            self.space.out_with_ttl(
                &self.keys.reconnect,
                Envelope::Reconnect,
                self.config.reconnect_delay(),
            );
            self.disconnect();
            self.space.push(&self.keys.input, Envelope::Wake(self.id));
        }
        self.pause(self.config.timings.error_backoff);
    }

    /// Sleep for `duration`, returning early once the adaptor stops running.
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while self.is_running() {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            thread::sleep(left.min(PAUSE_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use isolink_channel::IsoChannel;
    use isolink_field::FieldError;
    use isolink_frame::FrameError;
    use isolink_space::Space;

    use super::*;
    use crate::config::AdaptorConfig;
    use crate::envelope::AdaptorId;
    use crate::registry::AdaptorRegistry;
    use crate::testing::{fast_config, message, stan, wait_until, ScriptedChannel};

    const WAIT: Duration = Duration::from_secs(3);

    fn start(config: AdaptorConfig, channel: &Arc<ScriptedChannel>) -> Arc<ChannelAdaptor> {
        start_on(config, channel, Arc::new(Space::new()), Arc::new(AdaptorRegistry::new()))
    }

    fn start_on(
        config: AdaptorConfig,
        channel: &Arc<ScriptedChannel>,
        space: Arc<Space<Envelope>>,
        registry: Arc<AdaptorRegistry>,
    ) -> Arc<ChannelAdaptor> {
        let adaptor = ChannelAdaptor::init(config, channel.clone(), space, registry).unwrap();
        adaptor.start().unwrap();
        adaptor
    }

    fn shutdown(adaptor: &Arc<ChannelAdaptor>) {
        adaptor.stop();
        assert!(adaptor.wait_for_workers(WAIT));
    }

    fn reset_error() -> ChannelError {
        ChannelError::Frame(FrameError::Io(std::io::Error::from(
            std::io::ErrorKind::ConnectionReset,
        )))
    }

    #[test]
    fn sends_in_queue_order_and_counts_tx() {
        let channel = ScriptedChannel::new();
        let adaptor = start(fast_config("fifo"), &channel);
        for n in 1..=5 {
            adaptor.send(message(n));
        }

        assert!(wait_until(WAIT, || channel.sent_count() == 5));
        let order: Vec<u8> = channel.sent().iter().map(stan).collect();
        assert_eq!(order, vec![1, 2, 3, 4, 5]);
        assert_eq!(adaptor.tx_count(), 5);
        assert_eq!(adaptor.connects_count(), 1);
        assert!(adaptor.counters_summary().starts_with("tx=5, rx=0, connects=1"));
        shutdown(&adaptor);
    }

    #[test]
    fn received_messages_reach_out_queue() {
        let channel = ScriptedChannel::new();
        let adaptor = start(fast_config("inbound"), &channel);
        assert!(adaptor.last_activity().is_none());
        assert!(wait_until(WAIT, || adaptor.is_connected()));

        for n in 1..=3 {
            channel.deliver(message(n));
        }
        for n in 1..=3 {
            let msg = adaptor.receive_timeout(WAIT).unwrap();
            assert_eq!(stan(&msg), n);
        }
        assert_eq!(adaptor.rx_count(), 3);
        assert_eq!(adaptor.tx_count(), 0);
        assert!(adaptor.last_activity().is_some());
        assert!(adaptor.idle_time().is_some());
        assert!(adaptor.counters_summary().contains("idle="));

        adaptor.reset_counters();
        assert_eq!(adaptor.counters_summary(), "tx=0, rx=0, connects=0, last=0");
        shutdown(&adaptor);
    }

    #[test]
    fn unread_messages_expire_after_delivery_timeout() {
        let channel = ScriptedChannel::new();
        let mut config = fast_config("expiry");
        config.timeout = 40;
        let adaptor = start(config, &channel);
        assert!(wait_until(WAIT, || adaptor.is_connected()));

        channel.deliver(message(9));
        assert!(wait_until(WAIT, || adaptor.rx_count() == 1));
        thread::sleep(Duration::from_millis(120));
        assert!(adaptor.receive_timeout(Duration::ZERO).is_none());
        shutdown(&adaptor);
    }

    #[test]
    fn nothing_is_sent_while_disconnected() {
        let channel = ScriptedChannel::refusing();
        let adaptor = start(fast_config("offline"), &channel);
        for n in 1..=3 {
            adaptor.send(message(n));
        }

        assert!(wait_until(WAIT, || channel.connect_calls() >= 2));
        assert_eq!(channel.sent_count(), 0);
        assert_eq!(channel.sent_while_disconnected(), 0);
        assert_eq!(adaptor.space.size(adaptor.input_key()), 3);
        assert!(!adaptor.is_connected());

        channel.set_accept_connects(true);
        assert!(wait_until(WAIT, || channel.sent_count() == 3));
        let order: Vec<u8> = channel.sent().iter().map(stan).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(adaptor.connects_count(), 1);
        shutdown(&adaptor);
    }

    #[test]
    fn message_taken_after_connection_drop_stays_at_front() {
        let channel = ScriptedChannel::new();
        let mut config = fast_config("dropped");
        config.write_only = true;
        config.output = None;
        config.reconnect_delay = 500;
        let adaptor = start(config, &channel);
        assert!(wait_until(WAIT, || adaptor.is_connected()));
        // Sender is parked on the empty input queue, past its connection check.
        thread::sleep(Duration::from_millis(50));

        channel.set_accept_connects(false);
        channel.drop_connection();
        adaptor.send(message(1));
        adaptor.send(message(2));

        assert!(wait_until(WAIT, || channel.connect_calls() >= 3));
        assert_eq!(channel.sent_count(), 0);
        assert_eq!(channel.sent_while_disconnected(), 0);
        assert_eq!(adaptor.pending(), 2);
        match adaptor.space.peek(adaptor.input_key()) {
            Some(Envelope::Message(msg)) => assert_eq!(stan(&msg), 1),
            other => panic!("expected message 1 at the front, got {other:?}"),
        }

        channel.set_accept_connects(true);
        assert!(wait_until(WAIT, || channel.sent_count() == 2));
        thread::sleep(Duration::from_millis(100));
        let order: Vec<u8> = channel.sent().iter().map(stan).collect();
        assert_eq!(order, vec![1, 2]);
        assert_eq!(adaptor.tx_count(), 2);
        assert_eq!(adaptor.pending(), 0);
        shutdown(&adaptor);
    }

    #[test]
    fn write_only_stop_closes_connect_that_lands_late() {
        let channel = ScriptedChannel::new();
        channel.set_connect_delay(Duration::from_millis(200));
        let mut config = fast_config("late");
        config.write_only = true;
        config.output = None;
        let adaptor = start(config, &channel);

        assert!(wait_until(WAIT, || channel.connect_calls() == 1));
        adaptor.stop();
        assert!(adaptor.wait_for_workers(WAIT));
        assert!(!channel.is_connected());
        assert!(adaptor.ready_since().is_none());
    }

    #[test]
    fn transport_failure_requeues_message_and_reconnects() {
        let channel = ScriptedChannel::new();
        let adaptor = start(fast_config("requeue"), &channel);
        assert!(wait_until(WAIT, || adaptor.is_connected()));

        channel.fail_next_send(reset_error());
        adaptor.send(message(1));
        adaptor.send(message(2));

        assert!(wait_until(WAIT, || channel.sent_count() == 2));
        let order: Vec<u8> = channel.sent().iter().map(stan).collect();
        assert_eq!(order, vec![1, 2]);
        assert_eq!(adaptor.tx_count(), 2);
        assert!(adaptor.connects_count() >= 2);
        shutdown(&adaptor);
    }

    #[test]
    fn pack_failure_drops_message_and_keeps_connection() {
        let channel = ScriptedChannel::new();
        let adaptor = start(fast_config("badmsg"), &channel);
        assert!(wait_until(WAIT, || adaptor.is_connected()));

        channel.fail_next_send(ChannelError::Pack(FieldError::LengthMismatch {
            field: 2,
            expected: 8,
            actual: 3,
        }));
        adaptor.send(message(1));
        adaptor.send(message(2));

        assert!(wait_until(WAIT, || channel.sent_count() == 1));
        assert_eq!(stan(&channel.sent()[0]), 2);
        assert_eq!(adaptor.tx_count(), 1);
        assert_eq!(channel.disconnect_calls(), 0);
        assert_eq!(adaptor.connects_count(), 1);
        shutdown(&adaptor);
    }

    #[test]
    fn vetoed_message_is_skipped_quietly() {
        let channel = ScriptedChannel::new();
        let adaptor = start(fast_config("veto"), &channel);
        assert!(wait_until(WAIT, || adaptor.is_connected()));

        channel.fail_next_send(isolink_channel::FilterVeto::new("blocked").into());
        adaptor.send(message(1));
        adaptor.send(message(2));

        assert!(wait_until(WAIT, || channel.sent_count() == 1));
        assert_eq!(stan(&channel.sent()[0]), 2);
        assert_eq!(channel.disconnect_calls(), 0);
        shutdown(&adaptor);
    }

    #[test]
    fn receive_fault_hands_reconnect_to_sender_after_delay() {
        let channel = ScriptedChannel::new();
        let mut config = fast_config("fault");
        config.reconnect_delay = 300;
        let adaptor = start(config, &channel);
        assert!(wait_until(WAIT, || adaptor.is_connected()));
        assert_eq!(channel.connect_calls(), 1);

        let fault_at = Instant::now();
        channel.deliver_error(ChannelError::Frame(FrameError::ConnectionClosed));
        assert!(wait_until(WAIT, || !channel.is_connected()));
        assert!(adaptor.space.peek(adaptor.reconnect_key()).is_some());

        thread::sleep(Duration::from_millis(100));
        assert_eq!(channel.connect_calls(), 1, "sender must wait for the reconnect delay");

        assert!(wait_until(WAIT, || adaptor.connects_count() == 2));
        assert!(fault_at.elapsed() >= Duration::from_millis(250));
        assert!(wait_until(WAIT, || adaptor.is_connected()));

        channel.deliver(message(4));
        assert_eq!(stan(&adaptor.receive_timeout(WAIT).unwrap()), 4);
        shutdown(&adaptor);
    }

    #[test]
    fn protocol_errors_are_ignored_when_configured() {
        let channel = ScriptedChannel::new();
        let mut config = fast_config("lenient");
        config.ignore_iso_exceptions = true;
        let adaptor = start(config, &channel);
        assert!(wait_until(WAIT, || adaptor.is_connected()));

        channel.deliver_error(ChannelError::Unpack(FieldError::TrailingBytes(4)));
        channel.deliver(message(5));

        assert_eq!(stan(&adaptor.receive_timeout(WAIT).unwrap()), 5);
        assert_eq!(channel.disconnect_calls(), 0);
        assert_eq!(adaptor.connects_count(), 1);
        shutdown(&adaptor);
    }

    #[test]
    fn protocol_errors_reconnect_by_default() {
        let channel = ScriptedChannel::new();
        let adaptor = start(fast_config("strict"), &channel);
        assert!(wait_until(WAIT, || adaptor.is_connected()));

        channel.deliver_error(ChannelError::Unpack(FieldError::TrailingBytes(4)));
        assert!(wait_until(WAIT, || adaptor.connects_count() == 2));
        assert!(channel.disconnect_calls() >= 1);
        shutdown(&adaptor);
    }

    #[test]
    fn keep_alive_sent_when_input_idle() {
        let channel = ScriptedChannel::new();
        let mut config = fast_config("heartbeat");
        config.keep_alive = true;
        config.reconnect_delay = 30;
        let adaptor = start(config, &channel);

        assert!(wait_until(WAIT, || channel.keep_alives() >= 2));
        assert_eq!(adaptor.tx_count(), 0);
        shutdown(&adaptor);
    }

    #[test]
    fn foreign_sentinel_is_handed_back_until_it_expires() {
        let channel = ScriptedChannel::new();
        let adaptor = start(fast_config("foreign"), &channel);
        assert!(wait_until(WAIT, || adaptor.is_connected()));

        adaptor
            .space
            .out(adaptor.input_key(), Envelope::Stop(AdaptorId::next()));
        assert!(wait_until(WAIT, || adaptor.space.size(adaptor.input_key()) == 0));
        assert!(adaptor.is_running());

        adaptor.send(message(6));
        assert!(wait_until(WAIT, || channel.sent_count() == 1));
        shutdown(&adaptor);
    }

    #[test]
    fn companion_adaptors_share_an_input_queue() {
        let space = Arc::new(Space::new());
        let registry = Arc::new(AdaptorRegistry::new());
        let first_channel = ScriptedChannel::new();
        let second_channel = ScriptedChannel::new();

        let mut first_config = fast_config("first");
        first_config.input = Some("shared-in".to_string());
        first_config.wait_for_workers_on_stop = true;
        let mut second_config = fast_config("second");
        second_config.input = Some("shared-in".to_string());

        let first = start_on(first_config, &first_channel, Arc::clone(&space), Arc::clone(&registry));
        let second = start_on(second_config, &second_channel, Arc::clone(&space), registry);
        assert!(wait_until(WAIT, || first.is_connected() && second.is_connected()));

        first.stop();
        assert_eq!(first.state(), AdaptorState::Stopped);
        assert!(first.workers.lock().is_empty());

        for n in 1..=4 {
            second.send(message(n));
        }
        assert!(wait_until(WAIT, || second_channel.sent_count() == 4));
        assert_eq!(first.tx_count() + second.tx_count(), 4);
        assert!(second.is_running());
        shutdown(&second);
    }

    #[test]
    fn soft_stop_drains_until_window_closes() {
        let channel = ScriptedChannel::new();
        let mut config = fast_config("drain");
        config.soft_stop = 300;
        let adaptor = start(config, &channel);
        assert!(wait_until(WAIT, || adaptor.is_connected()));

        let stopped_at = Instant::now();
        adaptor.stop();
        assert_eq!(adaptor.state(), AdaptorState::SoftStopping);
        assert!(!adaptor.is_connected());
        assert!(channel.is_connected());

        thread::sleep(Duration::from_millis(100));
        channel.deliver(message(7));
        assert!(wait_until(Duration::from_millis(150), || adaptor.rx_count() == 1));
        assert_eq!(stan(&adaptor.receive_timeout(Duration::ZERO).unwrap()), 7);
        assert!(channel.is_connected());

        assert!(wait_until(WAIT, || !channel.is_connected()));
        assert!(stopped_at.elapsed() >= Duration::from_millis(300));
        assert!(wait_until(WAIT, || adaptor.state() == AdaptorState::Stopped));
        assert!(adaptor.wait_for_workers(WAIT));
    }

    #[test]
    fn pause_returns_early_once_stopped() {
        let channel = ScriptedChannel::new();
        let adaptor = ChannelAdaptor::init(
            fast_config("pause"),
            channel,
            Arc::new(Space::new()),
            Arc::new(AdaptorRegistry::new()),
        )
        .unwrap();
        let started = Instant::now();
        adaptor.pause(Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
