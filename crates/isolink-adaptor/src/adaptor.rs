use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use isolink_channel::IsoChannel;
use isolink_field::Message;
use isolink_space::Space;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AdaptorConfig;
use crate::counters::{AdaptorStats, Counters};
use crate::envelope::{AdaptorId, Envelope};
use crate::error::{AdaptorError, Result};
use crate::registry::AdaptorRegistry;

const WORKER_POLL: Duration = Duration::from_millis(10);

/// Lifecycle of a [`ChannelAdaptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdaptorState {
    Stopped,
    Starting,
    Running,
    SoftStopping,
}

impl fmt::Display for AdaptorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::SoftStopping => "soft-stopping",
        };
        f.write_str(name)
    }
}

/// Queue slot names used by one adaptor.
#[derive(Debug, Clone)]
pub(crate) struct Keys {
    pub(crate) input: String,
    pub(crate) output: Option<String>,
    pub(crate) ready: String,
    pub(crate) reconnect: String,
}

/// Drives one channel from a pair of queues.
///
/// Created with [`init`](Self::init), run with [`start`](Self::start),
/// stopped with [`stop`](Self::stop). The Sender and Receiver pumps run on
/// their own named threads and hold an `Arc` to the adaptor.
pub struct ChannelAdaptor {
    pub(crate) id: AdaptorId,
    pub(crate) config: AdaptorConfig,
    pub(crate) channel: Arc<dyn IsoChannel>,
    pub(crate) space: Arc<Space<Envelope>>,
    pub(crate) keys: Keys,
    pub(crate) counters: Counters,
    pub(crate) running: AtomicBool,
    /// When the last stop was requested; anchors the soft-stop deadline.
    pub(crate) stop_requested: Mutex<Option<Instant>>,
    /// Serializes disconnects; never held together with `state`.
    pub(crate) disconnect_lock: Mutex<()>,
    state: Mutex<AdaptorState>,
    pub(crate) workers: Mutex<Vec<JoinHandle<()>>>,
    registry: Arc<AdaptorRegistry>,
}

impl ChannelAdaptor {
    /// Validate `config`, bind the queue names and register the adaptor.
    ///
    /// The adaptor is left in [`AdaptorState::Starting`].
    pub fn init(
        config: AdaptorConfig,
        channel: Arc<dyn IsoChannel>,
        space: Arc<Space<Envelope>>,
        registry: Arc<AdaptorRegistry>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let input = config
            .input
            .clone()
            .ok_or_else(|| AdaptorError::Configuration("'in' queue is required".to_string()))?;
        let output = if config.write_only {
            None
        } else {
            config.output.clone()
        };
        let keys = Keys {
            input,
            output,
            ready: format!("{}.ready", config.name),
            reconnect: format!("{}.reconnect", config.name),
        };

        let adaptor = Arc::new(Self {
            id: AdaptorId::next(),
            config,
            channel,
            space,
            keys,
            counters: Counters::default(),
            running: AtomicBool::new(false),
            stop_requested: Mutex::new(None),
            disconnect_lock: Mutex::new(()),
            state: Mutex::new(AdaptorState::Starting),
            workers: Mutex::new(Vec::new()),
            registry,
        });
        adaptor.registry.register(&adaptor)?;
        info!(adaptor = %adaptor.name(), id = %adaptor.id, "adaptor initialized");
        Ok(adaptor)
    }

    /// Launch the Sender and, unless write-only, the Receiver.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut state = self.state.lock();
        if !matches!(*state, AdaptorState::Starting | AdaptorState::Stopped) {
            return Err(AdaptorError::InvalidState {
                name: self.name().to_string(),
                action: "start",
                state: *state,
            });
        }
        self.reap_workers();
        *self.stop_requested.lock() = None;
        self.running.store(true, Ordering::Release);

        let mut handles = Vec::with_capacity(2);
        let sender = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("channel-sender-{}", self.keys.input))
            .spawn(move || sender.run_sender())
            .map(|handle| handles.push(handle));

        let spawned = spawned.and_then(|()| match self.keys.output.clone() {
            Some(output) => {
                let receiver = Arc::clone(self);
                thread::Builder::new()
                    .name(format!("channel-receiver-{output}"))
                    .spawn(move || receiver.run_receiver())
                    .map(|handle| handles.push(handle))
            }
            None => Ok(()),
        });

        self.workers.lock().extend(handles);
        if let Err(err) = spawned {
            self.running.store(false, Ordering::Release);
            self.space.out(&self.keys.input, Envelope::Stop(self.id));
            return Err(err.into());
        }

        *state = AdaptorState::Running;
        info!(
            adaptor = %self.name(),
            input = %self.keys.input,
            output = ?self.keys.output,
            "adaptor running"
        );
        Ok(())
    }

    /// Request shutdown.
    ///
    /// With a soft-stop window the socket stays open until the window ends
    /// and the Receiver keeps draining until then; otherwise the channel is
    /// closed immediately.
    pub fn stop(self: &Arc<Self>) {
        let soft_stop = self.config.soft_stop();
        {
            let mut state = self.state.lock();
            if *state != AdaptorState::Running {
                return;
            }
            *state = if soft_stop.is_zero() {
                AdaptorState::Stopped
            } else {
                AdaptorState::SoftStopping
            };
        }

        *self.stop_requested.lock() = Some(Instant::now());
        self.running.store(false, Ordering::Release);
        self.space.out(&self.keys.input, Envelope::Stop(self.id));

        if soft_stop.is_zero() {
            self.disconnect();
        } else {
            self.disconnect_later(soft_stop);
        }
        info!(adaptor = %self.name(), soft_stop_ms = soft_stop.as_millis() as u64, "stop requested");

        if self.config.wait_for_workers_on_stop {
            self.wait_for_workers(soft_stop.max(self.config.timings.min_stop_wait));
        }
    }

    /// Stop if needed and remove the adaptor from its registry.
    pub fn destroy(self: &Arc<Self>) {
        self.stop();
        self.registry.unregister(self.name());
    }

    fn disconnect_later(self: &Arc<Self>, delay: Duration) {
        {
            let _guard = self.disconnect_lock.lock();
            self.space.clear(&self.keys.ready);
        }
        let adaptor = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("channel-soft-stop-{}", self.name()))
            .spawn(move || {
                thread::sleep(delay);
                adaptor.disconnect();
                let mut state = adaptor.state.lock();
                if *state == AdaptorState::SoftStopping {
                    *state = AdaptorState::Stopped;
                }
                info!(adaptor = %adaptor.name(), "soft-stop window closed");
            });
        if let Err(err) = spawned {
            warn!(adaptor = %self.name(), error = %err, "soft-stop timer unavailable; disconnecting now");
            self.disconnect();
            *self.state.lock() = AdaptorState::Stopped;
        }
    }

    /// Wait up to `limit` for the pump threads to finish.
    ///
    /// Returns `true` when all of them did.
    pub fn wait_for_workers(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            let pending = {
                let mut workers = self.workers.lock();
                let (finished, pending): (Vec<_>, Vec<_>) =
                    workers.drain(..).partition(JoinHandle::is_finished);
                *workers = pending;
                for handle in finished {
                    if handle.join().is_err() {
                        warn!(adaptor = %self.name(), "pump thread panicked");
                    }
                }
                workers.len()
            };
            if pending == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                warn!(adaptor = %self.name(), pending, "pump threads still running after stop");
                return false;
            }
            thread::sleep(WORKER_POLL);
        }
    }

    fn reap_workers(&self) {
        let mut workers = self.workers.lock();
        workers.retain(|handle| !handle.is_finished());
    }

    /// Close the channel and clear the ready signal.
    ///
    /// Failures are logged and swallowed.
    pub(crate) fn disconnect(&self) {
        let _guard = self.disconnect_lock.lock();
        self.space.clear(&self.keys.ready);
        if let Err(err) = self.channel.disconnect() {
            warn!(adaptor = %self.name(), error = %err, "disconnect failed");
        }
    }

    /// Queue a message for the Sender.
    pub fn send(&self, msg: Message) {
        self.space.out(&self.keys.input, Envelope::Message(msg));
    }

    /// Queue a message that expires if not sent within `timeout`.
    pub fn send_with_timeout(&self, msg: Message, timeout: Duration) {
        self.space
            .out_with_ttl(&self.keys.input, Envelope::Message(msg), timeout);
    }

    /// Block until the Receiver publishes a message.
    ///
    /// Returns `None` at once for write-only adaptors.
    pub fn receive(&self) -> Option<Message> {
        let output = self.keys.output.as_deref()?;
        loop {
            match self.space.take(output) {
                Envelope::Message(msg) => return Some(msg),
                other => warn!(adaptor = %self.name(), envelope = ?other, "ignoring non-message on output queue"),
            }
        }
    }

    /// Wait up to `timeout` for a received message.
    pub fn receive_timeout(&self, timeout: Duration) -> Option<Message> {
        let output = self.keys.output.as_deref()?;
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.space.take_timeout(output, left)? {
                Envelope::Message(msg) => return Some(msg),
                other => warn!(adaptor = %self.name(), envelope = ?other, "ignoring non-message on output queue"),
            }
        }
    }

    /// Messages waiting in the `in` queue.
    pub fn pending(&self) -> usize {
        self.space.size(&self.keys.input)
    }

    /// Whether the ready signal is published.
    pub fn is_connected(&self) -> bool {
        self.space.peek(&self.keys.ready).is_some()
    }

    /// When the current connection became ready.
    pub fn ready_since(&self) -> Option<SystemTime> {
        match self.space.peek(&self.keys.ready) {
            Some(Envelope::Ready(at)) => Some(at),
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn id(&self) -> AdaptorId {
        self.id
    }

    pub fn config(&self) -> &AdaptorConfig {
        &self.config
    }

    pub fn channel(&self) -> &Arc<dyn IsoChannel> {
        &self.channel
    }

    pub fn state(&self) -> AdaptorState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn input_key(&self) -> &str {
        &self.keys.input
    }

    pub fn output_key(&self) -> Option<&str> {
        self.keys.output.as_deref()
    }

    pub fn ready_key(&self) -> &str {
        &self.keys.ready
    }

    pub fn reconnect_key(&self) -> &str {
        &self.keys.reconnect
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn tx_count(&self) -> u64 {
        self.counters.tx()
    }

    pub fn rx_count(&self) -> u64 {
        self.counters.rx()
    }

    pub fn connects_count(&self) -> u64 {
        self.counters.connects()
    }

    pub fn last_activity(&self) -> Option<SystemTime> {
        self.counters.last_activity()
    }

    pub fn idle_time(&self) -> Option<Duration> {
        self.counters.idle_time()
    }

    pub fn counters_summary(&self) -> String {
        self.counters.summary()
    }

    pub fn reset_counters(&self) {
        self.counters.reset();
    }

    pub fn stats(&self) -> AdaptorStats {
        AdaptorStats::capture(self.name(), self.state(), self.is_connected(), &self.counters)
    }
}

impl fmt::Debug for ChannelAdaptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelAdaptor")
            .field("name", &self.config.name)
            .field("id", &self.id)
            .field("state", &self.state())
            .field("counters", &self.counters)
            .finish()
    }
}
