use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::adaptor::AdaptorState;

/// Throughput counters of one adaptor.
///
/// Each counter has a single writer (tx: Sender, rx and last activity:
/// Receiver, connects: the reconnect routine), so relaxed ordering is enough.
/// Readers may observe slightly stale values.
#[derive(Debug, Default)]
pub struct Counters {
    tx: AtomicU64,
    rx: AtomicU64,
    connects: AtomicU64,
    /// Milliseconds since the epoch; 0 means no activity yet.
    last_activity: AtomicU64,
}

impl Counters {
    pub fn record_tx(&self) {
        self.tx.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rx(&self) {
        self.rx.fetch_add(1, Ordering::Relaxed);
        self.last_activity.store(epoch_millis(SystemTime::now()), Ordering::Relaxed);
    }

    pub fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.tx.store(0, Ordering::Relaxed);
        self.rx.store(0, Ordering::Relaxed);
        self.connects.store(0, Ordering::Relaxed);
        self.last_activity.store(0, Ordering::Relaxed);
    }

    pub fn tx(&self) -> u64 {
        self.tx.load(Ordering::Relaxed)
    }

    pub fn rx(&self) -> u64 {
        self.rx.load(Ordering::Relaxed)
    }

    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    /// Time of the last received message.
    pub fn last_activity(&self) -> Option<SystemTime> {
        match self.last_activity.load(Ordering::Relaxed) {
            0 => None,
            millis => Some(UNIX_EPOCH + Duration::from_millis(millis)),
        }
    }

    /// Time since the last received message.
    pub fn idle_time(&self) -> Option<Duration> {
        self.last_activity()
            .map(|at| SystemTime::now().duration_since(at).unwrap_or(Duration::ZERO))
    }

    /// `tx=.., rx=.., connects=.., last=..[, idle=..ms]`
    pub fn summary(&self) -> String {
        let last = self.last_activity.load(Ordering::Relaxed);
        let mut out = format!(
            "tx={}, rx={}, connects={}, last={last}",
            self.tx(),
            self.rx(),
            self.connects()
        );
        if let Some(idle) = self.idle_time() {
            out.push_str(&format!(", idle={}ms", idle.as_millis()));
        }
        out
    }
}

fn epoch_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
        .max(1)
}

/// Point-in-time view of an adaptor, for display and JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AdaptorStats {
    pub name: String,
    pub state: AdaptorState,
    pub connected: bool,
    pub tx: u64,
    pub rx: u64,
    pub connects: u64,
    /// Epoch milliseconds of the last received message.
    pub last_activity_ms: Option<u64>,
    pub idle_ms: Option<u64>,
}

impl AdaptorStats {
    pub(crate) fn capture(
        name: &str,
        state: AdaptorState,
        connected: bool,
        counters: &Counters,
    ) -> Self {
        let last = counters.last_activity.load(Ordering::Relaxed);
        Self {
            name: name.to_string(),
            state,
            connected,
            tx: counters.tx(),
            rx: counters.rx(),
            connects: counters.connects(),
            last_activity_ms: (last > 0).then_some(last),
            idle_ms: counters
                .idle_time()
                .map(|idle| u64::try_from(idle.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}
