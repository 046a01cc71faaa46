use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use isolink_channel::{ChannelConfig, NacChannel};
use isolink_field::{Packager, PackagerConfig};
use isolink_frame::MAX_FRAME_LENGTH;
use serde::{Deserialize, Serialize};

use crate::error::{AdaptorError, Result};

/// Adaptor configuration, loaded from JSON with kebab-case keys.
///
/// Durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AdaptorConfig {
    pub name: String,
    /// Queue the Sender takes outgoing messages from.
    #[serde(default, rename = "in")]
    pub input: Option<String>,
    /// Queue the Receiver publishes incoming messages to.
    #[serde(default, rename = "out")]
    pub output: Option<String>,
    /// Run without a Receiver.
    #[serde(default)]
    pub write_only: bool,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay: u64,
    /// Send keep-alive frames when `in` stays empty for a reconnect-delay.
    #[serde(default)]
    pub keep_alive: bool,
    /// Keep the connection on protocol errors.
    #[serde(default)]
    pub ignore_iso_exceptions: bool,
    /// Expiry of messages published to `out`; `0` keeps them forever.
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub wait_for_workers_on_stop: bool,
    /// Drain window after a stop request; `0` disconnects at once.
    #[serde(default)]
    pub soft_stop: i64,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub packager: PackagerConfig,
    #[serde(skip)]
    pub timings: PumpTimings,
}

/// Fixed pump pacing. Not part of the file format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpTimings {
    /// Sender idle step while a reconnect is pending.
    pub reconnect_poll: Duration,
    /// Sleep after an error before the next pump cycle.
    pub error_backoff: Duration,
    /// How long the Receiver waits on the ready signal per cycle.
    pub ready_poll: Duration,
    /// Expiry given to a sentinel pushed back for another adaptor.
    pub foreign_sentinel_ttl: Duration,
    /// Sender sleep after pushing back a foreign sentinel.
    pub foreign_sentinel_backoff: Duration,
    /// Lower bound for waiting on workers at stop.
    pub min_stop_wait: Duration,
}

impl Default for PumpTimings {
    fn default() -> Self {
        Self {
            reconnect_poll: Duration::from_secs(1),
            error_backoff: Duration::from_secs(1),
            ready_poll: Duration::from_secs(5),
            foreign_sentinel_ttl: Duration::from_millis(500),
            foreign_sentinel_backoff: Duration::from_secs(1),
            min_stop_wait: Duration::from_secs(5),
        }
    }
}

fn default_reconnect_delay() -> u64 {
    10_000
}

impl AdaptorConfig {
    /// Minimal configuration for a named adaptor on the given queues.
    pub fn new(name: impl Into<String>, input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: Some(input.into()),
            output: Some(output.into()),
            write_only: false,
            reconnect_delay: default_reconnect_delay(),
            keep_alive: false,
            ignore_iso_exceptions: false,
            timeout: 0,
            wait_for_workers_on_stop: false,
            soft_stop: 0,
            channel: ChannelConfig::default(),
            packager: PackagerConfig::default(),
            timings: PumpTimings::default(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| AdaptorError::Configuration(format!("{}: {err}", path.display())))?;
        Self::from_json(&text)
    }

    /// Check the settings the pumps rely on.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AdaptorError::Configuration("adaptor name is empty".to_string()));
        }
        if self.soft_stop < 0 {
            return Err(AdaptorError::Configuration(format!(
                "soft-stop must be >= 0 (got {})",
                self.soft_stop
            )));
        }
        if self.reconnect_delay == 0 {
            return Err(AdaptorError::Configuration(
                "reconnect-delay must be > 0".to_string(),
            ));
        }
        if self.channel.max_packet_length > MAX_FRAME_LENGTH {
            return Err(AdaptorError::Configuration(format!(
                "max-packet-length must be <= {MAX_FRAME_LENGTH} (got {})",
                self.channel.max_packet_length
            )));
        }
        if !has_name(&self.input) {
            return Err(AdaptorError::Configuration(format!(
                "adaptor {:?}: 'in' queue is required",
                self.name
            )));
        }
        if !self.write_only && !has_name(&self.output) {
            return Err(AdaptorError::Configuration(format!(
                "adaptor {:?}: 'out' queue is required unless write-only",
                self.name
            )));
        }
        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay)
    }

    /// Soft-stop window; zero when disabled.
    pub fn soft_stop(&self) -> Duration {
        Duration::from_millis(u64::try_from(self.soft_stop).unwrap_or(0))
    }

    /// Expiry for messages published to `out`.
    pub fn delivery_timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_millis(self.timeout))
    }

    /// Build the packager described by the `packager` section.
    pub fn build_packager(&self) -> Result<Packager> {
        Ok(Packager::from_config(&self.packager)?)
    }

    /// Build a disconnected [`NacChannel`] from the `channel` and `packager`
    /// sections.
    pub fn build_channel(&self) -> Result<NacChannel> {
        let packager = Arc::new(self.build_packager()?);
        Ok(NacChannel::new(
            self.name.clone(),
            self.channel.clone(),
            packager,
        )?)
    }
}

fn has_name(queue: &Option<String>) -> bool {
    queue.as_deref().is_some_and(|name| !name.trim().is_empty())
}
