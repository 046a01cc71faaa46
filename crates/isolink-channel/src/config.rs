use std::time::Duration;

use isolink_frame::MAX_FRAME_LENGTH;
use serde::{Deserialize, Serialize};

/// Connection settings for a [`NacChannel`](crate::NacChannel).
///
/// Durations are milliseconds; `0` disables the corresponding timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChannelConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    /// Default transport header as a decimal-digit string, e.g. `"6000010000"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    /// Exchange TPDU source and destination on every send.
    #[serde(default = "default_true")]
    pub tpdu_swap: bool,
    /// Socket read/write timeout.
    #[serde(default)]
    pub timeout: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_max_packet_length")]
    pub max_packet_length: usize,
}

impl ChannelConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Socket timeout, `None` when disabled.
    pub fn socket_timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_millis(self.timeout))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
            header: None,
            tpdu_swap: true,
            timeout: 0,
            connect_timeout: default_connect_timeout(),
            max_packet_length: default_max_packet_length(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    5_000
}

fn default_max_packet_length() -> usize {
    MAX_FRAME_LENGTH
}
