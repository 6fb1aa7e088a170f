#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::backoff::Constant;
use bon::Builder;

const DEFAULT_RECONNECT_DELAY_DURATION: Duration = Duration::from_secs(5);

/// Configuration for the telemetry connection manager.
#[non_exhaustive]
#[derive(Debug, Clone, Default, Builder)]
pub struct Config {
    /// Reconnection strategy configuration
    #[builder(default)]
    pub reconnect: ReconnectConfig,
    /// Upper bound on the WebSocket handshake. `None` waits for as long as the transport does.
    pub connect_timeout: Option<Duration>,
}

/// Configuration for automatic reconnection behavior.
///
/// Every reconnect waits the same fixed delay; there is no backoff growth.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct ReconnectConfig {
    /// Delay between a disconnect and the next connection attempt
    #[builder(default = DEFAULT_RECONNECT_DELAY_DURATION)]
    pub delay: Duration,
    /// Maximum number of consecutive failed attempts before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY_DURATION,
            max_attempts: None, // Infinite reconnection by default
        }
    }
}

impl From<ReconnectConfig> for Constant {
    fn from(config: ReconnectConfig) -> Self {
        Constant::new(config.delay)
    }
}
