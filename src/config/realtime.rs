use anyhow::{anyhow, Result};
use std::time::Duration;

use super::env_or_parse;

/// Tuning knobs for live connection delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// Slots in each device's outbound queue.
    pub queue_capacity: usize,
    /// Upper bound a single device send may wait for queue space.
    pub send_timeout: Duration,
    /// Connections without activity for longer than this are reaped.
    pub idle_timeout: Duration,
    pub reap_interval: Duration,
    /// Keep-alive period on idle streams; must stay well under `idle_timeout`.
    pub heartbeat_interval: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            send_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(120),
            reap_interval: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}

impl RealtimeConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            queue_capacity: env_or_parse("REALTIME_QUEUE_CAPACITY", "100")?,
            send_timeout: Duration::from_millis(env_or_parse("REALTIME_SEND_TIMEOUT_MS", "5000")?),
            idle_timeout: Duration::from_secs(env_or_parse(
                "REALTIME_IDLE_TIMEOUT_SECONDS",
                "120",
            )?),
            reap_interval: Duration::from_secs(env_or_parse(
                "REALTIME_REAP_INTERVAL_SECONDS",
                "30",
            )?),
            heartbeat_interval: Duration::from_secs(env_or_parse(
                "REALTIME_HEARTBEAT_SECONDS",
                "15",
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(anyhow!("invalid REALTIME_QUEUE_CAPACITY: must be at least 1"));
        }
        if self.send_timeout.is_zero() {
            return Err(anyhow!("invalid REALTIME_SEND_TIMEOUT_MS: must be positive"));
        }
        if self.reap_interval.is_zero() {
            return Err(anyhow!("invalid REALTIME_REAP_INTERVAL_SECONDS: must be positive"));
        }
        if self.heartbeat_interval.is_zero() || self.heartbeat_interval >= self.idle_timeout {
            return Err(anyhow!(
                "invalid REALTIME_HEARTBEAT_SECONDS: must be positive and below the idle timeout"
            ));
        }
        Ok(())
    }
}
