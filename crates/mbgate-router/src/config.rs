use std::time::Duration;

use mbgate_frame::FrameConfig;

/// Default socket path for the gateway.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/mbgate.sock";

/// Reply endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Pause between polls when no request is ready.
    pub poll_interval: Duration,
    pub max_payload_size: usize,
    pub write_timeout: Option<Duration>,
    /// Clients served at once; further peers wait in the listen backlog.
    pub max_clients: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_payload_size: mbgate_frame::DEFAULT_MAX_PAYLOAD,
            write_timeout: Some(Duration::from_secs(5)),
            max_clients: 16,
        }
    }
}

impl EndpointConfig {
    pub(crate) fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
            read_timeout: None,
            write_timeout: self.write_timeout,
        }
    }
}

/// Retry schedule for binding the listening endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindPolicy {
    /// Attempts after the first one.
    pub retries: u32,
    pub base_delay: Duration,
}

impl Default for BindPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl BindPolicy {
    /// Delay before retry number `attempt` (1-based): `base_delay * attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Request client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// How long to wait for the reply.
    pub timeout: Duration,
    pub max_payload_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_payload_size: mbgate_frame::DEFAULT_MAX_PAYLOAD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_linear() {
        let policy = BindPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(600));
    }

    #[test]
    fn endpoint_reads_do_not_block() {
        let config = EndpointConfig::default();
        assert_eq!(config.frame_config().read_timeout, None);
        assert_eq!(config.frame_config().write_timeout, config.write_timeout);
        assert!(config.max_clients > 1);
    }
}
