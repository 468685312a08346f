//! Session configuration.

use livedm_protocol::{AuthParams, HEARTBEAT_INTERVAL_SECS};
use std::time::Duration;

/// Default delay step between reconnect attempts.
pub const DEFAULT_RECONNECT_STEP: Duration = Duration::from_millis(1000);

/// Default cap on the retry counter.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Shortest heartbeat period a session will use.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10);

/// Linear, capped reconnect backoff.
///
/// The n-th consecutive reconnect waits `n * step`, with `n` saturating at
/// `max_retries`. There is no give-up point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub step: Duration,
    pub max_retries: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            step: DEFAULT_RECONNECT_STEP,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(step: Duration, max_retries: u32) -> Self {
        Self {
            step,
            max_retries: max_retries.max(1),
        }
    }

    /// Returns the retry counter after one more failed attempt.
    pub fn next_retry(&self, retry_count: u32) -> u32 {
        retry_count.saturating_add(1).min(self.max_retries)
    }

    /// Returns the delay before reconnecting with the given retry counter.
    pub fn delay(&self, retry_count: u32) -> Duration {
        self.step * retry_count
    }

    /// Longest delay this policy will ever produce.
    pub fn max_delay(&self) -> Duration {
        self.delay(self.max_retries)
    }
}

/// Connection target and tuning for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket URL of the push server (`wss://host/sub`).
    pub server_url: String,
    /// Real (long) room id.
    pub room_id: u64,
    /// Viewer uid, 0 when anonymous.
    pub uid: u64,
    /// Token returned by the room bootstrap call.
    pub auth_token: String,
    /// Heartbeat period.
    pub heartbeat_interval: Duration,
    /// Limit on opening the WebSocket.
    pub connect_timeout: Duration,
    /// Backoff applied after unplanned closes.
    pub reconnect: ReconnectPolicy,
}

impl SessionConfig {
    pub fn new(server_url: impl Into<String>, room_id: u64) -> Self {
        Self {
            server_url: server_url.into(),
            room_id,
            uid: 0,
            auth_token: String::new(),
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn with_uid(mut self, uid: u64) -> Self {
        self.uid = uid;
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = token.into();
        self
    }

    /// Sets the heartbeat period, raised to [`MIN_HEARTBEAT_INTERVAL`] if shorter.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval.max(MIN_HEARTBEAT_INTERVAL);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Body of the auth frame sent on every (re)connect.
    pub fn auth_params(&self) -> AuthParams {
        AuthParams::new(self.uid, self.room_id, self.auth_token.clone())
    }
}
