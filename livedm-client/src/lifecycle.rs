//! Connection state machine.
//!
//! ```text
//! Idle --connect--> Connecting --open--> Authenticating --handshake sent--> Live
//! Live --close(manual)--> Idle
//! Live --close(unplanned, auto_reconnect)--> Reconnecting --timer--> Connecting
//! Connecting --close--> Reconnecting (same policy)
//! any --disconnect--> Closing --> Idle
//! ```

use crate::config::ReconnectPolicy;
use std::fmt;
use std::time::Duration;

/// Observable connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Authenticating,
    Live,
    Reconnecting,
    Closing,
}

impl ConnectionState {
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Live)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Live => "live",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session lifecycle bookkeeping.
///
/// `retry_count` is touched only by [`Lifecycle::on_open`] and
/// [`Lifecycle::on_close`].
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: ConnectionState,
    retry_count: u32,
    manual_close: bool,
    auto_reconnect: bool,
    policy: ReconnectPolicy,
}

impl Lifecycle {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Idle,
            retry_count: 0,
            manual_close: false,
            auto_reconnect: false,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Starts a fresh connect cycle.
    pub fn begin(&mut self, auto_reconnect: bool) {
        self.manual_close = false;
        self.auto_reconnect = auto_reconnect;
        self.state = ConnectionState::Connecting;
    }

    /// The socket reached the open state.
    pub fn on_open(&mut self) {
        self.retry_count = 0;
        self.state = ConnectionState::Authenticating;
    }

    /// The auth and first heartbeat frames were written.
    pub fn on_authenticated(&mut self) {
        if self.state == ConnectionState::Authenticating {
            self.state = ConnectionState::Live;
        }
    }

    /// The socket closed or failed to open.
    ///
    /// Returns the delay before the next attempt, or `None` when the close
    /// was manual or reconnecting is disabled.
    pub fn on_close(&mut self) -> Option<Duration> {
        if self.manual_close || !self.auto_reconnect {
            self.state = ConnectionState::Idle;
            return None;
        }

        self.retry_count = self.policy.next_retry(self.retry_count);
        self.state = ConnectionState::Reconnecting;
        Some(self.policy.delay(self.retry_count))
    }

    /// The reconnect timer fired.
    ///
    /// Returns `false` (and changes nothing) unless the session is still
    /// waiting to reconnect, so a timer outliving a disconnect is inert.
    pub fn reconnect_due(&mut self) -> bool {
        if self.state != ConnectionState::Reconnecting {
            return false;
        }
        self.state = ConnectionState::Connecting;
        true
    }

    /// Marks the next close as manual.
    pub fn begin_disconnect(&mut self) {
        self.manual_close = true;
        if self.state != ConnectionState::Idle {
            self.state = ConnectionState::Closing;
        }
    }

    /// Settles the session after a disconnect.
    pub fn finish_disconnect(&mut self) {
        self.state = ConnectionState::Idle;
    }

    /// The driver stopped for good without being asked to.
    pub fn abandon(&mut self) {
        self.state = ConnectionState::Idle;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}
