//! Connection state, reconnect policy and the transport seam.
//!
//! This module provides the shared types; the socket itself is opened through
//! a [`Connector`], either the tokio-tungstenite one or the in-memory
//! [`MockConnector`] used by tests.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use fixline_shared::Envelope;
use rand::Rng;

mod mock;
mod transport;

pub use mock::{MockConnector, MockServer};
pub use transport::{CloseInfo, Connector, Frame, Transport, TransportError, TungsteniteConnector};

/// Connection state of the event stream. Exactly one value is live per client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt
    pub initial_delay: Duration,
    /// Upper bound for the un-jittered delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Consecutive failures tolerated before cooling down (0 = never cool down)
    pub max_attempts: u32,
    /// Pause after `max_attempts` failures, after which the counter resets
    pub cooldown: Duration,
    /// Relative jitter; 0.1 draws the factor from [0.9, 1.1]
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30000),
            backoff_multiplier: 1.5,
            max_attempts: 10,
            cooldown: Duration::from_millis(60000),
            jitter: 0.1,
        }
    }
}

impl ReconnectConfig {
    /// Un-jittered delay for a 1-based attempt number:
    /// `min(initial * multiplier^(attempt-1), max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.initial_delay.as_secs_f64() * 1000.0;
        let delay_ms = base_ms * self.backoff_multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_secs_f64() * 1000.0);
        Duration::from_secs_f64(capped_ms.max(0.0) / 1000.0)
    }

    /// Apply jitter drawn uniformly from `[1 - jitter, 1 + jitter]`.
    pub fn jittered(&self, delay: Duration, rng: &mut impl Rng) -> Duration {
        let spread = self.jitter.clamp(0.0, 1.0);
        let factor = rng.gen_range((1.0 - spread)..=(1.0 + spread));
        delay.mul_f64(factor)
    }
}

/// What the reconnect loop should do after a failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconnectStep {
    Retry { attempt: u32, delay: Duration },
    Cooldown { cooldown: Duration },
}

/// Attempt counter plus the configuration it is evaluated against.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Record a failed connection and decide when to try again.
    pub fn on_failure(&mut self) -> ReconnectStep {
        self.on_failure_with(&mut rand::thread_rng())
    }

    pub fn on_failure_with(&mut self, rng: &mut impl Rng) -> ReconnectStep {
        self.attempt = self.attempt.saturating_add(1);
        if self.config.max_attempts > 0 && self.attempt > self.config.max_attempts {
            return ReconnectStep::Cooldown {
                cooldown: self.config.cooldown,
            };
        }
        let delay = self.config.delay_for_attempt(self.attempt);
        ReconnectStep::Retry {
            attempt: self.attempt,
            delay: self.config.jittered(delay, rng),
        }
    }
}

/// Why the event stream went down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer sent a close frame, or the stream ended without one (1006).
    Closed { code: u16, reason: String },
    /// Transport-level failure.
    Error(String),
    /// The connect deadline elapsed before the handshake finished.
    Timeout,
    /// `disconnect()` was called.
    ClientRequest,
}

impl DisconnectReason {
    /// Whether the close was initiated and completed cleanly by either side.
    pub fn was_clean(&self) -> bool {
        matches!(
            self,
            DisconnectReason::ClientRequest | DisconnectReason::Closed { code: 1000, .. }
        )
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Closed { code, reason } if reason.is_empty() => {
                write!(f, "closed with code {}", code)
            }
            DisconnectReason::Closed { code, reason } => {
                write!(f, "closed with code {}: {}", code, reason)
            }
            DisconnectReason::Error(msg) => write!(f, "transport error: {}", msg),
            DisconnectReason::Timeout => write!(f, "connection attempt timed out"),
            DisconnectReason::ClientRequest => write!(f, "disconnected by user"),
        }
    }
}

/// Events published on the client's broadcast channel.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Connected,
    Disconnected { reason: DisconnectReason },
    Message(Arc<Envelope>),
}
