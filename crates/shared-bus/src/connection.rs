//! # Connection Lifecycle
//!
//! An explicitly owned broker connection with a small state machine:
//!
//! ```text
//!   ┌──────────────┐  channel()  ┌────────────┐   ok   ┌───────────┐
//!   │ DISCONNECTED │ ──────────► │ CONNECTING │ ─────► │ CONNECTED │
//!   └──────────────┘             └────────────┘        └───────────┘
//!          ▲                            │ attempts            │
//!          │                            │ exhausted           │ invalidate()
//!          └────────────────────────────┴─────────────────────┘
//!
//!   close() from any state ──► CLOSED (terminal)
//! ```
//!
//! Every component that talks to the broker holds an
//! `Arc<ConnectionManager>` and asks it for a channel per operation. A
//! failed operation invalidates the channel it used; the next `channel()`
//! call reconnects with exponential backoff.

use crate::channel::{same_channel, Connector, MessageChannel};
use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Reconnect backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt.
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Attempts per reconnect cycle before giving up.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(scaled.max(0.0))
    }

    /// Reason the policy is unusable, if any.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1");
        }
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err("multiplier must be >= 1.0");
        }
        if self.initial_delay > self.max_delay {
            return Err("initial_delay must not exceed max_delay");
        }
        Ok(())
    }
}

/// Owns the broker connection and reconnects on demand.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    backoff: BackoffPolicy,
    /// Serialises connects; holds the live channel.
    channel: Mutex<Option<Arc<dyn MessageChannel>>>,
    state: parking_lot::Mutex<ConnectionState>,
    connects: AtomicU64,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, backoff: BackoffPolicy) -> Self {
        Self {
            connector,
            backoff,
            channel: Mutex::new(None),
            state: parking_lot::Mutex::new(ConnectionState::Disconnected),
            connects: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Successful connects so far, including the first.
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    fn transition(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!(from = %*state, to = %next, "Connection state change");
            *state = next;
        }
    }

    /// The live channel, reconnecting with backoff if needed.
    ///
    /// Concurrent callers wait for a single reconnect attempt.
    pub async fn channel(&self) -> Result<Arc<dyn MessageChannel>, TransportError> {
        let mut slot = self.channel.lock().await;
        if self.state() == ConnectionState::Closed {
            return Err(TransportError::Closed);
        }
        if let Some(channel) = slot.as_ref() {
            if channel.is_open() {
                return Ok(channel.clone());
            }
            warn!("Broker channel lost; reconnecting");
            *slot = None;
        }

        self.transition(ConnectionState::Connecting);
        let mut attempt = 0;
        loop {
            match self.connector.connect().await {
                Ok(channel) => {
                    *slot = Some(channel.clone());
                    self.connects.fetch_add(1, Ordering::Relaxed);
                    self.transition(ConnectionState::Connected);
                    info!(attempts = attempt + 1, "Connected to broker");
                    return Ok(channel);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.backoff.max_attempts {
                        self.transition(ConnectionState::Disconnected);
                        warn!(attempts = attempt, error = %e, "Giving up connecting to broker");
                        return Err(e);
                    }
                    let delay = self.backoff.delay_for(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Broker connect failed; backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Forget `failed` after an operation on it errored.
    ///
    /// A newer channel opened by another task in the meantime is kept.
    pub async fn invalidate(&self, failed: &Arc<dyn MessageChannel>) {
        let mut slot = self.channel.lock().await;
        let is_current = slot
            .as_ref()
            .is_some_and(|current| same_channel(current, failed));
        if is_current {
            *slot = None;
            if self.state() != ConnectionState::Closed {
                self.transition(ConnectionState::Disconnected);
            }
            debug!("Broker channel invalidated");
        }
    }

    /// Close for good. Later `channel()` calls fail with `Closed`.
    pub async fn close(&self) {
        let mut slot = self.channel.lock().await;
        *slot = None;
        self.transition(ConnectionState::Closed);
        info!("Broker connection closed");
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("connects", &self.connects())
            .field("backoff", &self.backoff)
            .finish()
    }
}
