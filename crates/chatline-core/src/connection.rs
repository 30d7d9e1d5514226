//! Push channel lifecycle state machine.
//!
//! Owns the lifecycle of the single persistent channel: connect timeouts,
//! capped exponential backoff with jitter, and the terminal `Failed` state.
//! Uses the action pattern: methods take time as input and return actions for
//! the driver to execute. The state machine never touches a socket; the
//! driver that executes [`ConnectionAction::Open`] is the socket's only owner.
//!
//! # State Machine
//!
//! ```text
//!                connect              on_open
//! ┌──────────────┐──────>┌────────────┐──────>┌───────────┐
//! │ Disconnected │       │ Connecting │       │ Connected │
//! └──────────────┘       └────────────┘       └───────────┘
//!        ^                 │      ^                 │
//!        │ disconnect      │      │ retry timer     │ on_close
//!        │ (any state)     │      │                 │
//!        │          timeout│  ┌──────────────┐      │
//!        │                 └─>│ Reconnecting │<─────┘
//!        │                    └──────────────┘
//!        │                           │ attempts exhausted
//!        │                           ↓
//!        │                      ┌────────┐
//!        └──────────────────────│ Failed │ (explicit connect to retry)
//!                               └────────┘
//! ```
//!
//! # Invariants
//!
//! - At most one socket is live. Every attempt allocates a fresh [`SocketId`];
//!   driver callbacks for any other ID are stale and ignored.
//! - `Failed` is only left through [`ConnectionManager::connect`] or
//!   [`ConnectionManager::disconnect`].

use std::{fmt, ops::Sub, time::Duration};

use chatline_proto::{Command, PushFrame};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::ConnectionError;

/// Time allowed for a connection attempt before it is abandoned.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay before the first reconnect attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Upper bound on any single reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Reconnect attempts before entering `Failed`.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Identity of one physical socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(pub u64);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket#{}", self.0)
    }
}

/// Connection state.
///
/// Exactly one instance exists per runtime. `Failed` is rendered by the UI as
/// a persistent status; recovery requires an explicit reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel and no reconnect pending.
    Disconnected,
    /// Socket opening, waiting for the open callback.
    Connecting,
    /// Channel open; commands may be sent.
    Connected,
    /// Channel lost; waiting for the backoff timer.
    Reconnecting {
        /// Consecutive failed attempts so far (1-based).
        attempt: u32,
    },
    /// Reconnect attempts exhausted.
    Failed,
}

impl ConnectionState {
    /// Commands may be sent.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Actions returned by the connection state machine.
///
/// The driver executes these:
/// - `Open`: open a socket to the push endpoint and report back with its ID
/// - `Close`: tear the socket down; no further callbacks are expected
/// - `Transmit`: write one text frame
/// - `StateChanged`: publish the new state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a new socket.
    Open {
        /// ID to tag this socket's callbacks with.
        socket: SocketId,
    },

    /// Close a socket.
    Close {
        /// Socket to close.
        socket: SocketId,
    },

    /// Write a text frame.
    Transmit {
        /// Socket to write on.
        socket: SocketId,
        /// Encoded command.
        text: String,
    },

    /// Connection state changed.
    StateChanged(ConnectionState),
}

/// Reconnect backoff configuration.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
    /// Retries before giving up.
    pub max_attempts: u32,
    /// Subtract up to half of each delay at random.
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter: true,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent).min(self.max_delay)
    }
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for a single connection attempt.
    pub connect_timeout: Duration,
    /// Reconnect policy.
    pub backoff: BackoffConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { connect_timeout: DEFAULT_CONNECT_TIMEOUT, backoff: BackoffConfig::default() }
    }
}

/// Push channel state machine.
///
/// This is a pure state machine - no I/O, no Environment storage.
/// Time is passed as parameters to methods that need it.
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug, Clone)]
pub struct ConnectionManager<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Current state
    state: ConnectionState,
    /// Configuration
    config: ConnectionConfig,
    /// Live socket while Connecting or Connected
    socket: Option<SocketId>,
    /// Next socket ID to allocate
    next_socket: u64,
    /// Consecutive failed attempts
    attempt: u32,
    /// Start of the connect attempt or of the backoff wait
    timer_since: Option<I>,
    /// Backoff delay being waited out while Reconnecting
    retry_delay: Duration,
    /// Jitter source
    rng: ChaCha8Rng,
}

impl<I> ConnectionManager<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create a manager in [`ConnectionState::Disconnected`].
    ///
    /// `seed` drives backoff jitter; pass environment randomness in
    /// production and a fixed value in simulation.
    pub fn new(config: ConnectionConfig, seed: u64) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            config,
            socket: None,
            next_socket: 1,
            attempt: 0,
            timer_since: None,
            retry_delay: Duration::ZERO,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Live socket, if Connecting or Connected.
    pub fn socket(&self) -> Option<SocketId> {
        self.socket
    }

    /// Consecutive failed attempts since the last successful open.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Time until the next reconnect attempt. `None` unless Reconnecting.
    pub fn retry_in(&self, now: I) -> Option<Duration> {
        match (self.state, self.timer_since) {
            (ConnectionState::Reconnecting { .. }, Some(since)) => {
                Some(self.retry_delay.saturating_sub(now - since))
            },
            _ => None,
        }
    }

    /// Establish the channel.
    ///
    /// No-op while Connecting or Connected. From Reconnecting the pending
    /// timer is cancelled and an attempt starts immediately; from Failed or
    /// Disconnected the attempt count starts over.
    pub fn connect(&mut self, now: I) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                tracing::debug!(state = ?self.state, "connect ignored");
                vec![]
            },
            ConnectionState::Disconnected
            | ConnectionState::Reconnecting { .. }
            | ConnectionState::Failed => {
                self.attempt = 0;
                self.open(now)
            },
        }
    }

    /// Tear the channel down. Safe from any state.
    ///
    /// Cancels any pending reconnect timer.
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();

        if let Some(socket) = self.socket.take() {
            actions.push(ConnectionAction::Close { socket });
        }

        self.timer_since = None;
        self.attempt = 0;

        if self.state != ConnectionState::Disconnected {
            tracing::info!("channel disconnected");
            self.state = ConnectionState::Disconnected;
            actions.push(ConnectionAction::StateChanged(self.state));
        }

        actions
    }

    /// Driver reports the socket opened.
    pub fn on_open(&mut self, socket: SocketId) -> Vec<ConnectionAction> {
        if self.socket != Some(socket) || self.state != ConnectionState::Connecting {
            tracing::debug!(%socket, state = ?self.state, "ignoring open of stale socket");
            return vec![];
        }

        tracing::info!(%socket, after_attempts = self.attempt, "channel connected");
        self.state = ConnectionState::Connected;
        self.attempt = 0;
        self.timer_since = None;

        vec![ConnectionAction::StateChanged(self.state)]
    }

    /// Driver reports the socket closed or errored.
    pub fn on_close(&mut self, socket: SocketId, now: I, reason: &str) -> Vec<ConnectionAction> {
        if self.socket != Some(socket) {
            tracing::debug!(%socket, reason, "ignoring close of stale socket");
            return vec![];
        }

        tracing::warn!(%socket, reason, state = ?self.state, "channel lost");
        self.socket = None;
        self.schedule_retry(now)
    }

    /// Process periodic maintenance (connect timeout and reconnect timer).
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        let Some(since) = self.timer_since else {
            return vec![];
        };
        let elapsed = now - since;

        match self.state {
            ConnectionState::Connecting if elapsed > self.config.connect_timeout => {
                let mut actions = Vec::new();
                if let Some(socket) = self.socket.take() {
                    tracing::warn!(%socket, ?elapsed, "connect attempt timed out");
                    actions.push(ConnectionAction::Close { socket });
                }
                actions.extend(self.schedule_retry(now));
                actions
            },
            ConnectionState::Reconnecting { attempt } if elapsed >= self.retry_delay => {
                tracing::info!(attempt, "reconnecting");
                self.open(now)
            },
            _ => vec![],
        }
    }

    /// Encode a command for transmission.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::NotConnected` unless Connected. The caller decides
    ///   whether to queue or drop.
    /// - `ConnectionError::Protocol` if the command cannot be encoded
    pub fn send(&self, command: &Command) -> Result<Vec<ConnectionAction>, ConnectionError> {
        match (self.state, self.socket) {
            (ConnectionState::Connected, Some(socket)) => {
                let text = command.encode()?;
                Ok(vec![ConnectionAction::Transmit { socket, text }])
            },
            (state, _) => Err(ConnectionError::NotConnected { state }),
        }
    }

    /// Decode an inbound text frame from `socket`.
    ///
    /// Malformed frames and frames of unknown type are logged and dropped;
    /// frames from stale sockets are ignored.
    pub fn receive(&self, socket: SocketId, text: &str) -> Option<PushFrame> {
        if self.socket != Some(socket) {
            tracing::debug!(%socket, "ignoring frame from stale socket");
            return None;
        }

        match PushFrame::decode(text) {
            Ok(frame) => Some(frame),
            Err(e) if e.is_malformed() => {
                tracing::warn!(%socket, error = %e, "dropping malformed push frame");
                None
            },
            Err(e) => {
                tracing::debug!(%socket, error = %e, "ignoring push frame");
                None
            },
        }
    }

    fn open(&mut self, now: I) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();

        // Only reachable from states without a live socket, but make sure the
        // previous one is gone before its successor exists.
        if let Some(previous) = self.socket.take() {
            actions.push(ConnectionAction::Close { socket: previous });
        }

        let socket = SocketId(self.next_socket);
        self.next_socket += 1;
        self.socket = Some(socket);
        self.state = ConnectionState::Connecting;
        self.timer_since = Some(now);

        actions.push(ConnectionAction::Open { socket });
        actions.push(ConnectionAction::StateChanged(self.state));
        actions
    }

    fn schedule_retry(&mut self, now: I) -> Vec<ConnectionAction> {
        self.attempt += 1;

        if self.attempt > self.config.backoff.max_attempts {
            tracing::error!(attempts = self.attempt - 1, "reconnect attempts exhausted");
            self.state = ConnectionState::Failed;
            self.timer_since = None;
            return vec![ConnectionAction::StateChanged(self.state)];
        }

        self.retry_delay = self.jittered_delay(self.attempt);
        self.timer_since = Some(now);
        self.state = ConnectionState::Reconnecting { attempt: self.attempt };
        tracing::info!(attempt = self.attempt, delay = ?self.retry_delay, "reconnect scheduled");

        vec![ConnectionAction::StateChanged(self.state)]
    }

    fn jittered_delay(&mut self, attempt: u32) -> Duration {
        let delay = self.config.backoff.delay_for(attempt);
        if !self.config.backoff.jitter {
            return delay;
        }

        let span = (delay / 2).as_millis() as u64;
        let jitter = if span == 0 { 0 } else { self.rng.gen_range(0..=span) };
        delay.saturating_sub(Duration::from_millis(jitter))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn no_jitter() -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: Duration::from_secs(5),
            backoff: BackoffConfig {
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(8),
                max_attempts: 3,
                jitter: false,
            },
        }
    }

    fn opened_socket(actions: &[ConnectionAction]) -> SocketId {
        actions
            .iter()
            .find_map(|a| match a {
                ConnectionAction::Open { socket } => Some(*socket),
                _ => None,
            })
            .unwrap()
    }

    fn connected(t0: Instant) -> (ConnectionManager<Instant>, SocketId) {
        let mut conn = ConnectionManager::new(no_jitter(), 7);
        let socket = opened_socket(&conn.connect(t0));
        conn.on_open(socket);
        (conn, socket)
    }

    #[test]
    fn connection_lifecycle() {
        let t0 = Instant::now();
        let mut conn = ConnectionManager::new(no_jitter(), 7);
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        let actions = conn.connect(t0);
        let socket = opened_socket(&actions);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(actions.contains(&ConnectionAction::StateChanged(ConnectionState::Connecting)));

        let actions = conn.on_open(socket);
        assert_eq!(actions, vec![ConnectionAction::StateChanged(ConnectionState::Connected)]);

        let actions = conn.disconnect();
        assert_eq!(actions, vec![
            ConnectionAction::Close { socket },
            ConnectionAction::StateChanged(ConnectionState::Disconnected)
        ]);
    }

    #[test]
    fn connect_is_idempotent() {
        let t0 = Instant::now();
        let mut conn = ConnectionManager::new(no_jitter(), 7);
        let first = conn.connect(t0);
        assert!(!first.is_empty());
        assert!(conn.connect(t0).is_empty());

        conn.on_open(opened_socket(&first));
        assert!(conn.connect(t0).is_empty());
    }

    #[test]
    fn connect_timeout_moves_to_reconnecting() {
        let t0 = Instant::now();
        let mut conn = ConnectionManager::new(no_jitter(), 7);
        let socket = opened_socket(&conn.connect(t0));

        assert!(conn.tick(t0 + Duration::from_secs(5)).is_empty());

        let actions = conn.tick(t0 + Duration::from_secs(6));
        assert_eq!(actions, vec![
            ConnectionAction::Close { socket },
            ConnectionAction::StateChanged(ConnectionState::Reconnecting { attempt: 1 })
        ]);

        // Late open of the abandoned socket is ignored.
        assert!(conn.on_open(socket).is_empty());
        assert_eq!(conn.state(), ConnectionState::Reconnecting { attempt: 1 });
    }

    #[test]
    fn close_schedules_backoff_then_reopens() {
        let t0 = Instant::now();
        let (mut conn, socket) = connected(t0);

        let actions = conn.on_close(socket, t0, "reset");
        assert_eq!(actions, vec![ConnectionAction::StateChanged(ConnectionState::Reconnecting {
            attempt: 1
        })]);
        assert_eq!(conn.retry_in(t0), Some(Duration::from_secs(1)));

        assert!(conn.tick(t0 + Duration::from_millis(999)).is_empty());

        let actions = conn.tick(t0 + Duration::from_secs(1));
        let next = opened_socket(&actions);
        assert_ne!(next, socket);
        assert_eq!(conn.state(), ConnectionState::Connecting);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let config = no_jitter().backoff;
        assert_eq!(config.delay_for(1), Duration::from_secs(1));
        assert_eq!(config.delay_for(2), Duration::from_secs(2));
        assert_eq!(config.delay_for(3), Duration::from_secs(4));
        assert_eq!(config.delay_for(4), Duration::from_secs(8));
        assert_eq!(config.delay_for(10), Duration::from_secs(8));
        assert_eq!(config.delay_for(u32::MAX), Duration::from_secs(8));
    }

    #[test]
    fn jitter_stays_within_half_delay() {
        let mut config = no_jitter();
        config.backoff.jitter = true;
        let mut conn: ConnectionManager<Instant> = ConnectionManager::new(config, 99);

        for attempt in 1..=6 {
            let full = conn.config.backoff.delay_for(attempt);
            let jittered = conn.jittered_delay(attempt);
            assert!(jittered <= full);
            assert!(jittered >= full / 2);
        }
    }

    #[test]
    fn exhausted_attempts_fail_until_explicit_connect() {
        let mut now = Instant::now();
        let (mut conn, mut socket) = connected(now);

        for attempt in 1..=3 {
            conn.on_close(socket, now, "reset");
            assert_eq!(conn.state(), ConnectionState::Reconnecting { attempt });
            now += Duration::from_secs(60);
            socket = opened_socket(&conn.tick(now));
        }

        let actions = conn.on_close(socket, now, "reset");
        assert_eq!(actions, vec![ConnectionAction::StateChanged(ConnectionState::Failed)]);

        // Failed is terminal for timers.
        now += Duration::from_secs(3600);
        assert!(conn.tick(now).is_empty());
        assert_eq!(conn.state(), ConnectionState::Failed);

        let actions = conn.connect(now);
        assert!(matches!(actions.as_slice(), [
            ConnectionAction::Open { .. },
            ConnectionAction::StateChanged(ConnectionState::Connecting)
        ]));
        assert_eq!(conn.attempt(), 0);
    }

    #[test]
    fn disconnect_cancels_reconnect_timer() {
        let t0 = Instant::now();
        let (mut conn, socket) = connected(t0);
        conn.on_close(socket, t0, "reset");

        let actions = conn.disconnect();
        assert_eq!(actions, vec![ConnectionAction::StateChanged(ConnectionState::Disconnected)]);
        assert!(conn.tick(t0 + Duration::from_secs(3600)).is_empty());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_when_disconnected_is_noop() {
        let mut conn: ConnectionManager<Instant> = ConnectionManager::new(no_jitter(), 7);
        assert!(conn.disconnect().is_empty());
    }

    #[test]
    fn explicit_connect_while_reconnecting_attempts_immediately() {
        let t0 = Instant::now();
        let (mut conn, socket) = connected(t0);
        conn.on_close(socket, t0, "reset");

        let actions = conn.connect(t0);
        assert!(matches!(actions.first(), Some(ConnectionAction::Open { .. })));
        assert_eq!(conn.attempt(), 0);
    }

    #[test]
    fn send_requires_connected() {
        let t0 = Instant::now();
        let mut conn = ConnectionManager::new(no_jitter(), 7);
        let command = Command::MarkAsRead { chat_id: 1 };

        assert_eq!(
            conn.send(&command),
            Err(ConnectionError::NotConnected { state: ConnectionState::Disconnected })
        );

        let socket = opened_socket(&conn.connect(t0));
        assert!(matches!(conn.send(&command), Err(ConnectionError::NotConnected { .. })));

        conn.on_open(socket);
        let actions = conn.send(&command).unwrap();
        assert!(matches!(
            actions.as_slice(),
            [ConnectionAction::Transmit { socket: s, text }] if *s == socket && text.contains("mark_as_read")
        ));
    }

    #[test]
    fn receive_drops_malformed_and_stale_frames() {
        let t0 = Instant::now();
        let (conn, socket) = connected(t0);
        let good = r#"{"type":"chat.message","chat_id":1,"message":{"id":5,"content":"x","sender":{"id":2,"username":"b"},"timestamp":"2024-01-01T00:00:00Z"}}"#;

        assert!(conn.receive(socket, good).is_some());
        assert!(conn.receive(socket, "{not json").is_none());
        assert!(conn.receive(socket, r#"{"type":"chat.typing"}"#).is_none());
        assert!(conn.receive(SocketId(socket.0 + 100), good).is_none());
    }

    #[test]
    fn stale_close_is_ignored() {
        let t0 = Instant::now();
        let (mut conn, socket) = connected(t0);
        assert!(conn.on_close(SocketId(socket.0 + 1), t0, "other").is_empty());
        assert_eq!(conn.state(), ConnectionState::Connected);
    }
}
