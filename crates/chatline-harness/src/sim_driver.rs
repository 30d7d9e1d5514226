//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the production WebSocket driver
//! but for deterministic testing. It implements [`Driver`] so the same
//! [`chatline_client::Runtime`] orchestration code runs in both production
//! and simulation. Sockets never open on their own: the test decides when an
//! open, a frame, a close, or a REST response happens.

use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chatline_client::{Driver, DriverEvent, UiCommand};
use chatline_core::{
    Environment, FetchRequest, FetchResponse, SocketId, StoreSnapshot, TransportError,
};
use serde_json::Value;
use thiserror::Error;

use crate::{
    SimEnv, SimInstant,
    invariants::{InvariantRegistry, SystemSnapshot},
};

/// Error type for simulation driver.
#[derive(Debug, Clone, Error)]
#[error("SimDriverError: {0}")]
pub struct SimDriverError(pub String);

/// Shared state for event injection and effect capture.
#[derive(Default)]
struct SharedState {
    pending_events: VecDeque<DriverEvent>,
    live_sockets: HashSet<SocketId>,
    opened: Vec<SocketId>,
    closed: Vec<SocketId>,
    sent: Vec<(SocketId, String)>,
    fetches: Vec<FetchRequest>,
    snapshots: Vec<Arc<StoreSnapshot>>,
    fail_opens: bool,
    fail_writes: bool,
    stopped: bool,
}

/// Simulation driver for deterministic testing.
///
/// Cloning yields another handle onto the same state, so a test can keep one
/// clone for scripting while the runtime owns the other.
#[derive(Clone)]
pub struct SimDriver {
    state: Arc<Mutex<SharedState>>,
    env: SimEnv,
    invariants: Option<Arc<InvariantRegistry>>,
}

impl SimDriver {
    /// Create a driver reading time from `env`.
    pub fn new(env: SimEnv) -> Self {
        Self { state: Arc::new(Mutex::new(SharedState::default())), env, invariants: None }
    }

    /// Check every published snapshot against `registry`.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = Some(Arc::new(registry));
        self
    }

    /// The environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Queue an event.
    pub fn inject(&self, event: DriverEvent) {
        tracing::trace!(?event, "scripted event");
        self.lock().pending_events.push_back(event);
    }

    /// Queue a UI command.
    pub fn inject_ui(&self, command: UiCommand) {
        self.inject(DriverEvent::Ui(command));
    }

    /// Queue a tick.
    pub fn inject_tick(&self) {
        self.inject(DriverEvent::Tick);
    }

    /// Queue the successful open of the most recently opened socket.
    ///
    /// Returns that socket.
    pub fn accept_last(&self) -> Option<SocketId> {
        let socket = self.last_opened()?;
        self.inject(DriverEvent::SocketOpened(socket));
        Some(socket)
    }

    /// Queue a server frame on `socket`.
    pub fn inject_text(&self, socket: SocketId, text: impl Into<String>) {
        self.inject(DriverEvent::SocketText { socket, text: text.into() });
    }

    /// Queue a close of `socket`.
    pub fn inject_close(&self, socket: SocketId, reason: &str) {
        self.lock().live_sockets.remove(&socket);
        self.inject(DriverEvent::SocketClosed { socket, reason: reason.to_string() });
    }

    /// Queue a successful response to `request`.
    pub fn respond(&self, request: FetchRequest, body: Value) {
        self.inject(DriverEvent::Fetched(FetchResponse { request, result: Ok(body) }));
    }

    /// Queue a failed response to `request`.
    pub fn respond_err(&self, request: FetchRequest, error: TransportError) {
        self.inject(DriverEvent::Fetched(FetchResponse { request, result: Err(error) }));
    }

    /// Make `open_socket` fail.
    pub fn set_fail_opens(&self, fail: bool) {
        self.lock().fail_opens = fail;
    }

    /// Make `send_text` fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Most recently opened socket.
    pub fn last_opened(&self) -> Option<SocketId> {
        self.lock().opened.last().copied()
    }

    /// All sockets opened so far, in order.
    pub fn opened(&self) -> Vec<SocketId> {
        self.lock().opened.clone()
    }

    /// All sockets closed by the runtime so far, in order.
    pub fn closed(&self) -> Vec<SocketId> {
        self.lock().closed.clone()
    }

    /// Take all frames written so far.
    pub fn take_sent(&self) -> Vec<(SocketId, String)> {
        std::mem::take(&mut self.lock().sent)
    }

    /// Take all REST requests started so far.
    pub fn take_fetches(&self) -> Vec<FetchRequest> {
        std::mem::take(&mut self.lock().fetches)
    }

    /// Latest published snapshot.
    pub fn latest_snapshot(&self) -> Option<Arc<StoreSnapshot>> {
        self.lock().snapshots.last().cloned()
    }

    /// Number of snapshots published.
    pub fn publish_count(&self) -> usize {
        self.lock().snapshots.len()
    }

    /// Check if there are pending events to process.
    pub fn has_pending(&self) -> bool {
        !self.lock().pending_events.is_empty()
    }

    /// `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Instant = SimInstant;

    async fn poll_event(&mut self) -> Result<Option<DriverEvent>, Self::Error> {
        Ok(self.lock().pending_events.pop_front())
    }

    fn open_socket(&mut self, socket: SocketId) -> Result<(), Self::Error> {
        let mut state = self.lock();
        if state.fail_opens {
            tracing::debug!(%socket, "simulated open failure");
            return Err(SimDriverError(format!("refusing to open {socket}")));
        }
        tracing::debug!(%socket, "sim socket opened");
        state.opened.push(socket);
        state.live_sockets.insert(socket);
        Ok(())
    }

    fn close_socket(&mut self, socket: SocketId) {
        let mut state = self.lock();
        state.live_sockets.remove(&socket);
        state.closed.push(socket);
    }

    async fn send_text(&mut self, socket: SocketId, text: String) -> Result<(), Self::Error> {
        let mut state = self.lock();
        if state.fail_writes {
            tracing::debug!(%socket, "simulated write failure");
            return Err(SimDriverError(format!("write to {socket} failed")));
        }
        if !state.live_sockets.contains(&socket) {
            return Err(SimDriverError(format!("{socket} is not open")));
        }
        state.sent.push((socket, text));
        Ok(())
    }

    fn fetch(&mut self, request: FetchRequest) -> Result<(), Self::Error> {
        tracing::trace!(path = %request.path(), request_id = request.request_id(), "sim fetch recorded");
        self.lock().fetches.push(request);
        Ok(())
    }

    fn now(&self) -> Self::Instant {
        self.env.now()
    }

    fn publish(&mut self, snapshot: Arc<StoreSnapshot>) {
        if let Some(registry) = &self.invariants {
            registry.assert_all(&SystemSnapshot::from_published(&snapshot), "after publish");
        }
        self.lock().snapshots.push(snapshot);
    }

    fn stop(&mut self) {
        let mut state = self.lock();
        state.live_sockets.clear();
        state.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_event_queues_event() {
        let driver = SimDriver::new(SimEnv::default());
        driver.inject_ui(UiCommand::Open(100));

        assert!(driver.has_pending());
    }

    #[tokio::test]
    async fn writes_require_live_socket() {
        let mut driver = SimDriver::new(SimEnv::default());
        let socket = SocketId(1);

        assert!(driver.send_text(socket, "x".into()).await.is_err());

        driver.open_socket(socket).unwrap();
        driver.send_text(socket, "x".into()).await.unwrap();
        assert_eq!(driver.take_sent(), vec![(socket, "x".to_string())]);

        driver.close_socket(socket);
        assert!(driver.send_text(socket, "y".into()).await.is_err());
    }

    #[tokio::test]
    async fn poll_drains_queue_then_ends() {
        let mut driver = SimDriver::new(SimEnv::default());
        driver.inject_tick();

        assert_eq!(driver.poll_event().await.unwrap(), Some(DriverEvent::Tick));
        assert_eq!(driver.poll_event().await.unwrap(), None);
    }
}
