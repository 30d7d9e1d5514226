//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the runtime from specific I/O
//! implementations. Each frontend implements the trait to provide
//! platform-specific I/O, while the generic [`crate::Runtime`] handles all
//! orchestration.

use std::{future::Future, ops::Sub, sync::Arc, time::Duration};

use chatline_core::{FetchRequest, SocketId, StoreSnapshot};

use crate::DriverEvent;

/// Abstracts I/O operations for the runtime.
///
/// # Implementations
///
/// - **Production**: WebSocket push channel and HTTP REST calls (feature
///   `transport`)
/// - **Simulation**: scripted events and recorded effects (`chatline-harness`)
///
/// # Associated Types
///
/// - [`Error`](Driver::Error): Platform-specific error type
/// - [`Instant`](Driver::Instant): Time representation (real or virtual)
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Time instant type. Enables virtual time in simulation.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Wait for the next input event.
    ///
    /// Returns `None` once the event source is exhausted.
    fn poll_event(&mut self)
    -> impl Future<Output = Result<Option<DriverEvent>, Self::Error>> + Send;

    /// Start opening a socket to the push endpoint.
    ///
    /// Completion is reported later as `SocketOpened` or `SocketClosed` with
    /// the same ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt cannot even be started. The runtime
    /// treats that as an immediate close.
    fn open_socket(&mut self, socket: SocketId) -> Result<(), Self::Error>;

    /// Close a socket. No further events for it are expected.
    fn close_socket(&mut self, socket: SocketId);

    /// Write a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is gone or the write fails. The runtime
    /// treats that as a close of the socket.
    fn send_text(
        &mut self,
        socket: SocketId,
        text: String,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Start a REST request. Completion is reported as `Fetched`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be started. The runtime
    /// reports that to the store as a network failure.
    fn fetch(&mut self, request: FetchRequest) -> Result<(), Self::Error>;

    /// Current time instant.
    fn now(&self) -> Self::Instant;

    /// Hand a new snapshot to the UI.
    fn publish(&mut self, snapshot: Arc<StoreSnapshot>);

    /// Release resources.
    fn stop(&mut self);
}
