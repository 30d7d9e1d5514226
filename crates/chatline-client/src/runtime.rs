//! Generic runtime for synchronization orchestration.
//!
//! The Runtime drives the event loop, coordinating between:
//! - [`ConnectionManager`]: push channel lifecycle
//! - [`ConversationStore`]: conversations, logs, unread counts
//! - [`Driver`]: platform-specific I/O
//!
//! All events are processed to completion one at a time, in arrival order.
//! Actions produced while handling an event are executed from a work queue
//! before the next event is polled, so the store never observes interleaved
//! partial updates.

use std::{collections::VecDeque, sync::Arc};

use chatline_core::{
    ConnectionAction, ConnectionError, ConnectionManager, ConversationStore, CorrelationToken,
    Environment, FetchResponse, SocketId, StoreAction, StoreEvent, TransportError,
};

use crate::{ClientConfig, Driver, DriverEvent, UiCommand};

/// Unit of pending work.
enum Work {
    Connection(ConnectionAction),
    Store(StoreAction),
}

/// Generic runtime that orchestrates the state machines and the driver.
///
/// # Type Parameters
///
/// - `D`: Platform-specific I/O driver
/// - `E`: Environment for time and randomness
pub struct Runtime<D, E>
where
    D: Driver,
    E: Environment,
{
    driver: D,
    connection: ConnectionManager<E::Instant>,
    store: ConversationStore<E>,
    queue: VecDeque<Work>,
    dirty: bool,
}

impl<D, E> Runtime<D, E>
where
    D: Driver<Instant = E::Instant>,
    E: Environment,
{
    /// Create a new runtime with the given driver and environment.
    pub fn new(driver: D, env: E, config: &ClientConfig) -> Self {
        let connection = ConnectionManager::new(config.connection.clone(), env.random_u64());
        let store = ConversationStore::new(env, config.current_user.clone(), config.store.clone());
        Self { driver, connection, store, queue: VecDeque::new(), dirty: false }
    }

    /// Connect the push channel and load the conversation list.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn start(&mut self) -> Result<(), D::Error> {
        tracing::info!("chatline runtime starting");
        let now = self.driver.now();
        let actions = self.connection.connect(now);
        self.enqueue_connection(actions);
        let actions = self.store.load_conversations();
        self.enqueue_store(actions);
        self.dirty = true;
        self.drain().await;
        Ok(())
    }

    /// Run the main event loop until `Quit` or the driver runs dry.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn run(mut self) -> Result<(), D::Error> {
        self.start().await?;

        while let Some(event) = self.driver.poll_event().await? {
            if self.handle_event(event).await? {
                break;
            }
        }

        self.shutdown().await
    }

    /// Process one event and every action it causes.
    ///
    /// Returns `true` if the runtime should quit.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn handle_event(&mut self, event: DriverEvent) -> Result<bool, D::Error> {
        let now = self.driver.now();

        match event {
            DriverEvent::Ui(command) => {
                if self.handle_ui(command) {
                    return Ok(true);
                }
            },
            DriverEvent::SocketOpened(socket) => {
                let actions = self.connection.on_open(socket);
                self.enqueue_connection(actions);
            },
            DriverEvent::SocketText { socket, text } => {
                if let Some(frame) = self.connection.receive(socket, &text) {
                    let actions = self.store.handle(StoreEvent::Push(frame));
                    self.enqueue_store(actions);
                }
            },
            DriverEvent::SocketClosed { socket, reason } => {
                let actions = self.connection.on_close(socket, now, &reason);
                self.enqueue_connection(actions);
            },
            DriverEvent::Fetched(response) => {
                let actions = self.store.handle(StoreEvent::Fetched(response));
                self.enqueue_store(actions);
            },
            DriverEvent::Tick => {
                let actions = self.connection.tick(now);
                self.enqueue_connection(actions);
                let actions = self.store.handle(StoreEvent::Tick { now });
                self.enqueue_store(actions);
            },
        }

        self.drain().await;
        Ok(false)
    }

    /// Disconnect, publish a final snapshot, and stop the driver.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn shutdown(mut self) -> Result<(), D::Error> {
        tracing::info!("chatline runtime stopping");
        let actions = self.connection.disconnect();
        self.enqueue_connection(actions);
        self.drain().await;
        self.driver.stop();
        Ok(())
    }

    /// The store.
    pub fn store(&self) -> &ConversationStore<E> {
        &self.store
    }

    /// The connection state machine.
    pub fn connection(&self) -> &ConnectionManager<E::Instant> {
        &self.connection
    }

    /// The driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The driver, mutably.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Returns `true` on `Quit`.
    fn handle_ui(&mut self, command: UiCommand) -> bool {
        let now = self.driver.now();

        match command {
            UiCommand::LoadConversations => {
                let actions = self.store.load_conversations();
                self.enqueue_store(actions);
            },
            UiCommand::Open(id) => {
                let actions = self.store.open_conversation(id);
                self.enqueue_store(actions);
            },
            UiCommand::Send(content) => match self.store.send_message(&content) {
                Ok((token, actions)) => {
                    tracing::debug!(%token, "message queued");
                    self.enqueue_store(actions);
                },
                Err(e) => {
                    tracing::warn!(error = %e, "send rejected");
                    // The store recorded the rejection for the UI.
                    self.dirty = true;
                },
            },
            UiCommand::Reconnect => {
                let actions = self.connection.connect(now);
                self.enqueue_connection(actions);
            },
            UiCommand::Disconnect => {
                let actions = self.connection.disconnect();
                self.enqueue_connection(actions);
            },
            UiCommand::Quit => return true,
        }
        false
    }

    fn enqueue_connection(&mut self, actions: Vec<ConnectionAction>) {
        self.queue.extend(actions.into_iter().map(Work::Connection));
    }

    fn enqueue_store(&mut self, actions: Vec<StoreAction>) {
        self.queue.extend(actions.into_iter().map(Work::Store));
    }

    /// Execute queued work until nothing is left, then publish once.
    async fn drain(&mut self) {
        while let Some(work) = self.queue.pop_front() {
            match work {
                Work::Connection(action) => self.execute_connection(action).await,
                Work::Store(action) => self.execute_store(action).await,
            }
        }

        if std::mem::take(&mut self.dirty) {
            self.driver.publish(Arc::new(self.store.snapshot()));
        }
    }

    async fn execute_connection(&mut self, action: ConnectionAction) {
        match action {
            ConnectionAction::Open { socket } => {
                if let Err(e) = self.driver.open_socket(socket) {
                    let now = self.driver.now();
                    let actions = self.connection.on_close(socket, now, &e.to_string());
                    self.enqueue_connection(actions);
                }
            },
            ConnectionAction::Close { socket } => self.driver.close_socket(socket),
            ConnectionAction::Transmit { socket, text } => {
                self.transmit(socket, text, None).await;
            },
            ConnectionAction::StateChanged(state) => {
                let actions = self.store.handle(StoreEvent::ConnectionChanged(state));
                self.enqueue_store(actions);
            },
        }
    }

    async fn execute_store(&mut self, action: StoreAction) {
        match action {
            StoreAction::Fetch(request) => {
                if let Err(e) = self.driver.fetch(request) {
                    tracing::warn!(error = %e, path = %request.path(), "fetch could not start");
                    let response = FetchResponse {
                        request,
                        result: Err(TransportError::Network(e.to_string())),
                    };
                    let actions = self.store.handle(StoreEvent::Fetched(response));
                    self.enqueue_store(actions);
                }
            },
            StoreAction::Dispatch { command, token } => match self.connection.send(&command) {
                Ok(actions) => {
                    for action in actions {
                        if let ConnectionAction::Transmit { socket, text } = action {
                            self.transmit(socket, text, token).await;
                        } else {
                            self.queue.push_back(Work::Connection(action));
                        }
                    }
                },
                Err(ConnectionError::NotConnected { state }) => {
                    tracing::warn!(?state, chat_id = command.chat_id(), "dropping command");
                    self.fail_send(token);
                },
                Err(e) => {
                    tracing::warn!(error = %e, "command could not be encoded");
                    self.fail_send(token);
                },
            },
            StoreAction::Publish => self.dirty = true,
        }
    }

    /// Write a frame. A failed write is a lost socket.
    async fn transmit(
        &mut self,
        socket: SocketId,
        text: String,
        token: Option<CorrelationToken>,
    ) {
        if let Err(e) = self.driver.send_text(socket, text).await {
            let now = self.driver.now();
            let reason = e.to_string();
            tracing::warn!(%socket, error = %reason, "write failed");
            self.fail_send(token);
            let actions = self.connection.on_close(socket, now, &reason);
            self.enqueue_connection(actions);
        }
    }

    fn fail_send(&mut self, token: Option<CorrelationToken>) {
        if let Some(token) = token {
            let actions = self.store.handle(StoreEvent::SendFailed { token });
            self.enqueue_store(actions);
        }
    }
}
