//! Handle for the hosting UI.
//!
//! The UI never touches the store. It sends [`UiCommand`]s through a
//! [`ChatHandle`] and watches immutable [`StoreSnapshot`]s published by the
//! runtime.

use std::sync::Arc;

use chatline_core::{ConversationId, StoreSnapshot};
use tokio::sync::{mpsc, watch};

use crate::{ClientError, UiCommand};

/// Cloneable handle to a running runtime.
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::UnboundedSender<UiCommand>,
    snapshots: watch::Receiver<Arc<StoreSnapshot>>,
}

/// Driver-side ends of a [`ChatHandle`].
pub struct HandleChannels {
    /// Commands from the UI.
    pub commands: mpsc::UnboundedReceiver<UiCommand>,
    /// Snapshot publisher.
    pub snapshots: watch::Sender<Arc<StoreSnapshot>>,
}

impl ChatHandle {
    /// Create a handle and the channel ends a driver consumes.
    pub fn channel() -> (Self, HandleChannels) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(StoreSnapshot::empty()));
        (
            Self { commands: command_tx, snapshots: snapshot_rx },
            HandleChannels { commands: command_rx, snapshots: snapshot_tx },
        )
    }

    /// Refresh the conversation list.
    ///
    /// # Errors
    ///
    /// `ClientError::Closed` if the runtime has stopped.
    pub fn load_conversations(&self) -> Result<(), ClientError> {
        self.command(UiCommand::LoadConversations)
    }

    /// Open a conversation.
    ///
    /// # Errors
    ///
    /// `ClientError::Closed` if the runtime has stopped.
    pub fn open(&self, id: ConversationId) -> Result<(), ClientError> {
        self.command(UiCommand::Open(id))
    }

    /// Send a message to the open conversation.
    ///
    /// The result only says the command reached the runtime; the pending
    /// message shows up in the next snapshot.
    ///
    /// # Errors
    ///
    /// `ClientError::Closed` if the runtime has stopped.
    pub fn send(&self, content: impl Into<String>) -> Result<(), ClientError> {
        self.command(UiCommand::Send(content.into()))
    }

    /// Reconnect the push channel.
    ///
    /// # Errors
    ///
    /// `ClientError::Closed` if the runtime has stopped.
    pub fn reconnect(&self) -> Result<(), ClientError> {
        self.command(UiCommand::Reconnect)
    }

    /// Disconnect the push channel.
    ///
    /// # Errors
    ///
    /// `ClientError::Closed` if the runtime has stopped.
    pub fn disconnect(&self) -> Result<(), ClientError> {
        self.command(UiCommand::Disconnect)
    }

    /// Stop the runtime.
    ///
    /// # Errors
    ///
    /// `ClientError::Closed` if the runtime has already stopped.
    pub fn quit(&self) -> Result<(), ClientError> {
        self.command(UiCommand::Quit)
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// Wait for the next snapshot and return it.
    ///
    /// # Errors
    ///
    /// `ClientError::Closed` if the runtime has stopped.
    pub async fn changed(&mut self) -> Result<Arc<StoreSnapshot>, ClientError> {
        self.snapshots.changed().await.map_err(|_| ClientError::Closed)?;
        Ok(Arc::clone(&self.snapshots.borrow_and_update()))
    }

    fn command(&self, command: UiCommand) -> Result<(), ClientError> {
        self.commands.send(command).map_err(|_| ClientError::Closed)
    }
}
