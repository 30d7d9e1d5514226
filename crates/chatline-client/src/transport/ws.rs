//! Production driver: WebSocket push channel plus REST.
//!
//! Each socket runs in its own task and talks to the driver over channels;
//! the driver never shares a socket with anything else. Closing a socket
//! aborts its task, so no events for it arrive afterwards.

use std::{collections::HashMap, sync::Arc};

use chatline_core::{FetchRequest, SocketId, StoreSnapshot};
use futures_util::{SinkExt, StreamExt};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Interval, MissedTickBehavior},
};
use tokio_tungstenite::tungstenite::Message;

use super::RestClient;
use crate::{
    ClientConfig, ClientError, Driver, DriverEvent, HandleChannels, TokenProvider, UiCommand,
};

struct SocketTask {
    outbound: mpsc::UnboundedSender<String>,
    handle: JoinHandle<()>,
}

/// Driver backed by `tokio-tungstenite` and `reqwest`.
pub struct WsDriver {
    config: Arc<ClientConfig>,
    tokens: Arc<dyn TokenProvider>,
    rest: RestClient,
    ui: mpsc::UnboundedReceiver<UiCommand>,
    snapshots: watch::Sender<Arc<StoreSnapshot>>,
    events_tx: mpsc::UnboundedSender<DriverEvent>,
    events_rx: mpsc::UnboundedReceiver<DriverEvent>,
    sockets: HashMap<SocketId, SocketTask>,
    ticker: Interval,
}

impl WsDriver {
    /// Create a driver serving the handle whose channel ends are `channels`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        config: Arc<ClientConfig>,
        tokens: Arc<dyn TokenProvider>,
        channels: HandleChannels,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut ticker = tokio::time::interval(config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            rest: RestClient::new(Arc::clone(&config), Arc::clone(&tokens)),
            config,
            tokens,
            ui: channels.commands,
            snapshots: channels.snapshots,
            events_tx,
            events_rx,
            sockets: HashMap::new(),
            ticker,
        }
    }

    fn socket_url(&self) -> Result<String, ClientError> {
        let token = self.tokens.token()?;
        let separator = if self.config.push_url.contains('?') { '&' } else { '?' };
        Ok(format!("{}{separator}token={}", self.config.push_url, urlencoding::encode(&token)))
    }
}

impl Driver for WsDriver {
    type Error = ClientError;
    type Instant = std::time::Instant;

    async fn poll_event(&mut self) -> Result<Option<DriverEvent>, Self::Error> {
        tokio::select! {
            // A dropped handle means nobody is listening anymore.
            command = self.ui.recv() => {
                Ok(Some(DriverEvent::Ui(command.unwrap_or(UiCommand::Quit))))
            },
            Some(event) = self.events_rx.recv() => Ok(Some(event)),
            _ = self.ticker.tick() => Ok(Some(DriverEvent::Tick)),
        }
    }

    fn open_socket(&mut self, socket: SocketId) -> Result<(), Self::Error> {
        let url = self.socket_url()?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_socket(socket, url, outbound_rx, self.events_tx.clone()));

        self.sockets.insert(socket, SocketTask { outbound: outbound_tx, handle });
        Ok(())
    }

    fn close_socket(&mut self, socket: SocketId) {
        if let Some(task) = self.sockets.remove(&socket) {
            task.handle.abort();
        }
    }

    async fn send_text(&mut self, socket: SocketId, text: String) -> Result<(), Self::Error> {
        let task = self
            .sockets
            .get(&socket)
            .ok_or_else(|| ClientError::WebSocket(format!("{socket} is not open")))?;
        task.outbound
            .send(text)
            .map_err(|_| ClientError::WebSocket(format!("{socket} writer has stopped")))
    }

    fn fetch(&mut self, request: FetchRequest) -> Result<(), Self::Error> {
        let rest = self.rest.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let response = rest.fetch(request).await;
            // Runtime gone; nothing to report to.
            let _ = events.send(DriverEvent::Fetched(response));
        });
        Ok(())
    }

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn publish(&mut self, snapshot: Arc<StoreSnapshot>) {
        self.snapshots.send_replace(snapshot);
    }

    fn stop(&mut self) {
        for (_, task) in self.sockets.drain() {
            task.handle.abort();
        }
    }
}

async fn run_socket(
    socket: SocketId,
    url: String,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<DriverEvent>,
) {
    let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            let _ = events.send(DriverEvent::SocketClosed { socket, reason: e.to_string() });
            return;
        },
    };

    if events.send(DriverEvent::SocketOpened(socket)).is_err() {
        return;
    }

    let (mut write, mut read) = stream.split();

    let reason = loop {
        tokio::select! {
            text = outbound.recv() => match text {
                Some(text) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        break e.to_string();
                    }
                },
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    return;
                },
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let event = DriverEvent::SocketText { socket, text: text.as_str().to_owned() };
                    if events.send(event).is_err() {
                        return;
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or_else(
                        || "closed by server".to_string(),
                        |f| format!("closed by server: {} {}", u16::from(f.code), f.reason.as_str()),
                    );
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => break e.to_string(),
                None => break "stream ended".to_string(),
            },
        }
    };

    tracing::debug!(%socket, %reason, "socket task ending");
    let _ = events.send(DriverEvent::SocketClosed { socket, reason });
}
