//! Runtime tests against the simulation driver.
//!
//! These tests verify:
//! - Startup connects the push channel and loads the conversation list
//! - Opening a conversation fetches history and sends `mark_as_read`
//! - Local sends are transmitted and collapse into their echo
//! - Lost sockets reconnect with backoff and resync the open conversation

use std::time::Duration;

use chatline_client::{ClientConfig, Driver, DriverEvent, Runtime, UiCommand};
use chatline_core::{ConnectionState, CurrentUser, FetchRequest, StoreError};
use chatline_harness::{
    InvariantRegistry, SimDriver, SimEnv,
    scenario::{detail, message, push_text, summary},
};
use serde_json::{Value, json};

const ME: u64 = 9;

fn setup(seed: u64) -> (Runtime<SimDriver, SimEnv>, SimDriver, SimEnv) {
    let env = SimEnv::with_seed(seed);
    let driver = SimDriver::new(env.clone()).with_invariants(InvariantRegistry::standard());
    let config = ClientConfig { current_user: CurrentUser::new(ME, "me"), ..ClientConfig::default() };
    let runtime = Runtime::new(driver.clone(), env.clone(), &config);
    (runtime, driver, env)
}

/// Process injected events until the queue is empty. Returns true on quit.
async fn pump(runtime: &mut Runtime<SimDriver, SimEnv>) -> bool {
    while let Some(event) = runtime.driver_mut().poll_event().await.unwrap() {
        if runtime.handle_event(event).await.unwrap() {
            return true;
        }
    }
    false
}

fn commands(sent: &[(chatline_core::SocketId, String)]) -> Vec<Value> {
    sent.iter().map(|(_, text)| serde_json::from_str(text).unwrap()).collect()
}

/// Start, accept the socket, and answer the list request with one conversation.
async fn connected(runtime: &mut Runtime<SimDriver, SimEnv>, driver: &SimDriver) {
    runtime.start().await.unwrap();
    driver.accept_last().unwrap();

    let fetches = driver.take_fetches();
    assert_eq!(fetches.len(), 1);
    assert!(matches!(fetches[0], FetchRequest::Conversations(_)));
    driver.respond(fetches[0], json!([summary(1, "Team", 2)]));

    pump(runtime).await;
    assert_eq!(runtime.connection().state(), ConnectionState::Connected);
}

/// Open conversation 1 and answer its history request.
async fn open_team(runtime: &mut Runtime<SimDriver, SimEnv>, driver: &SimDriver) {
    driver.inject_ui(UiCommand::Open(1));
    pump(runtime).await;

    let fetches = driver.take_fetches();
    assert_eq!(fetches.len(), 1);
    driver.respond(fetches[0], detail(1, "Team", &[message(50, 2, "hello", 0)]));
    pump(runtime).await;
}

#[tokio::test]
async fn start_opens_socket_and_requests_list() {
    let (mut runtime, driver, _env) = setup(1);

    runtime.start().await.unwrap();

    assert_eq!(driver.opened().len(), 1);
    assert_eq!(runtime.connection().state(), ConnectionState::Connecting);
    let snapshot = driver.latest_snapshot().unwrap();
    assert!(snapshot.loading_conversations);
    assert_eq!(snapshot.connection, ConnectionState::Connecting);
}

#[tokio::test]
async fn opening_conversation_fetches_history_and_marks_read() {
    let (mut runtime, driver, _env) = setup(2);
    connected(&mut runtime, &driver).await;
    assert_eq!(driver.latest_snapshot().unwrap().unread(1), 2);

    open_team(&mut runtime, &driver).await;

    let sent = commands(&driver.take_sent());
    assert_eq!(sent, vec![json!({"command": "mark_as_read", "chat_id": 1})]);

    let snapshot = driver.latest_snapshot().unwrap();
    assert_eq!(snapshot.active, Some(1));
    assert_eq!(snapshot.unread(1), 0);
    assert_eq!(snapshot.messages.len(), 1);
    assert!(!snapshot.loading_history);
}

#[tokio::test]
async fn send_is_transmitted_and_confirmed_by_echo() {
    let (mut runtime, driver, env) = setup(3);
    connected(&mut runtime, &driver).await;
    open_team(&mut runtime, &driver).await;
    driver.take_sent();

    env.advance(Duration::from_secs(3));
    driver.inject_ui(UiCommand::Send("hi".into()));
    pump(&mut runtime).await;

    let sent = commands(&driver.take_sent());
    assert_eq!(sent, vec![json!({"command": "send_message", "chat_id": 1, "content": "hi"})]);
    let snapshot = driver.latest_snapshot().unwrap();
    assert_eq!(snapshot.pending().count(), 1);

    let socket = driver.last_opened().unwrap();
    driver.inject_text(socket, push_text(1, message(55, ME, "hi", 4)));
    pump(&mut runtime).await;

    let snapshot = driver.latest_snapshot().unwrap();
    let his: Vec<_> = snapshot.messages.iter().filter(|m| m.content == "hi").collect();
    assert_eq!(his.len(), 1);
    assert_eq!(his[0].id, Some(55));
    assert_eq!(snapshot.pending().count(), 0);
}

#[tokio::test]
async fn failed_write_discards_send_and_reconnects() {
    let (mut runtime, driver, _env) = setup(4);
    connected(&mut runtime, &driver).await;
    open_team(&mut runtime, &driver).await;

    driver.set_fail_writes(true);
    driver.inject_ui(UiCommand::Send("hi".into()));
    pump(&mut runtime).await;

    let snapshot = driver.latest_snapshot().unwrap();
    assert_eq!(snapshot.pending().count(), 0);
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(runtime.connection().state(), ConnectionState::Reconnecting { attempt: 1 });
    assert_eq!(runtime.store().pending_count(), 0);
}

#[tokio::test]
async fn lost_socket_reconnects_and_resyncs_open_conversation() {
    let (mut runtime, driver, env) = setup(5);
    connected(&mut runtime, &driver).await;
    open_team(&mut runtime, &driver).await;

    let first = driver.last_opened().unwrap();
    driver.inject_close(first, "server went away");
    pump(&mut runtime).await;
    assert_eq!(runtime.connection().state(), ConnectionState::Reconnecting { attempt: 1 });

    env.advance(Duration::from_secs(1));
    driver.inject_tick();
    pump(&mut runtime).await;

    let second = driver.last_opened().unwrap();
    assert_ne!(first, second);
    driver.accept_last();
    pump(&mut runtime).await;
    assert_eq!(runtime.connection().state(), ConnectionState::Connected);

    let fetches = driver.take_fetches();
    assert_eq!(fetches.len(), 1);
    assert!(matches!(fetches[0], FetchRequest::History(t) if t.conversation_id == 1));

    // Frames from the dead socket are ignored.
    driver.inject_text(first, push_text(1, message(60, 2, "ghost", 5)));
    pump(&mut runtime).await;
    assert!(driver.latest_snapshot().unwrap().messages.iter().all(|m| m.id != Some(60)));
}

#[tokio::test]
async fn refused_open_schedules_retry() {
    let (mut runtime, driver, _env) = setup(6);
    driver.set_fail_opens(true);

    runtime.start().await.unwrap();

    assert!(driver.opened().is_empty());
    assert_eq!(runtime.connection().state(), ConnectionState::Reconnecting { attempt: 1 });
}

#[tokio::test]
async fn failed_list_fetch_surfaces_error() {
    let (mut runtime, driver, _env) = setup(7);
    runtime.start().await.unwrap();
    let fetches = driver.take_fetches();

    driver.inject(DriverEvent::Fetched(chatline_core::FetchResponse {
        request: fetches[0],
        result: Err(chatline_core::TransportError::Http { status: 503, body: "down".into() }),
    }));
    pump(&mut runtime).await;

    let snapshot = driver.latest_snapshot().unwrap();
    assert!(!snapshot.loading_conversations);
    assert_eq!(snapshot.last_error.as_deref(), Some("HTTP 503: down"));
}

#[tokio::test]
async fn rejected_send_is_published() {
    let (mut runtime, driver, _env) = setup(9);
    runtime.start().await.unwrap();
    driver.inject_ui(UiCommand::Open(1));
    pump(&mut runtime).await;
    let published = driver.publish_count();

    driver.inject_ui(UiCommand::Send("hi".into()));
    pump(&mut runtime).await;

    assert_eq!(driver.publish_count(), published + 1);
    let snapshot = driver.latest_snapshot().unwrap();
    assert!(matches!(snapshot.send_error, Some(StoreError::NotConnected { .. })));
    assert!(snapshot.messages.is_empty());
    assert!(driver.take_sent().is_empty());
}

#[tokio::test]
async fn run_stops_on_quit() {
    let (runtime, driver, _env) = setup(8);
    driver.inject_ui(UiCommand::Quit);
    driver.inject_ui(UiCommand::LoadConversations);

    runtime.run().await.unwrap();

    assert!(driver.is_stopped());
    assert!(driver.has_pending());
    assert_eq!(driver.latest_snapshot().unwrap().connection, ConnectionState::Disconnected);
}
