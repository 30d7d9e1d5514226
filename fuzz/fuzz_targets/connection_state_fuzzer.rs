//! Fuzz target for the ConnectionManager state machine
//!
//! # Strategy
//!
//! - Arbitrary interleavings of connect, disconnect, open, close and tick
//! - Events for the live socket as well as for stale and unknown sockets
//! - Monotonic virtual time with arbitrary gaps
//!
//! # Invariants
//!
//! - At most one live socket; a new one is never opened before the old one
//!   is closed
//! - A socket is live exactly while Connecting or Connected
//! - The attempt count never exceeds the configured maximum outside Failed
//! - `send` succeeds only while Connected

#![no_main]

use std::{collections::HashSet, time::Duration};

use arbitrary::Arbitrary;
use chatline_core::{
    Command, ConnectionAction, ConnectionConfig, ConnectionManager, ConnectionState, SocketId,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Connect,
    Disconnect,
    Opened(SocketChoice),
    Closed(SocketChoice),
    Tick { millis: u16 },
    Send,
}

#[derive(Debug, Clone, Arbitrary)]
enum SocketChoice {
    Live,
    Other(u8),
}

fuzz_target!(|input: (u64, Vec<Op>)| {
    let (seed, ops) = input;
    let config = ConnectionConfig::default();
    let max_attempts = config.backoff.max_attempts;
    let mut manager: ConnectionManager<Duration> = ConnectionManager::new(config, seed);
    let mut now = Duration::ZERO;
    let mut open: HashSet<SocketId> = HashSet::new();

    for op in ops {
        let actions = match op {
            Op::Connect => manager.connect(now),
            Op::Disconnect => manager.disconnect(),
            Op::Opened(choice) => manager.on_open(pick(&manager, &choice)),
            Op::Closed(choice) => {
                let socket = pick(&manager, &choice);
                open.remove(&socket);
                manager.on_close(socket, now, "fuzz")
            },
            Op::Tick { millis } => {
                now += Duration::from_millis(u64::from(millis));
                manager.tick(now)
            },
            Op::Send => {
                let result = manager.send(&Command::MarkAsRead { chat_id: 1 });
                assert_eq!(result.is_ok(), manager.state() == ConnectionState::Connected);
                continue;
            },
        };

        for action in actions {
            match action {
                ConnectionAction::Open { socket } => {
                    assert!(open.is_empty(), "opened {socket} while {open:?} still open");
                    open.insert(socket);
                },
                ConnectionAction::Close { socket } => {
                    open.remove(&socket);
                },
                ConnectionAction::Transmit { .. } | ConnectionAction::StateChanged(_) => {},
            }
        }

        let live = matches!(manager.state(), ConnectionState::Connecting | ConnectionState::Connected);
        assert_eq!(manager.socket().is_some(), live);
        if let ConnectionState::Reconnecting { attempt } = manager.state() {
            assert!(attempt >= 1 && attempt <= max_attempts);
        }
    }
});

fn pick(manager: &ConnectionManager<Duration>, choice: &SocketChoice) -> SocketId {
    match (choice, manager.socket()) {
        (SocketChoice::Live, Some(socket)) => socket,
        (SocketChoice::Live, None) => SocketId(0),
        (SocketChoice::Other(n), _) => SocketId(u64::from(*n)),
    }
}
