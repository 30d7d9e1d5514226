//! Fuzz target for MessageReconciler
//!
//! Interleaves local sends, pushes, history merges and discards on one log.
//!
//! # Invariants
//!
//! - The log stays sorted by timestamp
//! - No server ID appears twice
//! - Every pending entry has a token and no ID

#![no_main]

use std::collections::HashSet;

use arbitrary::Arbitrary;
use chatline_core::{CorrelationToken, CurrentUser, MessageLog, MessageReconciler, UnreadTracker};
use chatline_proto::{WireMessage, WireSender};
use chrono::{DateTime, TimeDelta, Utc};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Send { content: u8, at: u16 },
    Push(Msg),
    History(Vec<Msg>),
    Discard(u8),
}

#[derive(Debug, Clone, Arbitrary)]
struct Msg {
    id: u8,
    from_me: bool,
    content: u8,
    at: u16,
}

const ME: u64 = 9;

fn time(at: u16) -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + TimeDelta::seconds(i64::from(at))
}

fn wire(msg: &Msg) -> WireMessage {
    let sender = if msg.from_me { ME } else { 2 };
    WireMessage {
        id: u64::from(msg.id),
        content: format!("c{}", msg.content % 4),
        sender: WireSender { id: sender, username: format!("u{sender}"), is_current_user: None },
        timestamp: time(msg.at),
    }
}

fuzz_target!(|ops: Vec<Op>| {
    let mut reconciler = MessageReconciler::new(CurrentUser::new(ME, "me"), 0);
    let mut unread = UnreadTracker::new();
    let mut log = MessageLog::new();
    let mut tokens: Vec<CorrelationToken> = Vec::new();

    for op in ops {
        match op {
            Op::Send { content, at } => {
                let content = format!("c{}", content % 4);
                tokens.push(reconciler.apply_local_send(&mut log, content, time(at)));
            },
            Op::Push(msg) => {
                reconciler.apply_push(&mut log, &mut unread, 1, wire(&msg));
            },
            Op::History(msgs) => {
                reconciler.merge_history(&mut log, msgs.iter().map(wire).collect());
            },
            Op::Discard(n) => {
                if let Some(token) = tokens.get(usize::from(n) % tokens.len().max(1)) {
                    reconciler.discard(&mut log, *token);
                }
            },
        }

        let messages = log.as_slice();
        assert!(messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let mut ids = HashSet::new();
        for message in messages {
            match (message.id, message.token()) {
                (Some(id), None) => assert!(ids.insert(id), "duplicate id {id}"),
                (None, Some(_)) => {},
                other => panic!("malformed entry {other:?}"),
            }
        }
    }
});
