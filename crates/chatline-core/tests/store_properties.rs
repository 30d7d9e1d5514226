//! Property-based tests for ConversationStore
//!
//! Random interleavings of pushes, local sends, failures, conversation
//! switches and connection changes must preserve:
//!
//! 1. **Ordering**: every log is sorted by timestamp
//! 2. **Uniqueness**: no server message ID appears twice in a log
//! 3. **Active unread**: the open conversation has no unread messages
//! 4. **Pending shape**: pending entries carry a token and no ID

use std::time::Duration;

use chatline_core::{
    ConnectionState, ConversationStore, CorrelationToken, CurrentUser, Environment, PushFrame,
    StoreConfig, StoreEvent,
};
use chatline_harness::{
    InvariantRegistry, SimEnv, SimInstant, SystemSnapshot,
    scenario::{message, push_text},
};
use proptest::prelude::*;

const ME: u64 = 9;
const CONTENTS: [&str; 3] = ["hi", "ok", "later"];

#[derive(Debug, Clone)]
enum Op {
    Open(u64),
    Push { chat_id: u64, id: u64, from_me: bool, secs: i64, content: usize },
    Send(usize),
    FailOldest,
    Tick(u64),
    Connected,
    Disconnected,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..4).prop_map(Op::Open),
        (1u64..4, 1u64..40, any::<bool>(), 0i64..120, 0usize..3).prop_map(
            |(chat_id, id, from_me, secs, content)| Op::Push { chat_id, id, from_me, secs, content }
        ),
        (0usize..3).prop_map(Op::Send),
        Just(Op::FailOldest),
        (0u64..20).prop_map(Op::Tick),
        Just(Op::Connected),
        Just(Op::Disconnected),
    ]
}

fn push_event(chat_id: u64, id: u64, sender: u64, content: &str, secs: i64) -> StoreEvent<SimInstant> {
    let frame = PushFrame::decode(&push_text(chat_id, message(id, sender, content, secs)))
        .expect("fixture frame decodes");
    StoreEvent::Push(frame)
}

fn run(ops: &[Op], seed: u64) -> Result<(), TestCaseError> {
    let env = SimEnv::with_seed(seed);
    let mut store =
        ConversationStore::new(env.clone(), CurrentUser::new(ME, "me"), StoreConfig::default());
    let registry = InvariantRegistry::standard();
    let mut tokens: Vec<CorrelationToken> = Vec::new();

    for op in ops {
        match op {
            Op::Open(id) => {
                store.open_conversation(*id);
            },
            Op::Push { chat_id, id, from_me, secs, content } => {
                let sender = if *from_me { ME } else { 2 };
                store.handle(push_event(*chat_id, *id, sender, CONTENTS[*content], *secs));
            },
            Op::Send(content) => {
                if let Ok((token, _)) = store.send_message(CONTENTS[*content]) {
                    tokens.push(token);
                }
            },
            Op::FailOldest => {
                if !tokens.is_empty() {
                    let token = tokens.remove(0);
                    store.handle(StoreEvent::SendFailed { token });
                }
            },
            Op::Tick(secs) => {
                env.advance(Duration::from_secs(*secs));
                store.handle(StoreEvent::Tick { now: env.now() });
            },
            Op::Connected => {
                store.handle(StoreEvent::ConnectionChanged(ConnectionState::Connected));
            },
            Op::Disconnected => {
                store.handle(StoreEvent::ConnectionChanged(ConnectionState::Disconnected));
            },
        }

        let snapshot = SystemSnapshot::from_store(&store);
        if let Err(violations) = registry.check_all(&snapshot) {
            return Err(TestCaseError::fail(format!("after {op:?}: {violations:?}")));
        }
    }

    Ok(())
}

/// Property: invariants hold after every step of any interleaving
#[test]
fn prop_invariants_hold_under_random_interleavings() {
    proptest!(|(ops in prop::collection::vec(op(), 1..80), seed in any::<u64>())| {
        run(&ops, seed)?;
    });
}

/// Property: delivering a push twice leaves the store as after one delivery
#[test]
fn prop_duplicate_push_is_idempotent() {
    proptest!(|(
        pushes in prop::collection::vec((1u64..30, any::<bool>(), 0i64..60), 1..20),
        active in 1u64..3,
    )| {
        let env = SimEnv::with_seed(0);
        let mut store =
            ConversationStore::new(env.clone(), CurrentUser::new(ME, "me"), StoreConfig::default());
        store.open_conversation(active);

        for (id, from_me, secs) in &pushes {
            let sender = if *from_me { ME } else { 2 };
            store.handle(push_event(1, *id, sender, "m", *secs));
        }
        let once = store.messages(1).map(<[_]>::to_vec);
        let unread = store.unread(1);

        for (id, from_me, secs) in &pushes {
            let sender = if *from_me { ME } else { 2 };
            store.handle(push_event(1, *id, sender, "m", *secs));
        }

        prop_assert_eq!(store.messages(1).map(<[_]>::to_vec), once);
        prop_assert_eq!(store.unread(1), unread);
    });
}

/// Property: each echo confirms exactly one pending send
#[test]
fn prop_each_echo_confirms_one_send() {
    proptest!(|(sends in 1usize..6, echoes in 0usize..6)| {
        let env = SimEnv::with_seed(1);
        let mut store =
            ConversationStore::new(env.clone(), CurrentUser::new(ME, "me"), StoreConfig::default());
        store.open_conversation(1);
        store.handle(StoreEvent::ConnectionChanged(ConnectionState::Connected));

        for _ in 0..sends {
            store.send_message("same").map_err(|e| TestCaseError::fail(e.to_string()))?;
        }
        for id in 0..echoes {
            store.handle(push_event(1, 100 + id as u64, ME, "same", 0));
        }

        let log = store.messages(1).unwrap_or_default();
        let pending = log.iter().filter(|m| m.is_pending()).count();
        prop_assert_eq!(pending, sends.saturating_sub(echoes));
        prop_assert_eq!(log.len(), sends.max(echoes));
        prop_assert_eq!(store.pending_count(), pending);
    });
}
