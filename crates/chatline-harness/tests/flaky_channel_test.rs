//! Seeded simulations of a flaky push channel.
//!
//! Each seed drives the runtime through a random mix of drops, reconnects,
//! sends, echoes and foreign pushes. Invariants are checked on every
//! published snapshot; at the end no send may be stuck pending once the
//! pending timeout has passed.

use std::time::Duration;

use chatline_client::{ClientConfig, Driver, Runtime, UiCommand};
use chatline_core::{ConnectionState, CurrentUser, FetchRequest};
use chatline_harness::{
    InvariantRegistry, SimDriver, SimEnv,
    scenario::{detail, message, push_text, summary},
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::json;

const ME: u64 = 9;

async fn pump(runtime: &mut Runtime<SimDriver, SimEnv>) {
    while let Some(event) = runtime.driver_mut().poll_event().await.unwrap() {
        runtime.handle_event(event).await.unwrap();
    }
}

fn answer_fetches(driver: &SimDriver, next_id: &mut u64) {
    for request in driver.take_fetches() {
        match request {
            FetchRequest::Conversations(_) => {
                driver.respond(request, json!([summary(1, "one", 0), summary(2, "two", 3)]));
            },
            FetchRequest::History(ticket) => {
                *next_id += 1;
                let history = [message(*next_id, 2, "backlog", 0)];
                driver.respond(request, detail(ticket.conversation_id, "", &history));
            },
        }
    }
}

async fn simulate(seed: u64) {
    let env = SimEnv::with_seed(seed);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let driver = SimDriver::new(env.clone()).with_invariants(InvariantRegistry::standard());
    let config = ClientConfig { current_user: CurrentUser::new(ME, "me"), ..ClientConfig::default() };
    let mut runtime = Runtime::new(driver.clone(), env.clone(), &config);
    let mut next_id = 1000;

    runtime.start().await.unwrap();
    driver.accept_last();
    answer_fetches(&driver, &mut next_id);
    pump(&mut runtime).await;

    for step in 0..200 {
        match rng.gen_range(0..8) {
            0 => driver.inject_ui(UiCommand::Open(rng.gen_range(1..3))),
            1 => driver.inject_ui(UiCommand::Send(format!("m{step}"))),
            2 => {
                if let Some(socket) = runtime.connection().socket() {
                    driver.inject_close(socket, "dropped");
                }
            },
            3 => {
                if runtime.connection().state() == ConnectionState::Connecting {
                    driver.accept_last();
                }
            },
            4 => {
                // Echo the oldest pending send.
                let pending = driver
                    .latest_snapshot()
                    .and_then(|s| s.active.zip(s.pending().next().map(|m| m.content.clone())));
                if let (Some((chat_id, content)), Some(socket)) =
                    (pending, runtime.connection().socket())
                {
                    next_id += 1;
                    driver.inject_text(socket, push_text(chat_id, message(next_id, ME, &content, 5)));
                }
            },
            5 => {
                if let Some(socket) = runtime.connection().socket() {
                    next_id += 1;
                    let chat_id = rng.gen_range(1..4);
                    driver.inject_text(socket, push_text(chat_id, message(next_id, 2, "yo", 5)));
                }
            },
            6 => driver.inject_ui(UiCommand::Reconnect),
            _ => {
                env.advance(Duration::from_millis(rng.gen_range(100..3000)));
                driver.inject_tick();
            },
        }
        pump(&mut runtime).await;
        answer_fetches(&driver, &mut next_id);
        pump(&mut runtime).await;
    }

    env.advance(config.store.pending_timeout);
    driver.inject_tick();
    pump(&mut runtime).await;
    assert_eq!(runtime.store().pending_count(), 0, "seed {seed}");
}

#[tokio::test]
async fn invariants_hold_across_seeds() {
    for seed in 0..32 {
        simulate(seed).await;
    }
}
