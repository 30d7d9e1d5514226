//! chatline command-line client.
//!
//! # Usage
//!
//! ```bash
//! CHATLINE_TOKEN=... chatline --api-base http://127.0.0.1:8000/api/ \
//!     --push-url ws://127.0.0.1:8000/ws/chat/ --user-id 9 --username me
//! ```
//!
//! Lines typed on stdin are sent to the open conversation. Commands:
//! `/list`, `/open <id>`, `/reconnect`, `/disconnect`, `/quit`.

use std::{sync::Arc, time::Duration};

use chatline_client::{ChatHandle, ClientConfig, StaticToken, StoreSnapshot, transport};
use chatline_core::{CurrentUser, Message};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Terminal client for chatline
#[derive(Parser, Debug)]
#[command(name = "chatline")]
#[command(about = "Real-time chat synchronization client")]
#[command(version)]
struct Args {
    /// REST API base URL
    #[arg(long, default_value = chatline_client::DEFAULT_API_BASE)]
    api_base: String,

    /// Push channel URL
    #[arg(long, default_value = chatline_client::DEFAULT_PUSH_URL)]
    push_url: String,

    /// Auth token
    #[arg(long, env = "CHATLINE_TOKEN", hide_env_values = true)]
    token: String,

    /// Local user ID (used to recognize echoes of own messages)
    #[arg(long)]
    user_id: Option<u64>,

    /// Local username
    #[arg(long)]
    username: Option<String>,

    /// Connect timeout in seconds
    #[arg(long, default_value = "10")]
    connect_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();

    let mut config = ClientConfig {
        api_base: args.api_base,
        push_url: args.push_url,
        current_user: CurrentUser { id: args.user_id, username: args.username },
        ..Default::default()
    };
    config.connection.connect_timeout = Duration::from_secs(args.connect_timeout);

    let (handle, task) = transport::spawn(config, Arc::new(StaticToken::new(args.token)))?;

    let render = tokio::spawn(render_loop(handle.clone()));
    input_loop(&handle).await?;

    task.await??;
    render.abort();
    Ok(())
}

async fn input_loop(handle: &ChatHandle) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) => break,
            ("/list", _) => handle.load_conversations()?,
            ("/reconnect", _) => handle.reconnect()?,
            ("/disconnect", _) => handle.disconnect()?,
            ("/open", id) => match id.trim().parse() {
                Ok(id) => handle.open(id)?,
                Err(_) => tracing::warn!(input = id, "not a conversation id"),
            },
            ("", _) => {},
            _ => {
                if !handle.snapshot().can_send() {
                    tracing::warn!("cannot send: no open conversation or not connected");
                }
                handle.send(line)?;
            },
        }
    }

    handle.quit()?;
    Ok(())
}

async fn render_loop(mut handle: ChatHandle) {
    let mut stdout = tokio::io::stdout();
    while let Ok(snapshot) = handle.changed().await {
        if stdout.write_all(render(&snapshot).as_bytes()).await.is_err() {
            break;
        }
        let _ = stdout.flush().await;
    }
}

fn render(snapshot: &StoreSnapshot) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    let _ = writeln!(out, "\n[{:?}]", snapshot.connection);
    if let Some(error) = &snapshot.last_error {
        let _ = writeln!(out, "! {error}");
    }
    if let Some(error) = &snapshot.send_error {
        let _ = writeln!(out, "! send: {error}");
    }

    for conversation in &snapshot.conversations {
        let marker = if snapshot.active == Some(conversation.id) { '>' } else { ' ' };
        let unread =
            if conversation.unread > 0 { format!(" ({})", conversation.unread) } else { String::new() };
        let _ = writeln!(out, "{marker} #{} {}{unread}", conversation.id, conversation.title);
    }

    if snapshot.loading_history {
        let _ = writeln!(out, "  loading...");
    }
    for message in &snapshot.messages {
        let _ = writeln!(out, "  {}", render_message(message));
    }
    out
}

fn render_message(message: &Message) -> String {
    let status = if message.is_pending() { " (sending)" } else { "" };
    format!(
        "{} {}: {}{status}",
        message.timestamp.format("%H:%M"),
        message.sender.display_name,
        message.content
    )
}
