//! Client
//!
//! Async runtime for the chatline synchronization core. Owns one
//! [`chatline_core::ConnectionManager`] and one
//! [`chatline_core::ConversationStore`] and executes their actions through a
//! [`Driver`].
//!
//! # Architecture
//!
//! The runtime follows the same Sans-IO and Action-Based patterns as
//! [`chatline_core`]. The driver reports I/O completions as [`DriverEvent`]s;
//! the runtime feeds them to the state machines one at a time and executes the
//! resulting actions through the driver.
//!
//! # Components
//!
//! - [`Runtime`]: event loop generic over driver and environment
//! - [`Driver`]: I/O abstraction
//! - [`ChatHandle`]: what the hosting UI holds
//! - [`ClientConfig`]: endpoints, timeouts, identity
//! - [`TokenProvider`]: bearer token collaborator
//! - [`SystemEnv`]: production [`Environment`]
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::WsDriver`]: WebSocket push channel and REST driver
//! - [`transport::spawn`]: start a runtime and get a [`ChatHandle`]

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod auth;
mod config;
mod driver;
mod env;
mod error;
mod event;
mod handle;
mod runtime;

#[cfg(feature = "transport")]
pub mod transport;

pub use auth::{StaticToken, TokenProvider, authorization_header};
pub use chatline_core::{Environment, StoreSnapshot};
pub use config::{ClientConfig, DEFAULT_API_BASE, DEFAULT_PUSH_URL, DEFAULT_TICK_INTERVAL};
pub use driver::Driver;
pub use env::SystemEnv;
pub use error::ClientError;
pub use event::{DriverEvent, UiCommand};
pub use handle::{ChatHandle, HandleChannels};
pub use runtime::Runtime;
