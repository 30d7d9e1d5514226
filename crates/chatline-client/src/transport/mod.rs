//! Production transport (feature `transport`).
//!
//! - [`WsDriver`]: [`crate::Driver`] over a WebSocket push channel and
//!   `reqwest` REST calls
//! - [`RestClient`]: the REST half on its own
//! - [`spawn`]: wire a driver, a [`crate::Runtime`], and a
//!   [`crate::ChatHandle`] together on the current Tokio runtime

mod rest;
mod ws;

use std::sync::Arc;

pub use rest::RestClient;
use tokio::task::JoinHandle;
pub use ws::WsDriver;

use crate::{ChatHandle, ClientConfig, ClientError, Runtime, SystemEnv, TokenProvider};

/// Start a runtime on the current Tokio runtime.
///
/// Returns the UI handle and the task running the event loop. The loop ends
/// on [`ChatHandle::quit`] or once every handle is dropped.
///
/// # Errors
///
/// `ClientError::Config` if `config` does not validate.
pub fn spawn(
    config: ClientConfig,
    tokens: Arc<dyn TokenProvider>,
) -> Result<(ChatHandle, JoinHandle<Result<(), ClientError>>), ClientError> {
    config.validate()?;
    let config = Arc::new(config);

    let (handle, channels) = ChatHandle::channel();
    let driver = WsDriver::new(Arc::clone(&config), tokens, channels);
    let runtime = Runtime::new(driver, SystemEnv::new(), &config);

    Ok((handle, tokio::spawn(runtime.run())))
}
