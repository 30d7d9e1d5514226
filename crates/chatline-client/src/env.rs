//! Production Environment implementation using system time and RNG.
//!
//! `SystemEnv` is the production implementation of the Environment trait using
//! real system time and OS randomness.
//!
//! # Capabilities
//!
//! - Real system time (`std::time::Instant`) that advances naturally
//! - Wall clock from `chrono::Utc::now()` for optimistic message timestamps
//! - OS RNG (getrandom). Truly random, not reproducible
//! - Tokio async sleep for actual wall-clock delays

use std::time::Duration;

use chatline_core::Environment;
use chrono::{DateTime, Utc};

/// Production environment using system time and OS RNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. RNG failure indicates OS-level issues and
/// correlation tokens would no longer be unique across runs.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    #[allow(clippy::disallowed_methods)]
    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }

    #[allow(clippy::disallowed_methods)]
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used, clippy::disallowed_methods)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
