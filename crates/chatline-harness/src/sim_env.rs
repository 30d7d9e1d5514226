//! Virtual-time environment.
//!
//! `SimEnv` replaces the system clock with a manually advanced one and the OS
//! RNG with a seeded ChaCha stream, so a run is fully determined by its seed
//! and the sequence of `advance` calls.

use std::{
    ops::{Add, Sub},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chatline_core::Environment;
use chrono::{DateTime, TimeDelta, Utc};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Wall-clock time at virtual time zero (2023-11-14T22:13:20Z).
pub const SIM_EPOCH_SECS: i64 = 1_700_000_000;

/// Point in virtual time, measured from the start of the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(pub Duration);

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

impl Add<Duration> for SimInstant {
    type Output = SimInstant;

    fn add(self, rhs: Duration) -> SimInstant {
        SimInstant(self.0 + rhs)
    }
}

#[derive(Debug)]
struct SimState {
    elapsed: Duration,
    rng: ChaCha8Rng,
}

/// Deterministic environment. Clones share the same clock and RNG.
#[derive(Debug, Clone)]
pub struct SimEnv {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl SimEnv {
    /// Environment at virtual time zero with RNG seeded from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        let state = SimState { elapsed: Duration::ZERO, rng: ChaCha8Rng::seed_from_u64(seed) };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// Move virtual time forward.
    pub fn advance(&self, duration: Duration) {
        self.lock().elapsed += duration;
    }

    /// Virtual time since the start of the simulation.
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    /// Wall-clock time at virtual time zero.
    pub fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(SIM_EPOCH_SECS)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.elapsed())
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Self::epoch() + TimeDelta::from_std(self.elapsed()).unwrap_or(TimeDelta::zero())
    }

    /// Advances virtual time instead of waiting.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.lock().rng.fill_bytes(buffer);
    }
}
