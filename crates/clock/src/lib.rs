//! Tempo Clock
//!
//! Virtual time that advances at a configurable multiple of wall-clock
//! time, for simulations, tests, and time-dependent logic that must run
//! faster or slower than real time without touching real time itself.
//!
//! ## Clock sources
//!
//! ```text
//! Clock (trait)
//!     │
//!     ├── SystemClock   (wall-clock time, production)
//!     │
//!     └── ScaledClock   (multiplier-scaled virtual time, simulation)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use std::time::Duration;
//! use tempo_clock::ScaledClock;
//!
//! // Twice as fast as real time, refreshed every millisecond
//! let clock = ScaledClock::new(2.0);
//! let now = clock.now();
//! clock.stop();
//!
//! // Custom epoch and refresh cadence
//! let epoch = chrono::Utc::now() - chrono::Duration::hours(1);
//! let clock = ScaledClock::new_custom(epoch, 1.5, Duration::from_millis(500));
//!
//! // Tied to an external shutdown signal
//! let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
//! let clock = ScaledClock::new_with_cancel(10.0, async move {
//!     let _ = shutdown_rx.await;
//! });
//! ```

mod scaled;
mod system;
mod traits;

pub use scaled::ScaledClock;
pub use system::SystemClock;
pub use traits::{Clock, Timestamp};
