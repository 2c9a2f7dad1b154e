use chrono::{DateTime, Utc};

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

/// Port for time abstraction
///
/// Call-sites that depend on "now" take a `Clock` instead of reading the
/// system time directly, so the source can be swapped:
/// - Real system time for production
/// - Scaled virtual time for simulations and accelerated tests
pub trait Clock: Send + Sync {
    /// Get the current time according to this clock
    fn now(&self) -> Timestamp;

    /// Get the clock's name/identifier for debugging
    fn name(&self) -> &str {
        "Clock"
    }
}
