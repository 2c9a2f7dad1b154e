use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::traits::{Clock, Timestamp};

/// Tick cadence used when none is configured, and the clamp target for a
/// zero interval.
const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(1);

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Virtual clock advancing at a configurable multiple of real time
///
/// The clock anchors a virtual epoch to the real instant it was created (or
/// last reset) and publishes, at a fixed cadence, how much virtual time has
/// elapsed since: `(real elapsed) * multiplier`. Reads never lock; the
/// published duration is a single atomic value, so [`ScaledClock::now`] is
/// safe and cheap to call from any number of threads while the background
/// task keeps updating it.
///
/// The multiplier may be any finite value: `2.0` runs twice as fast as real
/// time, `0.0` freezes the clock at its epoch, and negative values run
/// virtual time backward. The elapsed duration is recomputed from the epoch
/// on every tick rather than incremented, so scheduling jitter cannot
/// accumulate into drift.
///
/// Each instance owns one background task, started by the constructor and
/// torn down by [`ScaledClock::stop`] (or by an external cancellation
/// future, see [`ScaledClock::new_with_cancel`]). A stopped clock never
/// resumes; create a new instance to restart. If every handle to the clock
/// is dropped without a stop, the task notices on its next tick and exits
/// on its own.
pub struct ScaledClock {
    /// Rate of virtual time relative to real time
    multiplier: f64,
    /// Tick cadence of the background task
    update_interval: Duration,
    /// Virtual time corresponding to zero accumulated duration
    virtual_epoch: Timestamp,
    /// Real instant elapsed time is measured from; re-anchored by reset()
    real_epoch: Mutex<Instant>,
    /// Published virtual duration since the real epoch, in nanoseconds
    virtual_elapsed_ns: AtomicI64,
    /// One-shot stop latch
    stopped: AtomicBool,
    /// Wakes the background task out of its timer wait on stop
    stop_tx: watch::Sender<bool>,
}

impl ScaledClock {
    /// Create a clock with the given multiplier
    ///
    /// The virtual epoch is the current time and the published duration is
    /// refreshed every millisecond. Use [`ScaledClock::new_custom`] to pick
    /// the epoch and cadence.
    ///
    /// Must be called from within a tokio runtime: construction spawns the
    /// background update task.
    pub fn new(multiplier: f64) -> Arc<Self> {
        Self::new_custom(Utc::now(), multiplier, DEFAULT_UPDATE_INTERVAL)
    }

    /// Create a clock starting at `virtual_epoch`, advancing at
    /// `multiplier` times real time, refreshed every `update_interval`
    ///
    /// # Arguments
    /// * `virtual_epoch` - The virtual time reported when zero real time
    ///   has elapsed. May lie in the past or future.
    /// * `multiplier` - Rate of virtual time relative to real time.
    /// * `update_interval` - How often the published duration is
    ///   recomputed. A zero interval is clamped to 1ms.
    pub fn new_custom(
        virtual_epoch: Timestamp,
        multiplier: f64,
        update_interval: Duration,
    ) -> Arc<Self> {
        let (clock, stop_rx) = Self::build(virtual_epoch, multiplier, update_interval);
        tokio::spawn(Self::run(
            Arc::downgrade(&clock),
            stop_rx,
            clock.update_interval,
        ));
        clock
    }

    /// Create a clock that also stops when `cancel` resolves
    ///
    /// Defaults apply as in [`ScaledClock::new`]. The cancellation future
    /// can be anything that resolves when the surrounding work is done: a
    /// shutdown notify, a closed channel, a ctrl-c future.
    pub fn new_with_cancel<F>(multiplier: f64, cancel: F) -> Arc<Self>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::new_custom_with_cancel(Utc::now(), multiplier, DEFAULT_UPDATE_INTERVAL, cancel)
    }

    /// Create a fully configured clock that also stops when `cancel`
    /// resolves
    ///
    /// Firing the cancellation future is equivalent to calling
    /// [`ScaledClock::stop`]: the background task stops within one update
    /// interval and the clock freezes at its last published value. Racing
    /// it against an explicit stop is safe.
    pub fn new_custom_with_cancel<F>(
        virtual_epoch: Timestamp,
        multiplier: f64,
        update_interval: Duration,
        cancel: F,
    ) -> Arc<Self>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (clock, stop_rx) = Self::build(virtual_epoch, multiplier, update_interval);
        tokio::spawn(Self::run_with_cancel(
            Arc::downgrade(&clock),
            stop_rx,
            clock.update_interval,
            cancel,
        ));
        clock
    }

    fn build(
        virtual_epoch: Timestamp,
        multiplier: f64,
        update_interval: Duration,
    ) -> (Arc<Self>, watch::Receiver<bool>) {
        let update_interval = if update_interval.is_zero() {
            warn!(
                "scaled clock update interval must be positive, clamping to {:?}",
                DEFAULT_UPDATE_INTERVAL
            );
            DEFAULT_UPDATE_INTERVAL
        } else {
            update_interval
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let clock = Arc::new(Self {
            multiplier,
            update_interval,
            virtual_epoch,
            real_epoch: Mutex::new(Instant::now()),
            virtual_elapsed_ns: AtomicI64::new(0),
            stopped: AtomicBool::new(false),
            stop_tx,
        });
        (clock, stop_rx)
    }

    /// Background update loop
    ///
    /// Holds only a weak reference so an abandoned clock cannot keep its
    /// task alive; the loop exits when the stop signal fires or every
    /// caller handle is gone.
    async fn run(clock: Weak<Self>, mut stop_rx: watch::Receiver<bool>, update_interval: Duration) {
        debug!("scaled clock task started ({:?} interval)", update_interval);

        let mut ticker = Self::ticker(update_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match clock.upgrade() {
                        Some(clock) => clock.publish_elapsed(),
                        None => break,
                    }
                }
                _ = stop_rx.changed() => break,
            }
        }

        debug!("scaled clock task exited");
    }

    /// Background update loop with an external cancellation signal
    ///
    /// Cancellation routes through [`ScaledClock::stop`] so both shutdown
    /// paths converge on the same terminal state.
    async fn run_with_cancel<F>(
        clock: Weak<Self>,
        mut stop_rx: watch::Receiver<bool>,
        update_interval: Duration,
        cancel: F,
    ) where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!("scaled clock task started ({:?} interval)", update_interval);

        tokio::pin!(cancel);
        let mut ticker = Self::ticker(update_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match clock.upgrade() {
                        Some(clock) => clock.publish_elapsed(),
                        None => break,
                    }
                }
                () = &mut cancel => {
                    debug!("scaled clock cancellation signal fired");
                    if let Some(clock) = clock.upgrade() {
                        clock.stop();
                    }
                    break;
                }
                _ = stop_rx.changed() => break,
            }
        }

        debug!("scaled clock task exited");
    }

    fn ticker(update_interval: Duration) -> time::Interval {
        // First tick lands one interval after start, not immediately
        let mut ticker = time::interval_at(time::Instant::now() + update_interval, update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }

    /// Recompute and publish the virtual duration elapsed since the real
    /// epoch
    ///
    /// The epoch read happens under the lock so a concurrent reset cannot
    /// interleave a new epoch with an old elapsed measurement.
    fn publish_elapsed(&self) {
        let real_elapsed = self.real_epoch.lock().elapsed();
        let virtual_secs = real_elapsed.as_secs_f64() * self.multiplier;
        // Saturating cast: extreme multipliers pin to the i64 range
        self.virtual_elapsed_ns
            .store((virtual_secs * NANOS_PER_SEC) as i64, Ordering::Release);
    }

    /// Current virtual time
    ///
    /// Lock-free and non-blocking: one atomic load plus the epoch offset.
    /// Reflects the most recently completed tick or reset; before the first
    /// tick it returns the virtual epoch itself.
    pub fn now(&self) -> Timestamp {
        let elapsed_ns = self.virtual_elapsed_ns.load(Ordering::Acquire);
        self.virtual_epoch + chrono::Duration::nanoseconds(elapsed_ns)
    }

    /// Stop the background task
    ///
    /// Idempotent: any number of calls, from any number of threads,
    /// collapse to a single stop. Afterwards [`ScaledClock::now`] returns
    /// the last published value forever.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            // Winner of the swap closes the signal exactly once; send only
            // fails if the task is already gone
            let _ = self.stop_tx.send(true);
            debug!("scaled clock stopped (multiplier {})", self.multiplier);
        }
    }

    /// Re-anchor the clock: virtual time returns to the virtual epoch and
    /// begins accumulating again from the current real instant
    ///
    /// Safe to call concurrently with [`ScaledClock::now`] and with the
    /// background task. On a stopped clock the published duration becomes
    /// zero and stays there, since no further ticks occur.
    pub fn reset(&self) {
        let mut real_epoch = self.real_epoch.lock();
        *real_epoch = Instant::now();
        self.virtual_elapsed_ns.store(0, Ordering::Release);
    }

    /// Rate of virtual time relative to real time
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Cadence at which the published duration is recomputed
    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    /// Virtual time corresponding to zero accumulated duration
    pub fn virtual_epoch(&self) -> Timestamp {
        self.virtual_epoch
    }

    /// Published virtual duration elapsed since the real epoch
    pub fn virtual_elapsed(&self) -> chrono::Duration {
        chrono::Duration::nanoseconds(self.virtual_elapsed_ns.load(Ordering::Acquire))
    }

    /// Whether the clock has been told to stop
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Clock for ScaledClock {
    fn now(&self) -> Timestamp {
        ScaledClock::now(self)
    }

    fn name(&self) -> &str {
        "ScaledClock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reports_epoch_before_first_tick() {
        // One-hour cadence: the first tick cannot have happened yet
        let epoch = Utc::now();
        let clock = ScaledClock::new_custom(epoch, 50.0, Duration::from_secs(3600));

        assert_eq!(clock.now(), epoch);
        assert_eq!(clock.virtual_elapsed(), chrono::Duration::zero());
        clock.stop();
    }

    #[tokio::test]
    async fn test_zero_multiplier_freezes_at_epoch() {
        let clock = ScaledClock::new(0.0);
        let epoch = clock.virtual_epoch();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(clock.now(), epoch);
        clock.stop();
    }

    #[tokio::test]
    async fn test_negative_multiplier_runs_backward() {
        let clock = ScaledClock::new(-1.0);
        let epoch = clock.virtual_epoch();

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(clock.now() < epoch);
        assert!(clock.virtual_elapsed() < chrono::Duration::zero());
        clock.stop();
    }

    #[tokio::test]
    async fn test_stop_freezes_reported_time() {
        let clock = ScaledClock::new(1000.0);
        tokio::time::sleep(Duration::from_millis(50)).await;

        clock.stop();
        clock.stop();
        assert!(clock.is_stopped());

        // Give any in-flight tick time to land, then confirm the value no
        // longer moves
        tokio::time::sleep(Duration::from_millis(20)).await;
        let frozen = clock.now();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(clock.now(), frozen);
        assert!(frozen > clock.virtual_epoch());
    }

    #[tokio::test]
    async fn test_reset_rewinds_to_epoch_and_resumes() {
        let clock = ScaledClock::new(2.0);
        let epoch = clock.virtual_epoch();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(clock.now() > epoch);

        clock.reset();
        // Published duration is zero until the next tick lands
        let rewound = clock.now() - epoch;
        assert!(rewound < chrono::Duration::milliseconds(10));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let resumed = clock.now() - epoch;
        assert!(resumed >= chrono::Duration::milliseconds(100));
        clock.stop();
    }

    #[tokio::test]
    async fn test_reset_after_stop_parks_at_epoch() {
        let clock = ScaledClock::new(500.0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        clock.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;

        clock.reset();
        let epoch = clock.virtual_epoch();
        assert_eq!(clock.now(), epoch);

        // No task left to republish, the zero sticks
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(clock.now(), epoch);
    }

    #[tokio::test]
    async fn test_zero_interval_is_clamped() {
        let clock = ScaledClock::new_custom(Utc::now(), 1.0, Duration::ZERO);
        assert_eq!(clock.update_interval(), Duration::from_millis(1));
        clock.stop();
    }

    #[tokio::test]
    async fn test_accessors_reflect_configuration() {
        let epoch = Utc::now() - chrono::Duration::minutes(5);
        let clock = ScaledClock::new_custom(epoch, 1.5, Duration::from_millis(250));

        assert_eq!(clock.multiplier(), 1.5);
        assert_eq!(clock.update_interval(), Duration::from_millis(250));
        assert_eq!(clock.virtual_epoch(), epoch);
        assert!(!clock.is_stopped());
        clock.stop();
    }
}
