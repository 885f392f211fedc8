//! Kiosk Timers
//!
//! `Countdown` drives the per-second gatepass countdowns; `OneShot` drives
//! delayed resets and the scanner quiet period.
//!
//! Every arm/schedule gets a fresh generation number which is handed to the
//! callbacks. Cancelling bumps the generation, so a callback that already
//! produced an event before the cancel can be recognised as stale by the
//! receiver via [`Countdown::is_current`] / [`OneShot::is_current`].
//!
//! Ticks are plain callbacks. Expiry and fire callbacks return a future the
//! timer task awaits, so they can wait for room in the kiosk queue.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

const ONE_SECOND: Duration = Duration::from_secs(1);

/// Generation counter + task handle shared by both timer kinds
struct TimerSlot {
    name: &'static str,
    live: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            live: Arc::new(AtomicU64::new(0)),
            handle: None,
        }
    }

    /// Invalidate the current generation and stop the task
    fn cancel(&mut self) {
        self.live.fetch_add(1, Ordering::AcqRel);
        if let Some(handle) = self.handle.take()
            && !handle.is_finished()
        {
            handle.abort();
            debug!(timer = self.name, "Timer cancelled");
        }
    }

    /// Cancel any previous run and return the generation for the next one
    fn begin(&mut self) -> (u64, Arc<AtomicU64>) {
        self.cancel();
        (self.live.load(Ordering::Acquire), Arc::clone(&self.live))
    }

    fn is_current(&self, generation: u64) -> bool {
        self.live.load(Ordering::Acquire) == generation
    }

    fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Cancellable, restartable per-second countdown
pub struct Countdown {
    slot: TimerSlot,
}

impl Countdown {
    pub fn new(name: &'static str) -> Self {
        Self {
            slot: TimerSlot::new(name),
        }
    }

    /// Start counting down from `seconds`.
    ///
    /// `on_tick(generation, remaining)` runs immediately with `seconds`, then
    /// once per second down to 0; `on_expire(generation)` is awaited once
    /// after the zero tick and the countdown disarms itself. Re-arming cancels
    /// the previous run first. Must be called inside a tokio runtime.
    pub fn arm<T, E, Fut>(&mut self, seconds: u32, on_tick: T, on_expire: E) -> u64
    where
        T: Fn(u64, u32) + Send + 'static,
        E: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (generation, live) = self.slot.begin();
        let name = self.slot.name;

        on_tick(generation, seconds);

        let mut deadline = Instant::now();
        let handle = tokio::spawn(async move {
            let mut remaining = seconds;

            while remaining > 0 {
                deadline += ONE_SECOND;
                sleep_until(deadline).await;
                if live.load(Ordering::Acquire) != generation {
                    return;
                }
                remaining -= 1;
                on_tick(generation, remaining);
            }

            if live.load(Ordering::Acquire) == generation {
                debug!(timer = name, generation, "Countdown expired");
                on_expire(generation).await;
            }
        });

        debug!(timer = name, generation, seconds, "Countdown armed");
        self.slot.handle = Some(handle);
        generation
    }

    /// Stop the countdown. Safe to call when not armed.
    pub fn cancel(&mut self) {
        self.slot.cancel();
    }

    /// Check whether a countdown run is still ticking
    pub fn is_armed(&self) -> bool {
        self.slot.is_active()
    }

    /// Check whether `generation` belongs to the latest, uncancelled run
    pub fn is_current(&self, generation: u64) -> bool {
        self.slot.is_current(generation)
    }
}

/// Cancellable single-shot delay
pub struct OneShot {
    slot: TimerSlot,
}

impl OneShot {
    pub fn new(name: &'static str) -> Self {
        Self {
            slot: TimerSlot::new(name),
        }
    }

    /// Await `on_fire(generation)` once after `delay`, replacing any pending run
    pub fn schedule<F, Fut>(&mut self, delay: Duration, on_fire: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (generation, live) = self.slot.begin();

        let deadline = Instant::now() + delay;
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            if live.load(Ordering::Acquire) == generation {
                on_fire(generation).await;
            }
        });

        self.slot.handle = Some(handle);
        generation
    }

    pub fn cancel(&mut self) {
        self.slot.cancel();
    }

    pub fn is_pending(&self) -> bool {
        self.slot.is_active()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.slot.is_current(generation)
    }
}
