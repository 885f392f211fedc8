//! Scanner Input Debounce
//!
//! The QR scanner types into a capture field. Each change hands us the
//! field's full current value; once the field has been quiet for the
//! configured period the value is taken as one scan.

use std::future::Future;
use std::time::Duration;

use super::timer::OneShot;

/// Last-value-wins capture buffer with a trailing quiet-period timer
pub struct ScanDebouncer {
    buffer: String,
    quiet: Duration,
    timer: OneShot,
}

impl ScanDebouncer {
    pub const DEFAULT_QUIET: Duration = Duration::from_millis(250);

    pub fn new(quiet: Duration) -> Self {
        Self {
            buffer: String::new(),
            quiet,
            timer: OneShot::new("scan_quiet"),
        }
    }

    /// Record the latest field value and restart the quiet period.
    ///
    /// `on_quiet(generation)` is awaited when no further input arrives within
    /// the quiet period.
    pub fn on_input<F, Fut>(&mut self, raw: &str, on_quiet: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.buffer.clear();
        self.buffer.push_str(raw);
        self.timer.schedule(self.quiet, on_quiet)
    }

    /// Scan token for a quiet-period expiry.
    ///
    /// Returns `None` for a superseded generation or when the normalised
    /// buffer is empty. The buffer is left as is; call [`clear`](Self::clear)
    /// once the token has been accepted.
    pub fn settled(&self, generation: u64) -> Option<String> {
        if !self.timer.is_current(generation) {
            return None;
        }
        let token = normalize_scan(&self.buffer);
        (!token.is_empty()).then_some(token)
    }

    /// Drop buffered text and any pending quiet-period expiry
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.timer.cancel();
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }
}

impl Default for ScanDebouncer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_QUIET)
    }
}

/// Trim surrounding whitespace and drop every line break
pub fn normalize_scan(raw: &str) -> String {
    raw.trim().chars().filter(|c| !matches!(c, '\r' | '\n')).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::sleep;

    #[test]
    fn test_normalize_scan() {
        assert_eq!(normalize_scan("  GP001\r\n"), "GP001");
        assert_eq!(normalize_scan("GP\n001"), "GP001");
        assert_eq!(normalize_scan("\r\n \n"), "");
        assert_eq!(normalize_scan("GP 001"), "GP 001");
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_value_wins_after_quiet_period() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let mut debouncer = ScanDebouncer::default();

        for value in ["G", "GP0", "GP001\n"] {
            let fired = Arc::clone(&fired);
            debouncer.on_input(value, move |generation| async move {
                fired.lock().unwrap().push(generation);
            });
            sleep(Duration::from_millis(100)).await;
        }
        assert!(fired.lock().unwrap().is_empty());

        sleep(Duration::from_millis(200)).await;
        let generations = fired.lock().unwrap().clone();
        assert_eq!(generations.len(), 1);
        assert_eq!(
            debouncer.settled(generations[0]).as_deref(),
            Some("GP001")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_generation_is_ignored() {
        let mut debouncer = ScanDebouncer::default();
        let first = debouncer.on_input("GP001", |_| async {});
        let second = debouncer.on_input("GP002", |_| async {});

        assert_eq!(debouncer.settled(first), None);
        assert_eq!(debouncer.settled(second).as_deref(), Some("GP002"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_input_emits_nothing() {
        let mut debouncer = ScanDebouncer::default();
        let generation = debouncer.on_input(" \r\n", |_| async {});
        assert_eq!(debouncer.settled(generation), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_pending_expiry() {
        let fired = Arc::new(Mutex::new(0));
        let mut debouncer = ScanDebouncer::default();

        let counter = Arc::clone(&fired);
        let generation = debouncer.on_input("GP001", move |_| async move {
            *counter.lock().unwrap() += 1;
        });
        debouncer.clear();
        sleep(Duration::from_secs(1)).await;

        assert_eq!(*fired.lock().unwrap(), 0);
        assert_eq!(debouncer.buffer(), "");
        assert_eq!(debouncer.settled(generation), None);
    }
}
