//! The progress contract (§4.1 "Progress contract"): handlers report
//! `(percentage, message)` and updates are monotonic, throttled to "at
//! least every 5% or every 2s", and never block the worker except for the
//! final terminal update.
//!
//! This module defines the seam ([`ProgressSink`]) that Ingestion and the
//! NOOS algorithm depend on without depending on the Task Engine itself —
//! the engine constructs the concrete throttled/persisting sink and hands
//! handlers a `&dyn ProgressSink`, mirroring how the teacher's worker loops
//! (`service/tasks/*`) separate "what a handler reports" from "how the
//! queue persists it".

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// The seam between a running handler (Ingestion, NOOS) and however the
/// Task Engine chooses to persist/coalesce progress.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percentage: u8, message: String);

    #[must_use]
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Discards all updates. Used by tests and by callers that don't care about
/// progress (e.g. synchronous unit tests of the ingestion/algorithm logic).
#[derive(Debug, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn report(&self, _percentage: u8, _message: String) {}
}

/// Wraps an inner sink, enforcing monotonicity and the "5%/2s" flush rule
/// (§4.1). Out-of-order or too-frequent-and-too-small updates are dropped
/// at this layer rather than the caller having to reason about throttling.
pub struct ThrottledProgressSink<F: Fn(u8, String) + Send + Sync> {
    inner: F,
    min_percent_delta: u8,
    min_interval: Duration,
    state: Mutex<ThrottleState>,
}

struct ThrottleState {
    last_percentage: u8,
    last_flush: Instant,
}

impl<F: Fn(u8, String) + Send + Sync> ThrottledProgressSink<F> {
    pub fn new(min_percent_delta: u8, min_interval: Duration, inner: F) -> Self {
        Self {
            inner,
            min_percent_delta,
            min_interval,
            state: Mutex::new(ThrottleState {
                last_percentage: 0,
                last_flush: Instant::now(),
            }),
        }
    }

    /// Forces a flush regardless of throttling — used for the terminal
    /// update, which is always synchronous and unconditional (§4.1).
    pub fn flush_now(&self, percentage: u8, message: String) {
        let clamped = self.clamp(percentage);
        (self.inner)(clamped, message);
        let mut state = self.state.lock().expect("progress sink mutex poisoned");
        state.last_percentage = clamped;
        state.last_flush = Instant::now();
    }

    fn clamp(&self, percentage: u8) -> u8 {
        let state = self.state.lock().expect("progress sink mutex poisoned");
        percentage.clamp(state.last_percentage, 100)
    }
}

impl<F: Fn(u8, String) + Send + Sync> ProgressSink for ThrottledProgressSink<F> {
    fn report(&self, percentage: u8, message: String) {
        let clamped = self.clamp(percentage);
        let should_flush = {
            let state = self.state.lock().expect("progress sink mutex poisoned");
            clamped >= 100
                || clamped.saturating_sub(state.last_percentage) >= self.min_percent_delta
                || state.last_flush.elapsed() >= self.min_interval
        };
        if should_flush {
            self.flush_now(clamped, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn small_fast_updates_are_coalesced() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let sink = ThrottledProgressSink::new(5, Duration::from_secs(2), move |_, _| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        sink.report(1, "a".into());
        sink.report(2, "b".into());
        sink.report(3, "c".into());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        sink.report(6, "d".into());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn out_of_order_update_is_clamped() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls2 = Arc::clone(&calls);
        let sink = ThrottledProgressSink::new(5, Duration::from_secs(2), move |p, _| {
            calls2.lock().unwrap().push(p);
        });
        sink.flush_now(50, "half".into());
        sink.report(10, "late, smaller".into());
        sink.flush_now(10, "forced anyway".into());
        let seen = calls.lock().unwrap();
        assert_eq!(seen.last().copied(), Some(50));
    }

    #[test]
    fn terminal_update_always_flushes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let sink = ThrottledProgressSink::new(50, Duration::from_secs(100), move |_, _| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        sink.report(1, "start".into());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        sink.flush_now(100, "done".into());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
