//! Process-scoped audio runtime handle.
//!
//! Host audio libraries often need a process-wide init/teardown pair around
//! their whole lifetime. `cpal` needs no such call, but this crate still
//! carries that resource-lifecycle shape: acquiring an `AudioRuntime` bumps
//! a process-wide refcount; dropping the last handle would run teardown,
//! were any needed.

use std::sync::atomic::{AtomicUsize, Ordering};

static REFCOUNT: AtomicUsize = AtomicUsize::new(0);

/// A refcounted handle to the process-wide audio backend. Each
/// `AudioStream::start` acquires one; the backend is considered "live" as
/// long as at least one handle is outstanding.
pub struct AudioRuntime;

impl AudioRuntime {
    pub fn acquire() -> Self {
        let previous = REFCOUNT.fetch_add(1, Ordering::SeqCst);
        if previous == 0 {
            log::debug!("audio runtime acquired (first stream)");
        }
        Self
    }

    pub fn live_count() -> usize {
        REFCOUNT.load(Ordering::SeqCst)
    }
}

impl Drop for AudioRuntime {
    fn drop(&mut self) {
        let previous = REFCOUNT.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 {
            log::debug!("audio runtime released (last stream closed)");
        }
    }
}
