// crates/workspace-apps-core/src/runtime/clock.rs
// ============================================================================
// Module: Clocks
// Description: System and manually driven clock implementations.
// Purpose: Make expiry, health, and rollup windows testable.
// Dependencies: time
// ============================================================================

//! ## Overview
//! [`SystemClock`] reads the wall clock. [`ManualClock`] only moves when told
//! to and is shared by clones.

use std::sync::Arc;
use std::sync::Mutex;

use time::Duration;
use time::OffsetDateTime;

use crate::interfaces::Clock;

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only advances when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    /// Current time shared between clones.
    now: Arc<Mutex<OffsetDateTime>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now: OffsetDateTime) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        self.now.lock().map_or(OffsetDateTime::UNIX_EPOCH, |guard| *guard)
    }
}
