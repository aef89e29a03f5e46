//! Cooperative cancellation for long-running walks
//!
//! A caller holds a `CancellationToken` and either cancels it explicitly
//! from any thread or gives it a deadline up front. Walks check the token
//! between paths and holdings iterators check it between leaves; whatever
//! was yielded before the check stays valid.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Signal {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
}

/// Shared cancel flag with an optional deadline.
///
/// Clones observe the same flag. Once the deadline passes the token reads
/// as cancelled, and stays so.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    signal: Arc<Signal>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A token that cancels itself once `budget` has elapsed
    pub fn with_timeout(budget: Duration) -> Self {
        Self::build(Instant::now().checked_add(budget))
    }

    fn build(deadline: Option<Instant>) -> Self {
        Self {
            signal: Arc::new(Signal {
                cancelled: AtomicBool::new(false),
                deadline,
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        if self.signal.cancelled.load(Ordering::Acquire) {
            return true;
        }
        match self.signal.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&self) {
        self.signal.cancelled.store(true, Ordering::Release);
    }

    /// Time left before the deadline, if one was set
    pub fn remaining(&self) -> Option<Duration> {
        self.signal
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
