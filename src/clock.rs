//! Wall-clock access for session timing
//!
//! Timers themselves are tokio sleeps; the clock only answers "what time is
//! it" so that start/end timestamps follow the same time source as the
//! timers, including when tokio's clock is paused in tests.

use chrono::{DateTime, Utc};
use std::fmt::Debug;
use tokio::time::Instant;

pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall time anchored to tokio's monotonic clock
#[derive(Debug, Clone)]
pub struct TokioClock {
    anchor_wall: DateTime<Utc>,
    anchor_instant: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::anchored_at(Utc::now())
    }

    /// Start counting from a fixed wall time
    pub fn anchored_at(anchor_wall: DateTime<Utc>) -> Self {
        Self {
            anchor_wall,
            anchor_instant: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().duration_since(self.anchor_instant);
        match chrono::Duration::from_std(elapsed) {
            Ok(elapsed) => self.anchor_wall + elapsed,
            Err(_) => Utc::now(),
        }
    }
}
