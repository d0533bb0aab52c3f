//! Live training-session detection
//!
//! - [`tracker`]: per-day state machine with an inactivity timeout
//! - [`registry`]: one tracker per training day, routes activity signals
//! - [`worker`]: persists finished sessions and raises notifications

pub mod registry;
pub mod tracker;
pub mod worker;

pub use registry::{RouteOutcome, SessionRegistry, SessionStatus};
pub use tracker::{
    session_duration_minutes, ActivityOutcome, FinishedSession, SessionContext, SessionState,
    SessionTracker,
};
pub use worker::{SessionCallbacks, SessionFinishWorker, SessionFinishedCallback};
