//! Per-training-day activity tracker
//!
//! A tracker moves Idle → Recording → Finished. Activity signals start the
//! session or re-arm the inactivity timer; the timer firing finishes it.
//! All transitions happen under the tracker's own lock, and every armed
//! timer carries the generation it was armed with, so a timer that fires
//! after a reset (or a reset that arrives after the finish began) is a no-op.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::models::{Exercise, TrainingDay};

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Where the tracked day lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: String,
    pub plan_id: String,
    pub plan_title: String,
    pub week_index: usize,
    pub day_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording {
        started_at: DateTime<Utc>,
    },
    Finished {
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        duration_minutes: u32,
    },
}

impl SessionState {
    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording { .. })
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, SessionState::Finished { .. })
    }
}

/// Effect of one activity signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityOutcome {
    /// Idle → Recording
    Started,
    /// Timer re-armed, start time unchanged
    Extended,
    /// Tracker already finished
    Ignored,
}

/// Emitted once per tracker when its session ends
#[derive(Debug, Clone)]
pub struct FinishedSession {
    pub context: SessionContext,
    /// Snapshot with recording, start/end time and duration filled in
    pub training_day: TrainingDay,
    /// Identifies the tracker instance that finished
    pub tracker_serial: u64,
}

struct TrackerInner {
    state: SessionState,
    day: TrainingDay,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

pub struct SessionTracker {
    serial: u64,
    context: SessionContext,
    inactivity_window: Duration,
    clock: Arc<dyn Clock>,
    finished_tx: mpsc::UnboundedSender<FinishedSession>,
    inner: Mutex<TrackerInner>,
}

impl SessionTracker {
    pub fn new(
        context: SessionContext,
        day: TrainingDay,
        inactivity_window: Duration,
        clock: Arc<dyn Clock>,
        finished_tx: mpsc::UnboundedSender<FinishedSession>,
    ) -> Arc<Self> {
        Arc::new(Self {
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            context,
            inactivity_window,
            clock,
            finished_tx,
            inner: Mutex::new(TrackerInner {
                state: SessionState::Idle,
                day,
                generation: 0,
                timer: None,
            }),
        })
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn training_day_id(&self) -> String {
        self.lock().day.id.clone()
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    /// Current snapshot of the tracked day
    pub fn training_day(&self) -> TrainingDay {
        self.lock().day.clone()
    }

    /// Start the session, or extend it by re-arming the inactivity timer
    ///
    /// Must be called from within a tokio runtime.
    pub fn handle_activity_signal(self: &Arc<Self>) -> ActivityOutcome {
        let mut inner = self.lock();

        let outcome = match inner.state {
            SessionState::Finished { .. } => return ActivityOutcome::Ignored,
            SessionState::Idle => {
                let now = self.clock.now();
                inner.state = SessionState::Recording { started_at: now };
                inner.day.recording = true;
                inner.day.start_time = Some(now);
                inner.day.end_time = None;
                inner.day.duration_in_minutes = None;
                info!(
                    training_day = %inner.day.id,
                    user = %self.context.user_id,
                    "Training session started"
                );
                ActivityOutcome::Started
            }
            SessionState::Recording { .. } => ActivityOutcome::Extended,
        };

        self.arm_timer(&mut inner);
        outcome
    }

    /// Replace the exercise snapshot without touching the timer
    pub fn update_training_day_exercise_data(&self, exercises: Vec<Exercise>) {
        self.lock().day.exercises = exercises;
    }

    /// Disarm the timer; the tracker will not finish on its own afterwards
    pub fn cancel(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
    }

    fn arm_timer(self: &Arc<Self>, inner: &mut TrackerInner) {
        inner.generation += 1;
        if let Some(previous) = inner.timer.take() {
            previous.abort();
        }

        let generation = inner.generation;
        let window = self.inactivity_window;
        let tracker: Weak<Self> = Arc::downgrade(self);
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if let Some(tracker) = tracker.upgrade() {
                tracker.on_timeout(generation);
            }
        }));
    }

    fn on_timeout(&self, generation: u64) {
        let finished = {
            let mut inner = self.lock();
            if inner.generation != generation {
                debug!(training_day = %inner.day.id, "Stale inactivity timer ignored");
                return;
            }
            let SessionState::Recording { started_at } = inner.state else {
                return;
            };

            let ended_at = self.clock.now();
            let duration_minutes = session_duration_minutes(started_at, ended_at, self.inactivity_window);
            inner.state = SessionState::Finished {
                started_at,
                ended_at,
                duration_minutes,
            };
            inner.day.recording = false;
            inner.day.end_time = Some(ended_at);
            inner.day.duration_in_minutes = Some(duration_minutes);
            // the running task is this one; dropping the handle detaches it
            inner.timer = None;

            info!(
                training_day = %inner.day.id,
                user = %self.context.user_id,
                duration_minutes,
                "Training session finished"
            );

            FinishedSession {
                context: self.context.clone(),
                training_day: inner.day.clone(),
                tracker_serial: self.serial,
            }
        };

        if self.finished_tx.send(finished).is_err() {
            warn!(
                user = %self.context.user_id,
                "Session finish worker is gone; finished session not persisted"
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        // state stays consistent across a panic in another holder
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for SessionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTracker")
            .field("serial", &self.serial)
            .field("context", &self.context)
            .field("state", &self.state())
            .finish()
    }
}

/// Training minutes between start and end, rounded to the nearest 5
///
/// The trailing inactivity window is idle time after the last real action
/// and is not counted. Never negative.
pub fn session_duration_minutes(
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    inactivity_window: Duration,
) -> u32 {
    let elapsed_ms = (ended_at - started_at).num_milliseconds();
    let active_ms = elapsed_ms - inactivity_window.as_millis() as i64;
    if active_ms <= 0 {
        return 0;
    }

    let minutes = active_ms as f64 / 60_000.0;
    ((minutes / 5.0).round() * 5.0) as u32
}
