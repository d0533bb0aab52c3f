//! Process-wide registry of live session trackers
//!
//! The map lock is only held to look up, insert or remove entries. Work on a
//! tracker happens under that tracker's own lock, so signals for different
//! training days never wait on each other.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::tracker::{ActivityOutcome, FinishedSession, SessionContext, SessionState, SessionTracker};
use crate::clock::Clock;
use crate::field_update::FieldUpdate;
use crate::models::TrainingDay;

/// Session attributes to mirror into the persisted training day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub recording: bool,
    pub start_time: Option<DateTime<Utc>>,
}

impl SessionStatus {
    fn from_state(state: SessionState) -> Self {
        match state {
            SessionState::Idle => Self {
                recording: false,
                start_time: None,
            },
            SessionState::Recording { started_at } => Self {
                recording: true,
                start_time: Some(started_at),
            },
            SessionState::Finished { started_at, .. } => Self {
                recording: false,
                start_time: Some(started_at),
            },
        }
    }

    /// Write the status onto a day; finished sessions are written by the worker
    pub fn apply_to(&self, day: &mut TrainingDay) {
        if self.recording {
            day.recording = true;
            day.start_time = self.start_time;
            day.end_time = None;
            day.duration_in_minutes = None;
        }
    }
}

/// Result of routing one payload's activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteOutcome {
    pub signals: usize,
    pub started: bool,
    /// Status of the day's tracker, if one exists
    pub status: Option<SessionStatus>,
}

pub struct SessionRegistry {
    trackers: RwLock<HashMap<String, Arc<SessionTracker>>>,
    inactivity_window: Duration,
    clock: Arc<dyn Clock>,
    finished_tx: mpsc::UnboundedSender<FinishedSession>,
}

impl SessionRegistry {
    /// Create a registry and the receiving end of its finish events
    pub fn new(
        inactivity_window: Duration,
        clock: Arc<dyn Clock>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<FinishedSession>) {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(Self {
            trackers: RwLock::new(HashMap::new()),
            inactivity_window,
            clock,
            finished_tx,
        });
        (registry, finished_rx)
    }

    pub fn inactivity_window(&self) -> Duration {
        self.inactivity_window
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Feed a payload's updates to the day's tracker
    ///
    /// Each activity signal reaches `handle_activity_signal` once; the tracker
    /// is created on the first signal. Payloads with no signal only refresh
    /// the exercise snapshot of an existing tracker.
    pub fn route_activity(
        &self,
        context: &SessionContext,
        day: &TrainingDay,
        updates: &[FieldUpdate],
    ) -> RouteOutcome {
        let signals = updates.iter().filter(|u| u.is_activity_signal()).count();

        if signals == 0 {
            let status = self.tracker(&day.id).map(|tracker| {
                tracker.update_training_day_exercise_data(day.exercises.clone());
                SessionStatus::from_state(tracker.state())
            });
            return RouteOutcome {
                signals,
                started: false,
                status,
            };
        }

        let tracker = self.get_or_create(context, day);
        tracker.update_training_day_exercise_data(day.exercises.clone());

        let mut started = false;
        for _ in 0..signals {
            started |= tracker.handle_activity_signal() == ActivityOutcome::Started;
        }

        debug!(training_day = %day.id, signals, started, "Activity routed");
        RouteOutcome {
            signals,
            started,
            status: Some(SessionStatus::from_state(tracker.state())),
        }
    }

    /// Existing live tracker for the day, or a fresh one
    ///
    /// A finished tracker still waiting for retirement is replaced.
    pub fn get_or_create(&self, context: &SessionContext, day: &TrainingDay) -> Arc<SessionTracker> {
        let mut trackers = self.write();
        if let Some(existing) = trackers.get(&day.id) {
            if !existing.is_finished() {
                return Arc::clone(existing);
            }
        }

        let mut snapshot = day.clone();
        snapshot.clear_session();
        let tracker = SessionTracker::new(
            context.clone(),
            snapshot,
            self.inactivity_window,
            Arc::clone(&self.clock),
            self.finished_tx.clone(),
        );
        trackers.insert(day.id.clone(), Arc::clone(&tracker));
        tracker
    }

    /// Register an externally built tracker; an existing live tracker wins
    pub fn insert_tracker(&self, training_day_id: &str, tracker: Arc<SessionTracker>) -> Arc<SessionTracker> {
        let mut trackers = self.write();
        match trackers.get(training_day_id) {
            Some(existing) if !existing.is_finished() => {
                debug!(training_day = %training_day_id, "Tracker already registered; keeping existing");
                Arc::clone(existing)
            }
            _ => {
                trackers.insert(training_day_id.to_string(), Arc::clone(&tracker));
                tracker
            }
        }
    }

    pub fn tracker(&self, training_day_id: &str) -> Option<Arc<SessionTracker>> {
        self.read().get(training_day_id).cloned()
    }

    /// Evict a tracker, disarming its timer first
    pub fn remove_tracker(&self, training_day_id: &str) -> bool {
        let removed = self.write().remove(training_day_id);
        match removed {
            Some(tracker) => {
                tracker.cancel();
                info!(training_day = %training_day_id, "Session tracker evicted");
                true
            }
            None => false,
        }
    }

    /// Evict every tracker of a plan
    pub fn remove_plan_trackers(&self, plan_id: &str) -> usize {
        let removed: Vec<Arc<SessionTracker>> = {
            let mut trackers = self.write();
            let ids: Vec<String> = trackers
                .iter()
                .filter(|(_, tracker)| tracker.context().plan_id == plan_id)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| trackers.remove(id)).collect()
        };

        for tracker in &removed {
            tracker.cancel();
        }
        if !removed.is_empty() {
            info!(plan = %plan_id, count = removed.len(), "Session trackers evicted for plan");
        }
        removed.len()
    }

    /// Drop the tracker that produced a finish event, if it is still the one registered
    pub fn retire(&self, training_day_id: &str, tracker_serial: u64) -> bool {
        let mut trackers = self.write();
        match trackers.get(training_day_id) {
            Some(tracker) if tracker.serial() == tracker_serial => {
                trackers.remove(training_day_id);
                true
            }
            _ => false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.read()
            .values()
            .filter(|tracker| !tracker.is_finished())
            .count()
    }

    /// Training-day ids with a live session
    pub fn active_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .read()
            .iter()
            .filter(|(_, tracker)| tracker.state().is_recording())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<SessionTracker>>> {
        self.trackers.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<SessionTracker>>> {
        self.trackers.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use crate::field_update::FieldUpdate;

    const WINDOW: Duration = Duration::from_secs(60);

    fn context() -> SessionContext {
        SessionContext {
            user_id: "user-1".to_string(),
            plan_id: "plan-1".to_string(),
            plan_title: "Plan".to_string(),
            week_index: 0,
            day_index: 0,
        }
    }

    fn registry() -> (Arc<SessionRegistry>, mpsc::UnboundedReceiver<FinishedSession>) {
        SessionRegistry::new(WINDOW, Arc::new(TokioClock::new()))
    }

    fn update(field: &str, value: &str) -> FieldUpdate {
        FieldUpdate::decode(0, field, value).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_structural_edit_does_not_create_tracker() {
        let (registry, _rx) = registry();
        let day = TrainingDay::new();

        let outcome = registry.route_activity(&context(), &day, &[update("day1_exercise1_sets", "5")]);
        assert_eq!(outcome.signals, 0);
        assert!(outcome.status.is_none());
        assert!(registry.tracker(&day.id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_signal_reuses_tracker() {
        let (registry, _rx) = registry();
        let day = TrainingDay::new();

        let first = registry.route_activity(&context(), &day, &[update("day1_exercise1_weight", "100")]);
        assert!(first.started);
        let tracker = registry.tracker(&day.id).unwrap();

        let second = registry.route_activity(&context(), &day, &[update("day1_exercise1_actualRPE", "8")]);
        assert!(!second.started);
        assert!(Arc::ptr_eq(&tracker, &registry.tracker(&day.id).unwrap()));
        assert_eq!(registry.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_keeps_existing_live_tracker() {
        let (registry, _rx) = registry();
        let day = TrainingDay::new();
        let existing = registry.get_or_create(&context(), &day);
        existing.handle_activity_signal();

        let (tx, _other_rx) = mpsc::unbounded_channel();
        let duplicate = SessionTracker::new(context(), day.clone(), WINDOW, Arc::new(TokioClock::new()), tx);
        let kept = registry.insert_tracker(&day.id, duplicate);
        assert!(Arc::ptr_eq(&kept, &existing));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_tracker_prevents_finish() {
        let (registry, mut rx) = registry();
        let day = TrainingDay::new();
        registry.route_activity(&context(), &day, &[update("day1_exercise1_weight", "100")]);

        assert!(registry.remove_tracker(&day.id));
        assert!(!registry.remove_tracker(&day.id));

        tokio::time::sleep(WINDOW * 3).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retire_only_matching_serial() {
        let (registry, mut rx) = registry();
        let day = TrainingDay::new();
        registry.route_activity(&context(), &day, &[update("day1_exercise1_weight", "100")]);

        let finished = rx.recv().await.unwrap();
        assert!(!registry.retire(&day.id, finished.tracker_serial + 1000));
        assert!(registry.retire(&day.id, finished.tracker_serial));
        assert!(registry.tracker(&day.id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_plan_trackers() {
        let (registry, _rx) = registry();
        let days = [TrainingDay::new(), TrainingDay::new()];
        for day in &days {
            registry.route_activity(&context(), day, &[update("day1_exercise1_weight", "60")]);
        }
        assert_eq!(registry.active_sessions().len(), 2);

        assert_eq!(registry.remove_plan_trackers("plan-1"), 2);
        assert_eq!(registry.active_count(), 0);
    }
}
