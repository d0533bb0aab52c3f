//! Single consumer of session-finished events
//!
//! Trackers never call into persistence themselves. They send a
//! [`FinishedSession`] and this worker writes it, notifies, and retires the
//! tracker, one event at a time.

use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::registry::SessionRegistry;
use super::tracker::FinishedSession;
use crate::error::{LiftRsError, MismatchError};
use crate::models::TrainingDayFinishedNotification;
use crate::notify::Notifier;
use crate::store::{DocumentStore, UserLocks};

pub type SessionFinishedCallback = Arc<dyn Fn(&str, &TrainingDayFinishedNotification) + Send + Sync>;

/// Callbacks invoked after a finished session was handled
#[derive(Clone, Default)]
pub struct SessionCallbacks {
    callbacks: Arc<RwLock<Vec<SessionFinishedCallback>>>,
}

impl SessionCallbacks {
    pub fn register(&self, callback: SessionFinishedCallback) {
        self.callbacks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(callback);
    }

    fn invoke(&self, user_id: &str, notification: &TrainingDayFinishedNotification) {
        let callbacks = self
            .callbacks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for callback in callbacks {
            callback(user_id, notification);
        }
    }
}

pub struct SessionFinishWorker {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
    locks: Arc<UserLocks>,
    callbacks: SessionCallbacks,
    /// Sessions shorter than this are persisted but raise no notification
    min_session_minutes: Option<u32>,
}

impl SessionFinishWorker {
    pub fn new(
        registry: Arc<SessionRegistry>,
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn Notifier>,
        locks: Arc<UserLocks>,
        callbacks: SessionCallbacks,
    ) -> Self {
        Self {
            registry,
            store,
            notifier,
            locks,
            callbacks,
            min_session_minutes: None,
        }
    }

    pub fn with_min_session_minutes(mut self, min_session_minutes: Option<u32>) -> Self {
        self.min_session_minutes = min_session_minutes;
        self
    }

    pub fn spawn(self, finished_rx: mpsc::UnboundedReceiver<FinishedSession>) -> JoinHandle<()> {
        tokio::spawn(self.run(finished_rx))
    }

    pub async fn run(self, mut finished_rx: mpsc::UnboundedReceiver<FinishedSession>) {
        while let Some(finished) = finished_rx.recv().await {
            self.handle(finished).await;
        }
        debug!("Session finish channel closed");
    }

    /// Persist, notify and retire one finished session
    pub async fn handle(&self, finished: FinishedSession) -> Option<TrainingDayFinishedNotification> {
        let context = &finished.context;
        let duration = finished.training_day.duration_in_minutes.unwrap_or(0);

        let notification = match self.min_session_minutes {
            Some(min) if duration < min => {
                debug!(
                    training_day = %finished.training_day.id,
                    duration, min, "Session below minimum duration; no notification"
                );
                None
            }
            _ => Some(TrainingDayFinishedNotification::new(
                context.plan_id.clone(),
                context.plan_title.clone(),
                context.week_index,
                context.day_index,
                finished.training_day.clone(),
                finished
                    .training_day
                    .end_time
                    .unwrap_or_else(|| self.registry.clock().now()),
            )),
        };

        let notification = match self.persist(&finished, notification.as_ref()).await {
            Ok(()) => {
                info!(
                    user = %context.user_id,
                    training_day = %finished.training_day.id,
                    "Finished session persisted"
                );
                notification
            }
            Err(LiftRsError::Mismatch(err @ MismatchError::PlanNotFound { .. })) => {
                info!(
                    user = %context.user_id,
                    training_day = %finished.training_day.id,
                    error = %err,
                    "Plan removed before session could be persisted; not notifying"
                );
                None
            }
            Err(err) => {
                error!(
                    user = %context.user_id,
                    training_day = %finished.training_day.id,
                    error = %err,
                    retryable = err.is_retryable(),
                    "Failed to persist finished session"
                );
                notification
            }
        };

        if let Some(notification) = &notification {
            if let Err(err) = self.notifier.notify(&context.user_id, notification).await {
                warn!(user = %context.user_id, error = %err, "Notification delivery failed");
            }
            self.callbacks.invoke(&context.user_id, notification);
        }

        self.registry
            .retire(&finished.training_day.id, finished.tracker_serial);
        notification
    }

    fn is_superseded(&self, finished: &FinishedSession) -> bool {
        self.registry
            .tracker(&finished.training_day.id)
            .map_or(false, |tracker| {
                tracker.serial() != finished.tracker_serial && !tracker.is_finished()
            })
    }

    async fn persist(
        &self,
        finished: &FinishedSession,
        notification: Option<&TrainingDayFinishedNotification>,
    ) -> Result<(), LiftRsError> {
        let context = &finished.context;
        let _guard = self.locks.lock(&context.user_id).await;

        let mut user = self.store.find_user_by_id(&context.user_id).await?;
        let plan = user
            .plan_mut(&context.plan_id)
            .ok_or_else(|| MismatchError::PlanNotFound {
                plan_id: context.plan_id.clone(),
            })?;
        let weeks = plan.weeks.len();
        let (_, _, day) = plan
            .find_day_mut(&finished.training_day.id)
            .ok_or(MismatchError::WeekOutOfRange {
                week: context.week_index,
                weeks,
            })?;

        // a newer session already owns the day's session attributes
        if self.is_superseded(finished) {
            debug!(
                training_day = %finished.training_day.id,
                "Newer session recording; keeping its session attributes"
            );
        } else {
            day.recording = false;
            day.start_time = finished.training_day.start_time;
            day.end_time = finished.training_day.end_time;
            day.duration_in_minutes = finished.training_day.duration_in_minutes;
            if let Some(end_time) = finished.training_day.end_time {
                plan.last_updated = end_time;
            }
        }

        if let Some(notification) = notification {
            user.notifications.push(notification.clone());
        }

        self.store.update(&user).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use crate::field_update::FieldUpdate;
    use crate::models::{TrainingDay, User};
    use crate::session::tracker::SessionContext;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const WINDOW: Duration = Duration::from_secs(60);

    #[derive(Default)]
    struct CountingNotifier {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn notify(&self, _user_id: &str, _payload: &TrainingDayFinishedNotification) -> anyhow::Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn context(user_id: &str) -> SessionContext {
        SessionContext {
            user_id: user_id.to_string(),
            plan_id: "removed-plan".to_string(),
            plan_title: "Removed".to_string(),
            week_index: 0,
            day_index: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_plan_is_not_notified() {
        let user = User::new("lifter");
        let user_id = user.id.clone();
        let store = Arc::new(InMemoryStore::with_users([user]));
        let notifier = Arc::new(CountingNotifier::default());
        let callbacks = SessionCallbacks::default();
        let invoked = Arc::new(AtomicUsize::new(0));
        {
            let invoked = Arc::clone(&invoked);
            callbacks.register(Arc::new(move |_: &str, _: &TrainingDayFinishedNotification| {
                invoked.fetch_add(1, Ordering::SeqCst);
            }));
        }

        let (registry, mut finished_rx) = SessionRegistry::new(WINDOW, Arc::new(TokioClock::new()));
        let day = TrainingDay::new();
        let signal = FieldUpdate::decode(0, "day1_exercise1_weight", "80").unwrap();
        registry.route_activity(&context(&user_id), &day, &[signal]);
        let finished = finished_rx.recv().await.unwrap();

        let worker = SessionFinishWorker::new(
            Arc::clone(&registry),
            store.clone(),
            notifier.clone(),
            Arc::new(UserLocks::new()),
            callbacks,
        );
        assert!(worker.handle(finished).await.is_none());

        assert_eq!(notifier.sent.load(Ordering::SeqCst), 0);
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert!(store.find_user_by_id(&user_id).await.unwrap().notifications.is_empty());
        assert!(registry.tracker(&day.id).is_none());
    }
}
