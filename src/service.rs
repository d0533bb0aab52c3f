//! Operations exposed to the owning application
//!
//! Every operation that modifies a user document runs under that user's write
//! lock: load, modify a working copy, persist. A failed step leaves the
//! stored document untouched.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::clock::{Clock, TokioClock};
use crate::config::{AppConfig, ProgressionSettings};
use crate::error::{LiftRsError, MismatchError, Result};
use crate::field_update::{
    apply_update, decode_payload, propagate_update, record_category_setting, Applied, ApplyMode,
};
use crate::models::{TrainingDay, TrainingDayFinishedNotification, TrainingPlan, User};
use crate::notify::Notifier;
use crate::progression::{apply_progression, ProgressionOptions, ProgressionReport};
use crate::session::{SessionCallbacks, SessionContext, SessionFinishWorker, SessionRegistry};
use crate::store::{DocumentStore, UserLocks};

/// Largest week that fits the single-digit day slot of field identifiers
pub const MAX_TRAINING_FREQUENCY: usize = 9;

/// Parameters for creating a plan
#[derive(Debug, Clone)]
pub struct NewPlan {
    pub title: String,
    pub training_frequency: usize,
    pub week_count: usize,
    /// Clone the structure of another of the user's plans
    pub template_plan_id: Option<String>,
}

pub struct TrainingService {
    store: Arc<dyn DocumentStore>,
    registry: Arc<SessionRegistry>,
    locks: Arc<UserLocks>,
    callbacks: SessionCallbacks,
    progression: ProgressionSettings,
    worker: JoinHandle<()>,
}

impl TrainingService {
    /// Build the service and spawn its session finish worker
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &AppConfig, store: Arc<dyn DocumentStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self::start_with_clock(config, store, notifier, Arc::new(TokioClock::new()))
    }

    pub fn start_with_clock(
        config: &AppConfig,
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (registry, finished_rx) = SessionRegistry::new(config.session.inactivity_window(), clock);
        let locks = Arc::new(UserLocks::new());
        let callbacks = SessionCallbacks::default();

        let worker = SessionFinishWorker::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            notifier,
            Arc::clone(&locks),
            callbacks.clone(),
        )
        .with_min_session_minutes(config.session.min_session_minutes)
        .spawn(finished_rx);

        Self {
            store,
            registry,
            locks,
            callbacks,
            progression: config.progression.clone(),
            worker,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Register a callback for every finished training day
    pub fn on_session_finished<F>(&self, callback: F)
    where
        F: Fn(&str, &TrainingDayFinishedNotification) + Send + Sync + 'static,
    {
        self.callbacks.register(Arc::new(callback));
    }

    /// Training-day ids currently recording
    pub fn active_sessions(&self) -> Vec<String> {
        self.registry.active_sessions()
    }

    /// Decode, apply and propagate a partial update, then route its activity
    pub async fn apply_partial_update(
        &self,
        user_id: &str,
        plan_id: &str,
        week_index: usize,
        day_index: usize,
        payload: &HashMap<String, String>,
    ) -> Result<TrainingDay> {
        let _guard = self.locks.lock(user_id).await;
        let mut user = self.store.find_user_by_id(user_id).await?;
        let plan = find_plan_mut(&mut user, plan_id)?;
        check_day(plan, week_index, day_index)?;

        let updates = decode_payload(week_index, payload)?;
        if let Some(foreign) = updates.iter().find(|u| u.id.day != day_index) {
            return Err(MismatchError::DayMismatch {
                expected: day_index,
                found: foreign.id.day,
            }
            .into());
        }

        let mut working = plan.clone();
        let mut category_changes = Vec::new();
        for update in &updates {
            let day = working
                .day_mut(week_index, day_index)
                .ok_or(MismatchError::DayOutOfRange { day: day_index, days: 0 })?;
            let applied = apply_update(day, update, ApplyMode::Direct)?;
            debug!(field = %update.id, ?applied, "Field update applied");

            if let Applied::CategoryWide { category, .. } = applied {
                category_changes.push((category, update.change.clone()));
            }
            propagate_update(&mut working, update);
        }

        let context = SessionContext {
            user_id: user_id.to_string(),
            plan_id: plan_id.to_string(),
            plan_title: working.title.clone(),
            week_index,
            day_index,
        };
        let day = working
            .day_mut(week_index, day_index)
            .ok_or(MismatchError::DayOutOfRange { day: day_index, days: 0 })?;
        let outcome = self.registry.route_activity(&context, day, &updates);
        if let Some(status) = outcome.status {
            status.apply_to(day);
        }
        let updated_day = day.clone();

        working.last_updated = self.registry.clock().now();
        *plan = working;
        for (category, change) in &category_changes {
            record_category_setting(user.category_settings.entry(*category).or_default(), change);
        }

        self.store.update(&user).await?;
        Ok(updated_day)
    }

    /// Run the progression engine over a stored plan
    pub async fn run_auto_progression(
        &self,
        user_id: &str,
        plan_id: &str,
        options: ProgressionOptions,
    ) -> Result<ProgressionReport> {
        let _guard = self.locks.lock(user_id).await;
        let mut user = self.store.find_user_by_id(user_id).await?;
        let plan = find_plan_mut(&mut user, plan_id)?;

        let mut working = plan.clone();
        let report = apply_progression(&mut working, &options, &self.progression.limits)?;
        working.last_updated = self.registry.clock().now();
        *plan = working;

        self.store.update(&user).await?;
        Ok(report)
    }

    /// Create a plan, empty or cloned from one of the user's plans
    pub async fn create_plan(&self, user_id: &str, new_plan: NewPlan) -> Result<TrainingPlan> {
        let _guard = self.locks.lock(user_id).await;
        let mut user = self.store.find_user_by_id(user_id).await?;

        let plan = match &new_plan.template_plan_id {
            Some(template_id) => {
                let template = user.plan(template_id).ok_or_else(|| MismatchError::PlanNotFound {
                    plan_id: template_id.clone(),
                })?;
                TrainingPlan::from_template(template, new_plan.title.clone())
            }
            None => {
                if new_plan.training_frequency == 0
                    || new_plan.training_frequency > MAX_TRAINING_FREQUENCY
                {
                    return Err(LiftRsError::Validation(format!(
                        "training frequency must be between 1 and {}, got {}",
                        MAX_TRAINING_FREQUENCY, new_plan.training_frequency
                    )));
                }
                TrainingPlan::new(new_plan.title.clone(), new_plan.training_frequency, new_plan.week_count)
            }
        };

        user.training_plans.push(plan.clone());
        self.store.update(&user).await?;
        info!(user = %user_id, plan = %plan.id, "Training plan created");
        Ok(plan)
    }

    /// Delete a plan and evict its session trackers
    pub async fn delete_plan(&self, user_id: &str, plan_id: &str) -> Result<()> {
        let _guard = self.locks.lock(user_id).await;
        let mut user = self.store.find_user_by_id(user_id).await?;

        let position = user
            .training_plans
            .iter()
            .position(|p| p.id == plan_id)
            .ok_or_else(|| MismatchError::PlanNotFound {
                plan_id: plan_id.to_string(),
            })?;
        user.training_plans.remove(position);

        self.registry.remove_plan_trackers(plan_id);
        self.store.update(&user).await?;
        info!(user = %user_id, plan = %plan_id, "Training plan deleted");
        Ok(())
    }

    /// Add or remove whole weeks; trackers of removed days are evicted
    pub async fn set_week_count(&self, user_id: &str, plan_id: &str, week_count: usize) -> Result<()> {
        let _guard = self.locks.lock(user_id).await;
        let mut user = self.store.find_user_by_id(user_id).await?;
        let plan = find_plan_mut(&mut user, plan_id)?;

        let removed_days: Vec<String> = plan
            .weeks
            .iter()
            .skip(week_count)
            .flat_map(|week| week.days.iter().map(|day| day.id.clone()))
            .collect();

        plan.set_week_count(week_count);
        plan.last_updated = self.registry.clock().now();

        for day_id in &removed_days {
            self.registry.remove_tracker(day_id);
        }
        self.store.update(&user).await?;
        Ok(())
    }
}

impl Drop for TrainingService {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

fn find_plan_mut<'a>(user: &'a mut User, plan_id: &str) -> Result<&'a mut TrainingPlan> {
    user.plan_mut(plan_id).ok_or_else(|| {
        MismatchError::PlanNotFound {
            plan_id: plan_id.to_string(),
        }
        .into()
    })
}

fn check_day(plan: &TrainingPlan, week_index: usize, day_index: usize) -> Result<()> {
    let week = plan.weeks.get(week_index).ok_or(MismatchError::WeekOutOfRange {
        week: week_index,
        weeks: plan.weeks.len(),
    })?;
    if day_index >= week.days.len() {
        return Err(MismatchError::DayOutOfRange {
            day: day_index,
            days: week.days.len(),
        }
        .into());
    }
    Ok(())
}
