//! Notification delivery boundary
//!
//! Delivery is fire-and-forget: the finish worker logs failures and moves on.

use async_trait::async_trait;
use tracing::info;

use crate::models::TrainingDayFinishedNotification;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        user_id: &str,
        payload: &TrainingDayFinishedNotification,
    ) -> anyhow::Result<()>;
}

/// Writes finished sessions to the log instead of pushing them anywhere
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        user_id: &str,
        payload: &TrainingDayFinishedNotification,
    ) -> anyhow::Result<()> {
        info!(
            user = %user_id,
            plan = %payload.training_plan_title,
            week = payload.week_index + 1,
            day = payload.day_index + 1,
            tonnage = %payload.tonnage,
            duration_minutes = payload.duration_in_minutes,
            "Training day finished"
        );
        Ok(())
    }
}
