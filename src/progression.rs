//! Week-over-week RPE progression and deload generation
//!
//! Every week after the first takes its target RPE from the same slot of
//! the week before, raised by a fixed increment and capped per category. An
//! optional final deload week drops a set and resets the target RPE. Weeks
//! are processed in order, so increases accumulate across the plan.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ProgressionError;
use crate::models::{Exercise, ExerciseCategory, RpeValue, TrainingPlan};

/// Per-run parameters chosen by the user
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressionOptions {
    pub rpe_increase: Decimal,
    pub deload_last_week: bool,
}

impl Default for ProgressionOptions {
    fn default() -> Self {
        Self {
            rpe_increase: dec!(0.5),
            deload_last_week: false,
        }
    }
}

/// Caps and deload targets, split between main lifts and accessories
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressionLimits {
    pub main_rpe_cap: Decimal,
    pub accessory_rpe_cap: Decimal,
    pub main_deload_rpe: Decimal,
    pub accessory_deload_rpe: Decimal,
}

impl Default for ProgressionLimits {
    fn default() -> Self {
        Self {
            main_rpe_cap: dec!(9),
            accessory_rpe_cap: dec!(10),
            main_deload_rpe: dec!(6),
            accessory_deload_rpe: dec!(7),
        }
    }
}

impl ProgressionLimits {
    pub fn rpe_cap(&self, category: ExerciseCategory) -> Decimal {
        if category.is_main() {
            self.main_rpe_cap
        } else {
            self.accessory_rpe_cap
        }
    }

    pub fn deload_rpe(&self, category: ExerciseCategory) -> Decimal {
        if category.is_main() {
            self.main_deload_rpe
        } else {
            self.accessory_deload_rpe
        }
    }
}

/// What a progression run changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionReport {
    pub adjusted: usize,
    pub deloaded: usize,
    /// Slot holds a different exercise than the week before
    pub skipped_mismatch: usize,
    pub skipped_unparsable: usize,
    /// Previous week had no target RPE
    pub skipped_empty: usize,
}

/// Raise an RPE by `increase`, each set independently, never above `cap`
pub fn progress_rpe(
    previous: &RpeValue,
    increase: Decimal,
    cap: Decimal,
) -> Result<RpeValue, ProgressionError> {
    let step = |value: Decimal| (value + increase).min(cap).normalize();

    match previous {
        RpeValue::Single(value) => Ok(RpeValue::Single(step(*value))),
        RpeValue::PerSet(values) => Ok(RpeValue::PerSet(values.iter().copied().map(step).collect())),
        RpeValue::Raw(text) => Err(ProgressionError::UnparsableRpe {
            value: text.clone(),
        }),
    }
}

/// Run the progression over every week after the first
pub fn apply_progression(
    plan: &mut TrainingPlan,
    options: &ProgressionOptions,
    limits: &ProgressionLimits,
) -> Result<ProgressionReport, ProgressionError> {
    if options.rpe_increase < Decimal::ZERO || options.rpe_increase > dec!(10) {
        return Err(ProgressionError::InvalidParameter {
            parameter: "rpe_increase".to_string(),
            value: options.rpe_increase.to_string(),
        });
    }

    let mut report = ProgressionReport::default();
    let week_count = plan.weeks.len();

    for week_index in 1..week_count {
        let deload = options.deload_last_week && week_index == week_count - 1;
        let (before, after) = plan.weeks.split_at_mut(week_index);
        let previous_week = &before[week_index - 1];
        let week = &mut after[0];

        for (day_index, day) in week.days.iter_mut().enumerate() {
            let Some(previous_day) = previous_week.days.get(day_index) else {
                continue;
            };

            for (position, exercise) in day.exercises.iter_mut().enumerate() {
                let Some(previous) = previous_day.exercises.get(position) else {
                    continue;
                };

                if previous.exercise_name != exercise.exercise_name {
                    debug!(
                        week = week_index,
                        day = day_index,
                        position,
                        "Exercise differs from previous week; slot left untouched"
                    );
                    report.skipped_mismatch += 1;
                    continue;
                }

                if deload {
                    deload_from(exercise, previous, limits);
                    report.deloaded += 1;
                    continue;
                }

                let Some(previous_rpe) = &previous.target_rpe else {
                    report.skipped_empty += 1;
                    continue;
                };

                match progress_rpe(previous_rpe, options.rpe_increase, limits.rpe_cap(exercise.category)) {
                    Ok(next) => {
                        exercise.target_rpe = Some(next);
                        report.adjusted += 1;
                    }
                    Err(err) => {
                        warn!(
                            week = week_index,
                            day = day_index,
                            exercise = %exercise.exercise_name,
                            error = %err,
                            "Skipping exercise in progression"
                        );
                        report.skipped_unparsable += 1;
                    }
                }
            }
        }
    }

    info!(
        plan = %plan.id,
        adjusted = report.adjusted,
        deloaded = report.deloaded,
        skipped = report.skipped_mismatch + report.skipped_unparsable,
        "Auto progression applied"
    );
    Ok(report)
}

/// Deload copy: prior week's structure, one set fewer, fixed RPE
fn deload_from(exercise: &mut Exercise, previous: &Exercise, limits: &ProgressionLimits) {
    exercise.category = previous.category;
    exercise.reps = previous.reps;
    exercise.sets = previous.sets.saturating_sub(1);
    exercise.target_rpe = Some(RpeValue::Single(limits.deload_rpe(previous.category)));
}
