//! Field-update codec for partial training-day edits
//!
//! Clients send partial updates as a map from field identifier to new value.
//! Identifiers use the fixed-offset layout `day{D}_exercise{E}_{attribute}`:
//!
//! | offset | content                                   |
//! |--------|-------------------------------------------|
//! | 0..3   | literal `day`                             |
//! | 3      | 1-based day number, one ASCII digit       |
//! | 4..13  | literal `_exercise`                       |
//! | 13..   | 1-based exercise ordinal, ASCII digits    |
//! | ..     | `_` followed by the attribute suffix      |
//!
//! The week is not encoded; it is taken from the request. Inside the crate
//! every identifier is a structured [`FieldId`] and the string form only
//! exists at the boundary.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::error::{DecodeError, MismatchError};
use crate::models::{
    parse_decimal, CategorySettings, Exercise, ExerciseCategory, RpeValue, TrainingDay,
    TrainingPlan,
};

const DAY_PREFIX: &str = "day";
const DAY_OFFSET: usize = 3;
const EXERCISE_PREFIX: &str = "_exercise";
const EXERCISE_PREFIX_OFFSET: usize = 4;
const EXERCISE_OFFSET: usize = 13;

/// Settings that apply to every exercise sharing a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CategorySetting {
    PauseTime,
    DefaultSets,
    DefaultReps,
    DefaultRpe,
}

/// The attribute a field identifier addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attribute {
    Category,
    ExerciseName,
    Sets,
    Reps,
    Weight,
    TargetRpe,
    ActualRpe,
    EstMax,
    Notes,
    CategoryWide(CategorySetting),
}

impl Attribute {
    pub const ALL: [Attribute; 13] = [
        Attribute::Category,
        Attribute::ExerciseName,
        Attribute::Sets,
        Attribute::Reps,
        Attribute::Weight,
        Attribute::TargetRpe,
        Attribute::ActualRpe,
        Attribute::EstMax,
        Attribute::Notes,
        Attribute::CategoryWide(CategorySetting::PauseTime),
        Attribute::CategoryWide(CategorySetting::DefaultSets),
        Attribute::CategoryWide(CategorySetting::DefaultReps),
        Attribute::CategoryWide(CategorySetting::DefaultRpe),
    ];

    /// Wire suffix of the identifier
    pub fn suffix(&self) -> &'static str {
        match self {
            Attribute::Category => "category",
            Attribute::ExerciseName => "exercise_name",
            Attribute::Sets => "sets",
            Attribute::Reps => "reps",
            Attribute::Weight => "weight",
            Attribute::TargetRpe => "targetRPE",
            Attribute::ActualRpe => "actualRPE",
            Attribute::EstMax => "estMax",
            Attribute::Notes => "notes",
            Attribute::CategoryWide(CategorySetting::PauseTime) => "categoryPauseTimeSelect",
            Attribute::CategoryWide(CategorySetting::DefaultSets) => "categoryDefaultSetSelect",
            Attribute::CategoryWide(CategorySetting::DefaultReps) => "categoryDefaultRepSelect",
            Attribute::CategoryWide(CategorySetting::DefaultRpe) => "categoryDefaultRPESelect",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Attribute::ALL.iter().find(|a| a.suffix() == suffix).copied()
    }

    /// Week-specific fields that never replicate into future weeks
    pub fn is_performance(&self) -> bool {
        matches!(
            self,
            Attribute::Weight | Attribute::ActualRpe | Attribute::EstMax | Attribute::Notes
        )
    }

    fn apply_rank(&self) -> u8 {
        match self {
            Attribute::Category => 0,
            Attribute::CategoryWide(_) => 2,
            _ => 1,
        }
    }
}

/// Structured field identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldId {
    /// 0-based week index, from the request
    pub week: usize,
    /// 0-based day index within the week
    pub day: usize,
    /// 1-based exercise ordinal within the day
    pub exercise: usize,
    pub attribute: Attribute,
}

impl FieldId {
    pub fn new(week: usize, day: usize, exercise: usize, attribute: Attribute) -> Self {
        Self {
            week,
            day,
            exercise,
            attribute,
        }
    }

    /// Wire form. Days past the ninth cannot be encoded in the single-digit slot.
    pub fn encode(&self) -> String {
        format!(
            "{}{}{}{}_{}",
            DAY_PREFIX,
            self.day + 1,
            EXERCISE_PREFIX,
            self.exercise,
            self.attribute.suffix()
        )
    }

    /// Decode a wire identifier received for `week`
    pub fn decode(week: usize, field: &str) -> Result<Self, DecodeError> {
        let malformed = |expected: &'static str, offset: usize| DecodeError::MalformedIdentifier {
            field: field.to_string(),
            expected,
            offset,
        };
        let invalid_digit = |offset: usize, found: char| DecodeError::InvalidDigit {
            field: field.to_string(),
            offset,
            found,
        };

        if !field.is_ascii() {
            return Err(DecodeError::NotAscii {
                field: field.to_string(),
            });
        }
        if !field.starts_with(DAY_PREFIX) {
            return Err(malformed(DAY_PREFIX, 0));
        }

        let day_char = field[DAY_OFFSET..]
            .chars()
            .next()
            .ok_or_else(|| malformed("<day digit>", DAY_OFFSET))?;
        let day_number = day_char
            .to_digit(10)
            .ok_or_else(|| invalid_digit(DAY_OFFSET, day_char))? as usize;

        if field.get(EXERCISE_PREFIX_OFFSET..EXERCISE_OFFSET) != Some(EXERCISE_PREFIX) {
            return Err(malformed(EXERCISE_PREFIX, EXERCISE_PREFIX_OFFSET));
        }

        let rest = &field[EXERCISE_OFFSET..];
        let digits_end = rest.find('_').ok_or_else(|| malformed("_", field.len()))?;
        let digits = &rest[..digits_end];
        if digits.is_empty() {
            return Err(malformed("<exercise ordinal>", EXERCISE_OFFSET));
        }
        if let Some((i, c)) = digits.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
            return Err(invalid_digit(EXERCISE_OFFSET + i, c));
        }
        let exercise: usize = digits
            .parse()
            .map_err(|_| malformed("<exercise ordinal>", EXERCISE_OFFSET))?;

        if day_number == 0 || exercise == 0 {
            return Err(DecodeError::ZeroIndex {
                field: field.to_string(),
            });
        }

        let suffix = &rest[digits_end + 1..];
        let attribute = Attribute::from_suffix(suffix).ok_or_else(|| DecodeError::UnknownAttribute {
            field: field.to_string(),
            suffix: suffix.to_string(),
        })?;

        Ok(Self {
            week,
            day: day_number - 1,
            exercise,
            attribute,
        })
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// A typed change, converted from the raw client value
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Category(ExerciseCategory),
    ExerciseName(String),
    Sets(u32),
    Reps(u32),
    Weight(String),
    TargetRpe(Option<RpeValue>),
    ActualRpe(Option<RpeValue>),
    EstMax(Option<Decimal>),
    Notes(Option<String>),
    PauseTime(String),
    DefaultSets(u32),
    DefaultReps(u32),
    DefaultRpe(Option<RpeValue>),
}

impl Change {
    fn parse(attribute: Attribute, raw: &str) -> Result<Self, String> {
        let change = match attribute {
            Attribute::Category => Change::Category(raw.parse()?),
            Attribute::ExerciseName => Change::ExerciseName(raw.trim().to_string()),
            Attribute::Sets => Change::Sets(parse_count(raw)?),
            Attribute::Reps => Change::Reps(parse_count(raw)?),
            Attribute::Weight => Change::Weight(raw.trim().to_string()),
            Attribute::TargetRpe => Change::TargetRpe(RpeValue::parse(raw)),
            Attribute::ActualRpe => Change::ActualRpe(RpeValue::parse(raw)),
            Attribute::EstMax => Change::EstMax(parse_optional_decimal(raw)?),
            Attribute::Notes => Change::Notes(non_empty(raw)),
            Attribute::CategoryWide(CategorySetting::PauseTime) => {
                Change::PauseTime(raw.trim().to_string())
            }
            Attribute::CategoryWide(CategorySetting::DefaultSets) => {
                Change::DefaultSets(parse_count(raw)?)
            }
            Attribute::CategoryWide(CategorySetting::DefaultReps) => {
                Change::DefaultReps(parse_count(raw)?)
            }
            Attribute::CategoryWide(CategorySetting::DefaultRpe) => {
                Change::DefaultRpe(RpeValue::parse(raw))
            }
        };
        Ok(change)
    }

    pub fn is_performance(&self) -> bool {
        matches!(
            self,
            Change::Weight(_) | Change::ActualRpe(_) | Change::EstMax(_) | Change::Notes(_)
        )
    }

    pub fn is_category_wide(&self) -> bool {
        matches!(
            self,
            Change::PauseTime(_) | Change::DefaultSets(_) | Change::DefaultReps(_) | Change::DefaultRpe(_)
        )
    }
}

fn parse_count(raw: &str) -> Result<u32, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed
        .parse::<u32>()
        .map_err(|_| "expected a whole number >= 0".to_string())
}

fn parse_optional_decimal(raw: &str) -> Result<Option<Decimal>, String> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    parse_decimal(raw)
        .map(Some)
        .ok_or_else(|| "expected a number".to_string())
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// One decoded entry of a partial-update payload
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub id: FieldId,
    /// Value as the client sent it
    pub raw: String,
    pub change: Change,
}

impl FieldUpdate {
    /// Build an update from a structured identifier and a raw value
    pub fn new(id: FieldId, raw: impl Into<String>) -> Result<Self, DecodeError> {
        let raw = raw.into();
        let change = Change::parse(id.attribute, &raw).map_err(|reason| DecodeError::InvalidValue {
            field: id.encode(),
            value: raw.clone(),
            reason,
        })?;
        Ok(Self { id, raw, change })
    }

    /// Decode a wire identifier and its value
    pub fn decode(week: usize, field: &str, raw: &str) -> Result<Self, DecodeError> {
        Self::new(FieldId::decode(week, field)?, raw)
    }

    /// Only weight or actual RPE with a value count as live training activity
    pub fn is_activity_signal(&self) -> bool {
        matches!(self.id.attribute, Attribute::Weight | Attribute::ActualRpe)
            && !self.raw.trim().is_empty()
    }

    pub fn is_deletion(&self) -> bool {
        matches!(self.change, Change::Category(category) if category.is_placeholder())
    }

    fn apply_order(&self) -> (bool, Reverse<usize>, usize, u8) {
        let ordinal = self.id.exercise;
        if self.is_deletion() {
            (true, Reverse(ordinal), 0, 0)
        } else {
            (false, Reverse(0), ordinal, self.id.attribute.apply_rank())
        }
    }
}

/// Decode a whole payload for one week, in application order
///
/// The first malformed entry aborts the payload. Deletions come last and in
/// descending ordinal so they never shift the target of another update.
pub fn decode_payload(
    week: usize,
    payload: &HashMap<String, String>,
) -> Result<Vec<FieldUpdate>, DecodeError> {
    let mut fields: Vec<(&String, &String)> = payload.iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    let mut updates = fields
        .into_iter()
        .map(|(field, raw)| FieldUpdate::decode(week, field, raw))
        .collect::<Result<Vec<_>, _>>()?;

    updates.sort_by_key(FieldUpdate::apply_order);
    Ok(updates)
}

/// Whether an update is applied to the edited week or replicated to a later one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    Direct,
    /// Structural fields only; unaddressable slots are skipped
    Propagation,
}

/// What applying an update did to the day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Created,
    Deleted,
    Updated,
    CategoryWide {
        category: ExerciseCategory,
        exercises: usize,
    },
    /// Performance field withheld in propagation mode
    Suppressed,
    /// Slot not addressable in propagation mode
    Skipped,
    Unchanged,
}

/// Apply one update to a training day
pub fn apply_update(
    day: &mut TrainingDay,
    update: &FieldUpdate,
    mode: ApplyMode,
) -> Result<Applied, MismatchError> {
    let ordinal = update.id.exercise;
    let len = day.exercises.len();
    let Some(index) = ordinal.checked_sub(1) else {
        return match mode {
            ApplyMode::Direct => Err(MismatchError::ExerciseNotFound {
                ordinal,
                exercises: len,
            }),
            ApplyMode::Propagation => Ok(Applied::Skipped),
        };
    };

    let missing = || match mode {
        ApplyMode::Direct => Err(MismatchError::ExerciseNotFound {
            ordinal,
            exercises: len,
        }),
        ApplyMode::Propagation => Ok(Applied::Skipped),
    };

    if mode == ApplyMode::Propagation && update.change.is_performance() {
        return Ok(Applied::Suppressed);
    }

    match &update.change {
        Change::Category(category) if category.is_placeholder() => {
            if index < len {
                day.exercises.remove(index);
                Ok(Applied::Deleted)
            } else {
                Ok(Applied::Unchanged)
            }
        }
        Change::Category(category) => {
            if index < len {
                day.exercises[index].category = *category;
                Ok(Applied::Updated)
            } else if index == len {
                day.exercises.push(Exercise::new(*category));
                Ok(Applied::Created)
            } else {
                match mode {
                    ApplyMode::Direct => Err(MismatchError::OrdinalGap {
                        ordinal,
                        exercises: len,
                    }),
                    ApplyMode::Propagation => Ok(Applied::Skipped),
                }
            }
        }
        change if change.is_category_wide() => {
            let Some(anchor) = day.exercise(ordinal) else {
                return missing();
            };
            let category = anchor.category;
            let mut touched = 0;
            for exercise in day.exercises.iter_mut().filter(|e| e.category == category) {
                match change {
                    Change::DefaultSets(sets) => exercise.sets = *sets,
                    Change::DefaultReps(reps) => exercise.reps = *reps,
                    Change::DefaultRpe(rpe) => exercise.target_rpe = rpe.clone(),
                    _ => {}
                }
                touched += 1;
            }
            Ok(Applied::CategoryWide {
                category,
                exercises: touched,
            })
        }
        change => {
            let Some(exercise) = day.exercise_mut(ordinal) else {
                return missing();
            };
            match change {
                Change::ExerciseName(name) => exercise.exercise_name = name.clone(),
                Change::Sets(sets) => exercise.sets = *sets,
                Change::Reps(reps) => exercise.reps = *reps,
                Change::Weight(weight) => exercise.weight = weight.clone(),
                Change::TargetRpe(rpe) => exercise.target_rpe = rpe.clone(),
                Change::ActualRpe(rpe) => exercise.actual_rpe = rpe.clone(),
                Change::EstMax(est_max) => exercise.est_max = *est_max,
                Change::Notes(notes) => exercise.notes = notes.clone(),
                // handled in the arms above
                Change::Category(_)
                | Change::PauseTime(_)
                | Change::DefaultSets(_)
                | Change::DefaultReps(_)
                | Change::DefaultRpe(_) => return Ok(Applied::Unchanged),
            }
            Ok(Applied::Updated)
        }
    }
}

/// Outcome of fanning an update out to later weeks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationSummary {
    pub weeks_changed: usize,
    pub weeks_skipped: usize,
}

/// Replicate a structural update into every week after the edited one
pub fn propagate_update(plan: &mut TrainingPlan, update: &FieldUpdate) -> PropagationSummary {
    let mut summary = PropagationSummary::default();
    if update.change.is_performance() {
        return summary;
    }

    for (offset, week) in plan.weeks.iter_mut().skip(update.id.week + 1).enumerate() {
        let Some(day) = week.days.get_mut(update.id.day) else {
            summary.weeks_skipped += 1;
            continue;
        };

        match apply_update(day, update, ApplyMode::Propagation) {
            Ok(Applied::Skipped | Applied::Suppressed | Applied::Unchanged) => {
                summary.weeks_skipped += 1
            }
            Ok(_) => summary.weeks_changed += 1,
            Err(err) => {
                debug!(
                    field = %update.id,
                    week = update.id.week + 1 + offset,
                    error = %err,
                    "Propagation skipped week"
                );
                summary.weeks_skipped += 1;
            }
        }
    }

    summary
}

/// Record a category-wide change in the user's category defaults
pub fn record_category_setting(settings: &mut CategorySettings, change: &Change) {
    match change {
        Change::PauseTime(pause) => settings.pause_time = non_empty(pause),
        Change::DefaultSets(sets) => settings.default_sets = Some(*sets),
        Change::DefaultReps(reps) => settings.default_reps = Some(*reps),
        Change::DefaultRpe(rpe) => settings.default_rpe = rpe.clone(),
        _ => {}
    }
}
