use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Exercise categories a training day slot can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExerciseCategory {
    Squat,
    Bench,
    Deadlift,
    Overheadpress,
    Back,
    Chest,
    Shoulder,
    Biceps,
    Triceps,
    Legs,
    /// Empty slot; an exercise carrying it is considered deleted
    Placeholder,
}

impl ExerciseCategory {
    pub const ALL: [ExerciseCategory; 11] = [
        ExerciseCategory::Squat,
        ExerciseCategory::Bench,
        ExerciseCategory::Deadlift,
        ExerciseCategory::Overheadpress,
        ExerciseCategory::Back,
        ExerciseCategory::Chest,
        ExerciseCategory::Shoulder,
        ExerciseCategory::Biceps,
        ExerciseCategory::Triceps,
        ExerciseCategory::Legs,
        ExerciseCategory::Placeholder,
    ];

    /// Squat, Bench and Deadlift get tighter RPE caps than accessories
    pub fn is_main(&self) -> bool {
        matches!(
            self,
            ExerciseCategory::Squat | ExerciseCategory::Bench | ExerciseCategory::Deadlift
        )
    }

    pub fn is_placeholder(&self) -> bool {
        *self == ExerciseCategory::Placeholder
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExerciseCategory::Squat => "Squat",
            ExerciseCategory::Bench => "Bench",
            ExerciseCategory::Deadlift => "Deadlift",
            ExerciseCategory::Overheadpress => "Overheadpress",
            ExerciseCategory::Back => "Back",
            ExerciseCategory::Chest => "Chest",
            ExerciseCategory::Shoulder => "Shoulder",
            ExerciseCategory::Biceps => "Biceps",
            ExerciseCategory::Triceps => "Triceps",
            ExerciseCategory::Legs => "Legs",
            ExerciseCategory::Placeholder => "Placeholder",
        }
    }
}

impl fmt::Display for ExerciseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExerciseCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(ExerciseCategory::Placeholder);
        }

        ExerciseCategory::ALL
            .iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(trimmed))
            .copied()
            .ok_or_else(|| format!("Unknown exercise category: {}", s))
    }
}

/// Which week's logged weight the client shows as a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeightRecommendationBase {
    #[default]
    None,
    LastWeek,
}

/// RPE value in its dual format: one number for all sets, or one per set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RpeWire", into = "RpeWire")]
pub enum RpeValue {
    Single(Decimal),
    /// Semicolon-delimited on the wire, one entry per set
    PerSet(Vec<Decimal>),
    /// Text that is neither; kept verbatim
    Raw(String),
}

impl RpeValue {
    /// Parse client input. Blank input means "no value".
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }

        if trimmed.contains(';') {
            let parsed: Option<Vec<Decimal>> = trimmed
                .split(';')
                .map(parse_decimal)
                .collect();
            return Some(match parsed {
                Some(values) => RpeValue::PerSet(values),
                None => RpeValue::Raw(trimmed.to_string()),
            });
        }

        Some(match parse_decimal(trimmed) {
            Some(value) => RpeValue::Single(value),
            None => RpeValue::Raw(trimmed.to_string()),
        })
    }
}

impl fmt::Display for RpeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpeValue::Single(value) => write!(f, "{}", value.normalize()),
            RpeValue::PerSet(values) => {
                let joined: Vec<String> = values.iter().map(|v| v.normalize().to_string()).collect();
                f.write_str(&joined.join(";"))
            }
            RpeValue::Raw(text) => f.write_str(text),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RpeWire {
    Number(f64),
    Text(String),
}

impl TryFrom<RpeWire> for RpeValue {
    type Error = String;

    fn try_from(wire: RpeWire) -> Result<Self, Self::Error> {
        match wire {
            RpeWire::Number(n) => Decimal::from_str(&n.to_string())
                .map(RpeValue::Single)
                .map_err(|e| format!("Invalid RPE number {}: {}", n, e)),
            RpeWire::Text(text) => {
                RpeValue::parse(&text).ok_or_else(|| "Empty RPE value".to_string())
            }
        }
    }
}

impl From<RpeValue> for RpeWire {
    fn from(value: RpeValue) -> Self {
        match value {
            RpeValue::Single(n) => {
                use rust_decimal::prelude::ToPrimitive;
                match n.to_f64() {
                    Some(f) => RpeWire::Number(f),
                    None => RpeWire::Text(n.to_string()),
                }
            }
            other => RpeWire::Text(other.to_string()),
        }
    }
}

/// Parse a decimal accepting `,` as decimal separator
pub fn parse_decimal(input: &str) -> Option<Decimal> {
    let normalized = input.trim().replace(',', ".");
    if normalized.is_empty() {
        return None;
    }
    Decimal::from_str(&normalized).ok()
}

/// A single exercise slot within a training day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub category: ExerciseCategory,

    #[serde(default)]
    pub exercise_name: String,

    #[serde(default)]
    pub sets: u32,

    #[serde(default)]
    pub reps: u32,

    /// Single value or semicolon-delimited per-set list
    #[serde(default)]
    pub weight: String,

    #[serde(default, rename = "targetRPE")]
    pub target_rpe: Option<RpeValue>,

    #[serde(default, rename = "actualRPE")]
    pub actual_rpe: Option<RpeValue>,

    #[serde(default)]
    pub est_max: Option<Decimal>,

    #[serde(default)]
    pub notes: Option<String>,
}

impl Exercise {
    pub fn new(category: ExerciseCategory) -> Self {
        Self {
            category,
            exercise_name: String::new(),
            sets: 0,
            reps: 0,
            weight: String::new(),
            target_rpe: None,
            actual_rpe: None,
            est_max: None,
            notes: None,
        }
    }

    /// Copy of the structural fields with week-specific performance cleared
    pub fn structural_copy(&self) -> Self {
        Self {
            category: self.category,
            exercise_name: self.exercise_name.clone(),
            sets: self.sets,
            reps: self.reps,
            target_rpe: self.target_rpe.clone(),
            ..Exercise::new(self.category)
        }
    }

    /// Σ weight × reps over the logged sets
    ///
    /// A single weight counts for every set; a per-set list counts each entry
    /// once. Unparsable weights contribute nothing.
    pub fn tonnage(&self) -> Decimal {
        let reps = Decimal::from(self.reps);
        let weight = self.weight.trim();

        if weight.contains(';') {
            weight
                .split(';')
                .filter_map(parse_decimal)
                .map(|w| w * reps)
                .sum()
        } else {
            parse_decimal(weight)
                .map(|w| w * Decimal::from(self.sets) * reps)
                .unwrap_or(Decimal::ZERO)
        }
    }
}

/// One training day and its session-tracking attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingDay {
    /// Stable across the plan's lifetime
    pub id: String,

    #[serde(default)]
    pub exercises: Vec<Exercise>,

    #[serde(default)]
    pub recording: bool,

    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub duration_in_minutes: Option<u32>,
}

impl TrainingDay {
    pub fn new() -> Self {
        Self::with_exercises(Vec::new())
    }

    pub fn with_exercises(exercises: Vec<Exercise>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            exercises,
            recording: false,
            start_time: None,
            end_time: None,
            duration_in_minutes: None,
        }
    }

    pub fn tonnage(&self) -> Decimal {
        self.exercises.iter().map(Exercise::tonnage).sum()
    }

    /// 1-based lookup, matching field identifiers
    pub fn exercise(&self, ordinal: usize) -> Option<&Exercise> {
        ordinal.checked_sub(1).and_then(|i| self.exercises.get(i))
    }

    pub fn exercise_mut(&mut self, ordinal: usize) -> Option<&mut Exercise> {
        ordinal.checked_sub(1).and_then(move |i| self.exercises.get_mut(i))
    }

    pub fn clear_session(&mut self) {
        self.recording = false;
        self.start_time = None;
        self.end_time = None;
        self.duration_in_minutes = None;
    }
}

impl Default for TrainingDay {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrainingWeek {
    #[serde(default)]
    pub days: Vec<TrainingDay>,
}

impl TrainingWeek {
    pub fn empty(frequency: usize) -> Self {
        Self {
            days: (0..frequency).map(|_| TrainingDay::new()).collect(),
        }
    }

    /// Week with the same structure and fresh day ids
    fn structural_copy(&self) -> Self {
        Self {
            days: self
                .days
                .iter()
                .map(|day| {
                    TrainingDay::with_exercises(
                        day.exercises.iter().map(Exercise::structural_copy).collect(),
                    )
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingPlan {
    pub id: String,
    pub title: String,

    /// Training days per week
    pub training_frequency: usize,

    #[serde(default)]
    pub weight_recommendation_base: WeightRecommendationBase,

    #[serde(default)]
    pub weeks: Vec<TrainingWeek>,

    pub last_updated: DateTime<Utc>,

    #[serde(default)]
    pub cover_image: Option<String>,

    /// Statistics categories the user looked at last
    #[serde(default)]
    pub recent_categories: Vec<ExerciseCategory>,
}

impl TrainingPlan {
    pub fn new(title: impl Into<String>, training_frequency: usize, week_count: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            training_frequency,
            weight_recommendation_base: WeightRecommendationBase::None,
            weeks: (0..week_count)
                .map(|_| TrainingWeek::empty(training_frequency))
                .collect(),
            last_updated: Utc::now(),
            cover_image: None,
            recent_categories: Vec::new(),
        }
    }

    /// Clone a template into a fresh plan: new ids, no logged performance,
    /// no session state
    pub fn from_template(template: &TrainingPlan, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            training_frequency: template.training_frequency,
            weight_recommendation_base: template.weight_recommendation_base,
            weeks: template.weeks.iter().map(TrainingWeek::structural_copy).collect(),
            last_updated: Utc::now(),
            cover_image: template.cover_image.clone(),
            recent_categories: Vec::new(),
        }
    }

    /// Grow or shrink the plan, keeping existing weeks
    ///
    /// New weeks copy the structure of the last existing week.
    pub fn set_week_count(&mut self, week_count: usize) {
        if week_count <= self.weeks.len() {
            self.weeks.truncate(week_count);
            return;
        }

        while self.weeks.len() < week_count {
            let next = match self.weeks.last() {
                Some(last) => last.structural_copy(),
                None => TrainingWeek::empty(self.training_frequency),
            };
            self.weeks.push(next);
        }
    }

    pub fn day(&self, week: usize, day: usize) -> Option<&TrainingDay> {
        self.weeks.get(week).and_then(|w| w.days.get(day))
    }

    pub fn day_mut(&mut self, week: usize, day: usize) -> Option<&mut TrainingDay> {
        self.weeks.get_mut(week).and_then(|w| w.days.get_mut(day))
    }

    /// Locate a day by id, returning its (week, day) position
    pub fn find_day(&self, id: &str) -> Option<(usize, usize, &TrainingDay)> {
        self.weeks.iter().enumerate().find_map(|(w, week)| {
            week.days
                .iter()
                .enumerate()
                .find(|(_, day)| day.id == id)
                .map(|(d, day)| (w, d, day))
        })
    }

    pub fn find_day_mut(&mut self, id: &str) -> Option<(usize, usize, &mut TrainingDay)> {
        self.weeks.iter_mut().enumerate().find_map(|(w, week)| {
            week.days
                .iter_mut()
                .enumerate()
                .find(|(_, day)| day.id == id)
                .map(|(d, day)| (w, d, day))
        })
    }

    /// Previous week's logged weight for the same slot, if the plan asks for it
    pub fn recommended_weight(&self, week: usize, day: usize, ordinal: usize) -> Option<String> {
        if self.weight_recommendation_base != WeightRecommendationBase::LastWeek || week == 0 {
            return None;
        }

        let current = self.day(week, day)?.exercise(ordinal)?;
        let previous = self.day(week - 1, day)?.exercise(ordinal)?;

        if previous.exercise_name != current.exercise_name || previous.weight.trim().is_empty() {
            return None;
        }
        Some(previous.weight.clone())
    }
}

/// Per-category defaults set through category-wide field updates
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySettings {
    /// Rest between sets, as entered by the client
    pub pause_time: Option<String>,
    pub default_sets: Option<u32>,
    pub default_reps: Option<u32>,
    pub default_rpe: Option<RpeValue>,
}

/// Snapshot raised when a recorded session ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingDayFinishedNotification {
    pub id: String,
    pub training_plan_id: String,
    pub training_plan_title: String,
    pub training_day_id: String,
    pub week_index: usize,
    pub day_index: usize,
    pub training_day: TrainingDay,
    pub tonnage: Decimal,
    pub duration_in_minutes: u32,
    pub created_at: DateTime<Utc>,
}

impl TrainingDayFinishedNotification {
    pub fn new(
        training_plan_id: impl Into<String>,
        training_plan_title: impl Into<String>,
        week_index: usize,
        day_index: usize,
        training_day: TrainingDay,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            training_plan_id: training_plan_id.into(),
            training_plan_title: training_plan_title.into(),
            training_day_id: training_day.id.clone(),
            week_index,
            day_index,
            tonnage: training_day.tonnage(),
            duration_in_minutes: training_day.duration_in_minutes.unwrap_or(0),
            training_day,
            created_at,
        }
    }
}

/// Document owning plans, notifications and category defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,

    #[serde(default)]
    pub training_plans: Vec<TrainingPlan>,

    #[serde(default)]
    pub notifications: Vec<TrainingDayFinishedNotification>,

    #[serde(default)]
    pub category_settings: BTreeMap<ExerciseCategory, CategorySettings>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username: username.into(),
            training_plans: Vec::new(),
            notifications: Vec::new(),
            category_settings: BTreeMap::new(),
        }
    }

    pub fn plan(&self, plan_id: &str) -> Option<&TrainingPlan> {
        self.training_plans.iter().find(|p| p.id == plan_id)
    }

    pub fn plan_mut(&mut self, plan_id: &str) -> Option<&mut TrainingPlan> {
        self.training_plans.iter_mut().find(|p| p.id == plan_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn squat(weight: &str, sets: u32, reps: u32) -> Exercise {
        Exercise {
            exercise_name: "Low Bar Squat".to_string(),
            sets,
            reps,
            weight: weight.to_string(),
            ..Exercise::new(ExerciseCategory::Squat)
        }
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("squat".parse::<ExerciseCategory>().unwrap(), ExerciseCategory::Squat);
        assert_eq!("".parse::<ExerciseCategory>().unwrap(), ExerciseCategory::Placeholder);
        assert_eq!(
            "Placeholder".parse::<ExerciseCategory>().unwrap(),
            ExerciseCategory::Placeholder
        );
        assert!("Cardio".parse::<ExerciseCategory>().is_err());
        assert!(ExerciseCategory::Deadlift.is_main());
        assert!(!ExerciseCategory::Biceps.is_main());
    }

    #[test]
    fn test_rpe_parsing() {
        assert_eq!(RpeValue::parse("7"), Some(RpeValue::Single(dec!(7))));
        assert_eq!(RpeValue::parse("7,5"), Some(RpeValue::Single(dec!(7.5))));
        assert_eq!(
            RpeValue::parse("7;7.5;8"),
            Some(RpeValue::PerSet(vec![dec!(7), dec!(7.5), dec!(8)]))
        );
        assert_eq!(RpeValue::parse("hard"), Some(RpeValue::Raw("hard".to_string())));
        assert_eq!(RpeValue::parse("7;x"), Some(RpeValue::Raw("7;x".to_string())));
        assert_eq!(RpeValue::parse("  "), None);
    }

    #[test]
    fn test_rpe_display_normalizes() {
        assert_eq!(RpeValue::Single(dec!(9.0)).to_string(), "9");
        assert_eq!(RpeValue::Single(dec!(7.50)).to_string(), "7.5");
        assert_eq!(RpeValue::PerSet(vec![dec!(8.0), dec!(8.5)]).to_string(), "8;8.5");
    }

    #[test]
    fn test_rpe_serde_dual_format() {
        let single: RpeValue = serde_json::from_str("8.5").unwrap();
        assert_eq!(single, RpeValue::Single(dec!(8.5)));

        let list: RpeValue = serde_json::from_str("\"7;8\"").unwrap();
        assert_eq!(list, RpeValue::PerSet(vec![dec!(7), dec!(8)]));

        assert_eq!(serde_json::to_string(&RpeValue::Single(dec!(7.5))).unwrap(), "7.5");
        assert_eq!(serde_json::to_string(&list).unwrap(), "\"7;8\"");
    }

    #[test]
    fn test_exercise_tonnage() {
        assert_eq!(squat("100", 5, 5).tonnage(), dec!(2500));
        assert_eq!(squat("100;100;90", 3, 5).tonnage(), dec!(1450));
        assert_eq!(squat("82,5", 2, 3).tonnage(), dec!(495));
        assert_eq!(squat("", 5, 5).tonnage(), dec!(0));
    }

    #[test]
    fn test_day_tonnage_sums_exercises() {
        let day = TrainingDay::with_exercises(vec![squat("100", 5, 5), squat("50", 3, 10)]);
        assert_eq!(day.tonnage(), dec!(4000));
    }

    #[test]
    fn test_set_week_count_preserves_existing_weeks() {
        let mut plan = TrainingPlan::new("Strength Block", 2, 2);
        plan.weeks[1].days[0].exercises.push(squat("120", 5, 3));
        let kept_id = plan.weeks[1].days[0].id.clone();

        plan.set_week_count(4);
        assert_eq!(plan.weeks.len(), 4);
        assert_eq!(plan.weeks[1].days[0].id, kept_id);
        assert_eq!(plan.weeks[1].days[0].exercises[0].weight, "120");

        // new weeks carry structure only
        let copied = &plan.weeks[3].days[0].exercises[0];
        assert_eq!(copied.exercise_name, "Low Bar Squat");
        assert_eq!(copied.sets, 5);
        assert!(copied.weight.is_empty());
        assert_ne!(plan.weeks[3].days[0].id, kept_id);

        plan.set_week_count(1);
        assert_eq!(plan.weeks.len(), 1);
    }

    #[test]
    fn test_from_template_clears_performance() {
        let mut template = TrainingPlan::new("Template", 1, 1);
        template.weeks[0].days[0].exercises.push(squat("140", 3, 3));
        template.weeks[0].days[0].recording = true;

        let plan = TrainingPlan::from_template(&template, "My Plan");
        assert_ne!(plan.id, template.id);
        assert_ne!(plan.weeks[0].days[0].id, template.weeks[0].days[0].id);
        assert!(!plan.weeks[0].days[0].recording);
        assert!(plan.weeks[0].days[0].exercises[0].weight.is_empty());
        assert_eq!(plan.weeks[0].days[0].exercises[0].sets, 3);
    }

    #[test]
    fn test_recommended_weight_from_last_week() {
        let mut plan = TrainingPlan::new("Plan", 1, 2);
        plan.weeks[0].days[0].exercises.push(squat("100", 5, 5));
        plan.weeks[1].days[0].exercises.push(squat("", 5, 5));

        assert_eq!(plan.recommended_weight(1, 0, 1), None);

        plan.weight_recommendation_base = WeightRecommendationBase::LastWeek;
        assert_eq!(plan.recommended_weight(1, 0, 1), Some("100".to_string()));
        assert_eq!(plan.recommended_weight(0, 0, 1), None);
    }

    #[test]
    fn test_find_day_by_id() {
        let plan = TrainingPlan::new("Plan", 3, 2);
        let id = plan.weeks[1].days[2].id.clone();
        let (week, day, found) = plan.find_day(&id).unwrap();
        assert_eq!((week, day), (1, 2));
        assert_eq!(found.id, id);
    }
}
