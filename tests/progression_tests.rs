use liftrs::models::{Exercise, ExerciseCategory, RpeValue, TrainingDay, TrainingPlan};
use liftrs::progression::{apply_progression, progress_rpe, ProgressionLimits, ProgressionOptions};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Progression over complete plans

#[cfg(test)]
mod progression_tests {
    use super::*;

    const PLAN_JSON: &str = r#"{
        "id": "plan-1",
        "title": "Powerbuilding",
        "trainingFrequency": 2,
        "weightRecommendationBase": "LAST_WEEK",
        "lastUpdated": "2024-01-08T10:00:00Z",
        "weeks": [
            { "days": [
                { "id": "w1d1", "exercises": [
                    { "category": "Squat", "exerciseName": "Squat", "sets": 4, "reps": 5, "weight": "140", "targetRPE": 7 },
                    { "category": "Legs", "exerciseName": "Leg Press", "sets": 3, "reps": 10, "targetRPE": "8;8.5;9" }
                ]},
                { "id": "w1d2", "exercises": [
                    { "category": "Bench", "exerciseName": "Bench", "sets": 5, "reps": 3, "targetRPE": 8.5 },
                    { "category": "Triceps", "exerciseName": "Dips", "sets": 3, "reps": 12, "targetRPE": "RIR 2" }
                ]}
            ]},
            { "days": [
                { "id": "w2d1", "exercises": [
                    { "category": "Squat", "exerciseName": "Squat", "sets": 4, "reps": 5 },
                    { "category": "Legs", "exerciseName": "Leg Press", "sets": 3, "reps": 10 }
                ]},
                { "id": "w2d2", "exercises": [
                    { "category": "Bench", "exerciseName": "Close Grip Bench", "sets": 5, "reps": 3 },
                    { "category": "Triceps", "exerciseName": "Dips", "sets": 3, "reps": 12 }
                ]}
            ]},
            { "days": [
                { "id": "w3d1", "exercises": [
                    { "category": "Squat", "exerciseName": "Squat", "sets": 4, "reps": 5 },
                    { "category": "Legs", "exerciseName": "Leg Press", "sets": 3, "reps": 10 }
                ]},
                { "id": "w3d2", "exercises": [
                    { "category": "Bench", "exerciseName": "Close Grip Bench", "sets": 5, "reps": 3 }
                ]}
            ]}
        ]
    }"#;

    fn load_plan() -> TrainingPlan {
        serde_json::from_str(PLAN_JSON).unwrap()
    }

    fn target(plan: &TrainingPlan, week: usize, day: usize, slot: usize) -> Option<String> {
        plan.weeks[week].days[day].exercises[slot]
            .target_rpe
            .as_ref()
            .map(ToString::to_string)
    }

    #[test]
    fn test_progression_over_stored_plan() {
        let mut plan = load_plan();
        let report = apply_progression(&mut plan, &ProgressionOptions::default(), &ProgressionLimits::default()).unwrap();

        assert_eq!(target(&plan, 1, 0, 0).as_deref(), Some("7.5"));
        assert_eq!(target(&plan, 2, 0, 0).as_deref(), Some("8"));
        assert_eq!(target(&plan, 1, 0, 1).as_deref(), Some("8.5;9;9.5"));
        assert_eq!(target(&plan, 2, 0, 1).as_deref(), Some("9;9.5;10"));

        // a different lift in the slot breaks the chain
        assert_eq!(target(&plan, 1, 1, 0), None);
        assert_eq!(target(&plan, 2, 1, 0), None);

        // free-text target is kept and not progressed
        assert_eq!(target(&plan, 0, 1, 1).as_deref(), Some("RIR 2"));
        assert_eq!(target(&plan, 1, 1, 1), None);

        assert_eq!(report.adjusted, 4);
        assert_eq!(report.skipped_mismatch, 1);
        assert_eq!(report.skipped_unparsable, 1);
        assert_eq!(report.skipped_empty, 1);
    }

    #[test]
    fn test_deload_over_stored_plan() {
        let mut plan = load_plan();
        let options = ProgressionOptions {
            rpe_increase: dec!(1),
            deload_last_week: true,
        };
        let report = apply_progression(&mut plan, &options, &ProgressionLimits::default()).unwrap();

        assert_eq!(target(&plan, 1, 0, 0).as_deref(), Some("8"));
        let squat = &plan.weeks[2].days[0].exercises[0];
        assert_eq!(squat.sets, 3);
        assert_eq!(squat.reps, 5);
        assert_eq!(target(&plan, 2, 0, 0).as_deref(), Some("6"));
        assert_eq!(target(&plan, 2, 0, 1).as_deref(), Some("7"));
        // deload applies even when the previous week had no target
        assert_eq!(plan.weeks[2].days[1].exercises[0].sets, 4);
        assert_eq!(target(&plan, 2, 1, 0).as_deref(), Some("6"));
        assert_eq!(report.deloaded, 3);
    }

    #[test]
    fn test_progressed_plan_serializes_dual_format() {
        let mut plan = load_plan();
        apply_progression(&mut plan, &ProgressionOptions::default(), &ProgressionLimits::default()).unwrap();

        let json = serde_json::to_value(&plan).unwrap();
        let week2 = &json["weeks"][1]["days"][0]["exercises"];
        assert_eq!(week2[0]["targetRPE"], serde_json::json!(7.5));
        assert_eq!(week2[1]["targetRPE"], serde_json::json!("8.5;9;9.5"));
    }

    #[test]
    fn test_custom_limits() {
        let mut plan = TrainingPlan::new("Cut", 1, 3);
        for week in plan.weeks.iter_mut() {
            week.days[0] = TrainingDay::with_exercises(vec![Exercise {
                exercise_name: "Deadlift".to_string(),
                sets: 3,
                reps: 3,
                ..Exercise::new(ExerciseCategory::Deadlift)
            }]);
        }
        plan.weeks[0].days[0].exercises[0].target_rpe = RpeValue::parse("7.5");

        let limits = ProgressionLimits {
            main_rpe_cap: dec!(8),
            ..ProgressionLimits::default()
        };
        apply_progression(&mut plan, &ProgressionOptions::default(), &limits).unwrap();
        assert_eq!(target(&plan, 2, 0, 0).as_deref(), Some("8"));
    }

    fn rpe_strategy() -> impl Strategy<Value = Decimal> {
        (10u32..=100).prop_map(|tenths| Decimal::new(tenths as i64, 1))
    }

    proptest! {
        #[test]
        fn test_progression_never_decreases_or_exceeds_cap(
            values in prop::collection::vec(rpe_strategy(), 1..6),
            increase in (0u32..=20).prop_map(|tenths| Decimal::new(tenths as i64, 1)),
            main in any::<bool>()
        ) {
            let limits = ProgressionLimits::default();
            let category = if main { ExerciseCategory::Squat } else { ExerciseCategory::Chest };
            let cap = limits.rpe_cap(category);

            let next = progress_rpe(&RpeValue::PerSet(values.clone()), increase, cap).unwrap();
            let RpeValue::PerSet(next) = next else {
                panic!("per-set input must stay per-set");
            };

            prop_assert_eq!(next.len(), values.len());
            for (before, after) in values.iter().zip(&next) {
                prop_assert!(*after <= cap);
                prop_assert!(*after >= (*before).min(cap));
            }
        }
    }
}
