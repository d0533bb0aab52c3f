use chrono::{DateTime, TimeZone, Utc};
use liftrs::clock::TokioClock;
use liftrs::field_update::FieldUpdate;
use liftrs::models::{Exercise, ExerciseCategory, TrainingDay};
use liftrs::session::{session_duration_minutes, FinishedSession, SessionContext, SessionRegistry};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Timing behaviour of live session detection

#[cfg(test)]
mod session_tracking_tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(15 * 60);

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 2, 6, 30, 0).unwrap()
    }

    fn paused_runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap()
    }

    fn context(day_index: usize) -> SessionContext {
        SessionContext {
            user_id: "athlete".to_string(),
            plan_id: "plan".to_string(),
            plan_title: "Peaking".to_string(),
            week_index: 0,
            day_index,
        }
    }

    fn training_day() -> TrainingDay {
        TrainingDay::with_exercises(vec![Exercise {
            exercise_name: "Competition Bench".to_string(),
            sets: 3,
            reps: 2,
            weight: "140".to_string(),
            ..Exercise::new(ExerciseCategory::Bench)
        }])
    }

    fn weight_signal(day_index: usize) -> Vec<FieldUpdate> {
        let field = format!("day{}_exercise1_weight", day_index + 1);
        vec![FieldUpdate::decode(0, &field, "140").unwrap()]
    }

    fn registry() -> (Arc<SessionRegistry>, mpsc::UnboundedReceiver<FinishedSession>) {
        SessionRegistry::new(WINDOW, Arc::new(TokioClock::anchored_at(anchor())))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_gaps_within_window_make_one_session(
            gaps in prop::collection::vec(0u64..(15 * 60), 0..8)
        ) {
            let rt = paused_runtime();
            rt.block_on(async {
                let (registry, mut finished_rx) = registry();
                let day = training_day();
                let signal = weight_signal(0);

                registry.route_activity(&context(0), &day, &signal);
                for gap in &gaps {
                    tokio::time::sleep(Duration::from_secs(*gap)).await;
                    let outcome = registry.route_activity(&context(0), &day, &signal);
                    assert!(!outcome.started);
                }

                let finished = finished_rx.recv().await.unwrap();
                let active: u64 = gaps.iter().sum();
                let expected_end = anchor() + chrono::Duration::seconds((active + WINDOW.as_secs()) as i64);

                assert_eq!(finished.training_day.start_time, Some(anchor()));
                assert_eq!(finished.training_day.end_time, Some(expected_end));
                assert_eq!(
                    finished.training_day.duration_in_minutes,
                    Some(session_duration_minutes(anchor(), expected_end, WINDOW))
                );

                tokio::time::sleep(WINDOW * 4).await;
                assert!(finished_rx.try_recv().is_err());
            });
        }

        #[test]
        fn test_duration_is_multiple_of_five(active_secs in 0i64..(6 * 3600)) {
            let end = anchor() + chrono::Duration::seconds(active_secs + WINDOW.as_secs() as i64);
            let minutes = session_duration_minutes(anchor(), end, WINDOW);
            prop_assert_eq!(minutes % 5, 0);
            prop_assert!((minutes as i64 * 60 - active_secs).abs() <= 150);
        }
    }

    #[test]
    fn test_gap_longer_than_window_splits_sessions() {
        paused_runtime().block_on(async {
            let (registry, mut finished_rx) = registry();
            let day = training_day();
            let signal = weight_signal(0);

            assert!(registry.route_activity(&context(0), &day, &signal).started);
            tokio::time::sleep(WINDOW + Duration::from_secs(60)).await;

            let first = finished_rx.recv().await.unwrap();
            assert_eq!(first.training_day.end_time, Some(anchor() + chrono::Duration::minutes(15)));

            // the finished tracker is replaced by a fresh one
            let outcome = registry.route_activity(&context(0), &day, &signal);
            assert!(outcome.started);
            assert_eq!(
                outcome.status.unwrap().start_time,
                Some(anchor() + chrono::Duration::minutes(16))
            );

            let second = finished_rx.recv().await.unwrap();
            assert_ne!(first.tracker_serial, second.tracker_serial);
        });
    }

    #[test]
    fn test_days_are_tracked_independently() {
        paused_runtime().block_on(async {
            let (registry, mut finished_rx) = registry();
            let monday = training_day();
            let thursday = training_day();

            registry.route_activity(&context(0), &monday, &weight_signal(0));
            tokio::time::sleep(Duration::from_secs(10 * 60)).await;
            registry.route_activity(&context(1), &thursday, &weight_signal(1));
            assert_eq!(registry.active_count(), 2);

            let first = finished_rx.recv().await.unwrap();
            let second = finished_rx.recv().await.unwrap();
            assert_eq!(first.training_day.id, monday.id);
            assert_eq!(second.training_day.id, thursday.id);
            assert_eq!(second.context.day_index, 1);
        });
    }

    #[test]
    fn test_several_signals_in_one_payload_start_once() {
        paused_runtime().block_on(async {
            let (registry, mut finished_rx) = registry();
            let day = training_day();
            let updates = vec![
                FieldUpdate::decode(0, "day1_exercise1_weight", "140").unwrap(),
                FieldUpdate::decode(0, "day1_exercise1_actualRPE", "8;8.5;9").unwrap(),
                FieldUpdate::decode(0, "day1_exercise1_notes", "felt fast").unwrap(),
            ];

            let outcome = registry.route_activity(&context(0), &day, &updates);
            assert_eq!(outcome.signals, 2);
            assert!(outcome.started);

            finished_rx.recv().await.unwrap();
            tokio::time::sleep(WINDOW * 2).await;
            assert!(finished_rx.try_recv().is_err());
        });
    }

    #[test]
    fn test_evicted_tracker_never_finishes() {
        paused_runtime().block_on(async {
            let (registry, mut finished_rx) = registry();
            let day = training_day();

            registry.route_activity(&context(0), &day, &weight_signal(0));
            tokio::time::sleep(Duration::from_secs(60)).await;
            assert!(registry.remove_tracker(&day.id));

            tokio::time::sleep(WINDOW * 2).await;
            assert!(finished_rx.try_recv().is_err());
            assert_eq!(registry.active_count(), 0);
        });
    }
}
