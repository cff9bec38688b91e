mod common;

use std::sync::Arc;
use std::time::Duration;

use adaptive_ensemble::event::{EngineEvent, LearningResult};
use adaptive_ensemble::learning::{
    evaluate_prediction, AdaptiveLearningController, LearningSettings,
};
use adaptive_ensemble::model::{Direction, Outcome};
use adaptive_ensemble::registry::{ModelState, ModelWeightRegistry};
use adaptive_ensemble::runtime::EventBus;
use common::{batch, prediction, MemoryStore, ScriptedRuntime, UpdateBehavior};

struct Harness {
    controller: AdaptiveLearningController<ScriptedRuntime, MemoryStore>,
    runtime: Arc<ScriptedRuntime>,
    store: Arc<MemoryStore>,
    registry: Arc<ModelWeightRegistry>,
    bus: Arc<EventBus>,
}

fn harness(threshold: f64) -> Harness {
    let runtime = Arc::new(ScriptedRuntime::default());
    let store = Arc::new(MemoryStore::default());
    let registry = Arc::new(ModelWeightRegistry::new(50));
    let bus = Arc::new(EventBus::new());
    let controller = AdaptiveLearningController::new(
        LearningSettings {
            threshold,
            window: 50,
            weight_floor: 0.1,
        },
        runtime.clone(),
        store.clone(),
        registry.clone(),
        bus.clone(),
    );
    Harness {
        controller,
        runtime,
        store,
        registry,
        bus,
    }
}

fn outcome(direction: Direction) -> Outcome {
    Outcome::new(direction, direction.as_f64() * 2.5, 2_000)
}

#[test]
/// Neutral is its own class: it only matches a neutral outcome, and a
/// directional call never matches a neutral outcome.
fn neutral_direction_is_its_own_class() {
    let long = prediction("ES_LSTM", Direction::Long);
    let flat = prediction("ES_LSTM", Direction::Neutral);
    assert!(evaluate_prediction(&long, &outcome(Direction::Long)));
    assert!(!evaluate_prediction(&long, &outcome(Direction::Neutral)));
    assert!(!evaluate_prediction(&flat, &outcome(Direction::Long)));
    assert!(evaluate_prediction(&flat, &outcome(Direction::Neutral)));
}

#[tokio::test]
/// Outcomes that keep accuracy at or above threshold never start learning,
/// but are still persisted and scored.
async fn accurate_model_is_left_alone() {
    let h = harness(0.6);
    let p = prediction("ES_LSTM", Direction::Long);
    for _ in 0..5 {
        let report = h.controller.record_outcome(&p, &outcome(Direction::Long)).await;
        assert!(report.correct);
        assert!(report.learning.is_none());
    }
    h.controller.flush_pending_writes().await;
    assert_eq!(h.store.recorded(), 5);
    assert_eq!(h.controller.calculate_current_performance("ES_LSTM"), 1.0);
    assert!(h.runtime.updates().is_empty());
    assert_eq!(h.controller.model_state("ES_LSTM"), ModelState::Nominal);
}

#[tokio::test]
/// ES_LSTM at threshold 0.7: three hits then two misses drop accuracy to
/// 0.6 on the fifth outcome, which retrains the model from the store's batch
/// and recomputes weights.
async fn falling_below_threshold_retrains_model() {
    let h = harness(0.7);
    h.store.set_batch("ES_LSTM", batch(30));
    let p = prediction("ES_LSTM", Direction::Long);

    for dir in [Direction::Long, Direction::Long, Direction::Long, Direction::Short] {
        let report = h.controller.record_outcome(&p, &outcome(dir)).await;
        assert!(report.learning.is_none());
    }
    let report = h.controller.record_outcome(&p, &outcome(Direction::Short)).await;
    assert!(!report.correct);
    assert!((report.performance - 0.6).abs() < 1e-12);
    assert_eq!(report.learning, Some(LearningResult::Updated));

    assert_eq!(h.runtime.updates(), vec![("ES_LSTM".to_string(), 30)]);
    assert_eq!(h.controller.model_state("ES_LSTM"), ModelState::Nominal);
    let weights = h.controller.get_model_weights();
    assert!((weights["ES_LSTM"] - 1.0).abs() < 1e-9);
}

#[tokio::test]
/// With no new training data the runtime is not called; the outcome-driven
/// cycle still ends with the model back at NOMINAL.
async fn empty_batch_skips_runtime() {
    let h = harness(0.6);
    let p = prediction("ES_XGBOOST", Direction::Short);
    let report = h.controller.record_outcome(&p, &outcome(Direction::Long)).await;
    assert_eq!(report.learning, Some(LearningResult::SkippedNoData));
    assert!(h.runtime.updates().is_empty());
    assert_eq!(h.controller.model_state("ES_XGBOOST"), ModelState::Nominal);
}

#[tokio::test]
/// A failing update is contained: the model returns to NOMINAL, and the next
/// sweep retries and succeeds once the runtime recovers.
async fn failed_update_is_retried_by_sweep() {
    let h = harness(0.6);
    h.store.set_batch("ES_LSTM", batch(12));
    h.runtime.set_update("ES_LSTM", UpdateBehavior::Fail);
    let p = prediction("ES_LSTM", Direction::Long);

    let report = h.controller.record_outcome(&p, &outcome(Direction::Short)).await;
    assert_eq!(report.learning, Some(LearningResult::Failed));
    assert_eq!(h.controller.model_state("ES_LSTM"), ModelState::Nominal);

    h.runtime.set_update("ES_LSTM", UpdateBehavior::Accept);
    let sweep = h.controller.perform_online_learning().await;
    assert_eq!(sweep.results["ES_LSTM"], LearningResult::Updated);
    assert_eq!(sweep.updated(), 1);
    assert_eq!(h.controller.model_state("ES_LSTM"), ModelState::Nominal);
}

#[tokio::test]
/// A declined update is reported as rejected; the model is NOMINAL again.
async fn declined_update_is_rejected() {
    let h = harness(0.6);
    h.store.set_batch("ES_TRANSFORMER", batch(5));
    h.runtime.set_update("ES_TRANSFORMER", UpdateBehavior::Decline);
    let p = prediction("ES_TRANSFORMER", Direction::Long);
    let report = h.controller.record_outcome(&p, &outcome(Direction::Short)).await;
    assert_eq!(report.learning, Some(LearningResult::Rejected));
    assert_eq!(h.controller.model_state("ES_TRANSFORMER"), ModelState::Nominal);
}

#[tokio::test]
/// The sweep only touches models below threshold, isolates failures per
/// model and recomputes weights over every tracked model.
async fn sweep_isolates_models() {
    let h = harness(0.6);
    h.controller.set_model_performance("ES_LSTM", 0.9);
    h.controller.set_model_performance("ES_TRANSFORMER", 0.3);
    h.controller.set_model_performance("ES_RANDOM_FOREST", 0.2);
    h.controller.set_model_performance("ES_XGBOOST", 0.1);
    h.store.set_batch("ES_TRANSFORMER", batch(8));
    h.store.set_batch("ES_RANDOM_FOREST", batch(8));
    h.runtime.set_update("ES_RANDOM_FOREST", UpdateBehavior::Fail);

    let report = h.controller.perform_online_learning().await;
    assert!(!report.results.contains_key("ES_LSTM"));
    assert_eq!(report.results["ES_TRANSFORMER"], LearningResult::Updated);
    assert_eq!(report.results["ES_RANDOM_FOREST"], LearningResult::Failed);
    assert_eq!(report.results["ES_XGBOOST"], LearningResult::SkippedNoData);

    let weights = h.controller.get_model_weights();
    assert_eq!(weights.len(), 4);
    let total: f64 = weights.values().sum();
    assert!((total - 1.0).abs() < 1e-5);
    assert!(weights.values().all(|w| *w >= 0.1 - 1e-9));
    assert!(weights["ES_LSTM"] > weights["ES_XGBOOST"]);
}

#[tokio::test]
/// A sweep that cannot retrain a model leaves its state as it was before the
/// sweep started.
async fn sweep_failure_keeps_prior_state() {
    let h = harness(0.6);
    h.controller.set_model_performance("ES_LSTM", 0.2);
    h.controller.set_model_performance("ES_XGBOOST", 0.2);
    h.registry.set_state("ES_XGBOOST", ModelState::Underperforming);
    for id in ["ES_LSTM", "ES_XGBOOST"] {
        h.store.set_batch(id, batch(4));
        h.runtime.set_update(id, UpdateBehavior::Fail);
    }

    let report = h.controller.perform_online_learning().await;
    assert_eq!(report.results["ES_LSTM"], LearningResult::Failed);
    assert_eq!(report.results["ES_XGBOOST"], LearningResult::Failed);
    assert_eq!(h.controller.model_state("ES_LSTM"), ModelState::Nominal);
    assert_eq!(
        h.controller.model_state("ES_XGBOOST"),
        ModelState::Underperforming
    );
}

#[tokio::test]
/// With nothing tracked a sweep is a no-op and leaves weights empty.
async fn sweep_with_no_models_is_noop() {
    let h = harness(0.6);
    let report = h.controller.perform_online_learning().await;
    assert!(report.results.is_empty());
    assert!(h.controller.get_model_weights().is_empty());
}

#[tokio::test]
/// A cycle already in flight for a model is not started twice.
async fn in_flight_retraining_is_skipped() {
    let h = harness(0.6);
    h.controller.set_model_performance("ES_LSTM", 0.1);
    h.store.set_batch("ES_LSTM", batch(8));
    assert!(h.registry.try_begin_retraining("ES_LSTM").is_some());

    let report = h.controller.perform_online_learning().await;
    assert_eq!(report.results["ES_LSTM"], LearningResult::SkippedInFlight);
    assert!(h.runtime.updates().is_empty());
    assert_eq!(h.registry.state("ES_LSTM"), ModelState::Retraining);
}

#[tokio::test]
/// Persisting an outcome can fail without blocking scoring.
async fn store_failure_does_not_block_scoring() {
    let h = harness(0.6);
    h.store.set_fail_record(true);
    let p = prediction("ES_LSTM", Direction::Long);
    let report = h.controller.record_outcome(&p, &outcome(Direction::Long)).await;
    assert!(report.correct);
    h.controller.flush_pending_writes().await;
    assert_eq!(h.store.recorded(), 0);
    assert_eq!(h.registry.window_len("ES_LSTM"), 1);
}

#[tokio::test]
/// Subscribers see outcome, learning and weight events in order.
async fn events_follow_learning_cycle() {
    let h = harness(0.6);
    let mut rx = h.bus.subscribe(16);
    h.store.set_batch("ES_LSTM", batch(3));
    let p = prediction("ES_LSTM", Direction::Long);
    h.controller.record_outcome(&p, &outcome(Direction::Short)).await;

    match rx.try_recv().unwrap() {
        EngineEvent::OutcomeProcessed {
            model_id,
            correct,
            window_len,
            ..
        } => {
            assert_eq!(model_id, "ES_LSTM");
            assert!(!correct);
            assert_eq!(window_len, 1);
        }
        other => panic!("unexpected event {:?}", other.kind()),
    }
    match rx.try_recv().unwrap() {
        EngineEvent::LearningComplete { result, samples, .. } => {
            assert_eq!(result, LearningResult::Updated);
            assert_eq!(samples, 3);
        }
        other => panic!("unexpected event {:?}", other.kind()),
    }
    assert_eq!(rx.try_recv().unwrap().kind(), "weights_updated");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
/// Reset forgets accuracy and weights.
async fn reset_forgets_learning_state() {
    let h = harness(0.6);
    let p = prediction("ES_LSTM", Direction::Long);
    h.controller.record_outcome(&p, &outcome(Direction::Short)).await;
    assert!(!h.controller.get_model_weights().is_empty());

    h.controller.reset();
    assert!(h.controller.get_model_weights().is_empty());
    assert_eq!(h.controller.calculate_current_performance("ES_LSTM"), 0.5);
}

#[tokio::test(start_paused = true)]
/// A reset that lands while a model is retraining stays total: the finishing
/// cycle writes nothing back.
async fn reset_during_retraining_is_total() {
    let h = harness(0.6);
    h.store.set_batch("ES_LSTM", batch(4));
    h.runtime.set_update_delay(Duration::from_secs(1));
    let p = prediction("ES_LSTM", Direction::Long);
    let o = outcome(Direction::Short);

    let (report, _) = tokio::join!(
        h.controller.record_outcome(&p, &o),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            h.controller.reset();
        }
    );
    assert_eq!(report.learning, Some(LearningResult::Updated));
    assert!(h.registry.is_empty());
    assert!(h.controller.get_model_weights().is_empty());
    assert!(h.registry.try_begin_retraining("ES_LSTM").is_some());
}

#[tokio::test(start_paused = true)]
/// Outcome writes run in the background: a slow store does not hold up
/// scoring, and flushing waits for the write.
async fn slow_store_does_not_delay_scoring() {
    let h = harness(0.6);
    h.store.set_record_delay(Duration::from_secs(5));
    let p = prediction("ES_LSTM", Direction::Long);

    let started = tokio::time::Instant::now();
    let report = h.controller.record_outcome(&p, &outcome(Direction::Long)).await;
    assert!(report.correct);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(h.registry.window_len("ES_LSTM"), 1);
    assert_eq!(h.store.recorded(), 0);

    h.controller.flush_pending_writes().await;
    assert_eq!(h.store.recorded(), 1);
}
