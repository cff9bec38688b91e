use adaptive_ensemble::registry::{
    calculate_current_performance, ModelState, ModelWeightRegistry, PerformanceWindow,
    NO_INFORMATION_PERFORMANCE,
};

#[test]
/// An empty window reports the no-information accuracy of 0.5.
fn empty_window_is_coin_flip() {
    let window = PerformanceWindow::with_capacity(10);
    assert!(window.is_empty());
    assert_eq!(window.current_performance(), NO_INFORMATION_PERFORMANCE);
    assert_eq!(calculate_current_performance(std::iter::empty::<bool>()), 0.5);
}

#[test]
/// Accuracy is the share of correct results in the window.
fn performance_is_share_of_hits() {
    assert_eq!(calculate_current_performance([true, true, false, true]), 0.75);
    assert_eq!(calculate_current_performance([false, false]), 0.0);
}

#[test]
/// The newest result evicts the oldest once capacity is reached.
fn window_evicts_oldest_first() {
    let mut window = PerformanceWindow::with_capacity(3);
    for correct in [false, false, true, true] {
        window.push(correct);
    }
    assert_eq!(window.len(), 3);
    assert_eq!(window.results().collect::<Vec<_>>(), vec![false, true, true]);
    assert!((window.current_performance() - 2.0 / 3.0).abs() < 1e-12);
}

#[test]
/// Recording results updates accuracy per model and never exceeds the
/// configured window.
fn record_result_tracks_rolling_accuracy() {
    let registry = ModelWeightRegistry::new(4);
    for correct in [true, true, false, false, false, false] {
        registry.record_result("ES_LSTM", correct);
    }
    assert_eq!(registry.window_len("ES_LSTM"), 4);
    assert_eq!(registry.performance("ES_LSTM"), 0.0);
    assert_eq!(registry.performance("ES_XGBOOST"), 0.5);
    assert_eq!(registry.tracked_models(), vec!["ES_LSTM".to_string()]);
}

#[test]
/// Weights follow accuracy, respect the floor and sum to one.
fn recompute_weights_applies_floor() {
    let registry = ModelWeightRegistry::default();
    registry.set_performance("ES_LSTM", 0.9);
    registry.set_performance("ES_TRANSFORMER", 0.6);
    registry.set_performance("ES_RANDOM_FOREST", 0.02);
    registry.set_performance("ES_XGBOOST", 0.0);

    let weights = registry.recompute_weights(0.1);
    let total: f64 = weights.values().sum();
    assert!((total - 1.0).abs() < 1e-5);
    assert!(weights.values().all(|w| *w >= 0.1 - 1e-9));
    assert!(weights["ES_LSTM"] > weights["ES_TRANSFORMER"]);
    assert!((weights["ES_XGBOOST"] - 0.1).abs() < 1e-9);
    assert_eq!(registry.weights_snapshot(), weights);
}

#[test]
/// Every instrument is its own blend: with three instruments of four roles
/// each, weights sum to one and respect the floor within each instrument.
fn recompute_weights_groups_by_instrument() {
    let registry = ModelWeightRegistry::default();
    for instrument in ["ES", "NQ", "CL"] {
        registry.set_performance(&format!("{}_LSTM", instrument), 0.9);
        registry.set_performance(&format!("{}_TRANSFORMER", instrument), 0.6);
        registry.set_performance(&format!("{}_RANDOM_FOREST", instrument), 0.5);
        registry.set_performance(&format!("{}_XGBOOST", instrument), 0.1);
    }

    let weights = registry.recompute_weights(0.1);
    assert_eq!(weights.len(), 12);
    for instrument in ["ES", "NQ", "CL"] {
        let group = registry.instrument_weights(instrument);
        let total: f64 = group.values().sum();
        assert!((total - 1.0).abs() < 1e-9, "{}", instrument);
        assert!(group.values().all(|w| *w >= 0.1 - 1e-9));
        assert!(
            group[&format!("{}_LSTM", instrument)] > group[&format!("{}_XGBOOST", instrument)]
        );
    }
    let ids: Vec<String> = ["ES_LSTM", "ES_TRANSFORMER", "ES_RANDOM_FOREST", "ES_XGBOOST"]
        .iter()
        .map(|id| id.to_string())
        .collect();
    let es = registry.weights_for(&ids).unwrap();
    assert!((es.values().sum::<f64>() - 1.0).abs() < 1e-9);
}

#[test]
/// Registry weights are only used when every responding model has one.
fn weights_for_requires_every_model() {
    let registry = ModelWeightRegistry::default();
    registry.set_performance("ES_LSTM", 0.8);
    registry.recompute_weights(0.1);
    let ids = vec!["ES_LSTM".to_string()];
    assert!(registry.weights_for(&ids).is_some());
    let ids = vec!["ES_LSTM".to_string(), "ES_XGBOOST".to_string()];
    assert!(registry.weights_for(&ids).is_none());
}

#[test]
/// Only one retraining cycle per model can be in flight; the state it left
/// is handed back to the caller.
fn retraining_is_exclusive_per_model() {
    let registry = ModelWeightRegistry::default();
    registry.set_state("ES_LSTM", ModelState::Underperforming);

    assert_eq!(
        registry.try_begin_retraining("ES_LSTM"),
        Some(ModelState::Underperforming)
    );
    assert_eq!(registry.try_begin_retraining("ES_LSTM"), None);
    assert_eq!(
        registry.try_begin_retraining("ES_XGBOOST"),
        Some(ModelState::Nominal)
    );
    assert_eq!(registry.state("ES_LSTM"), ModelState::Retraining);
}

#[test]
/// A cycle that began before a reset cannot write its state back.
fn finish_after_reset_is_dropped() {
    let registry = ModelWeightRegistry::default();
    let (_, generation) = registry.begin_retraining("ES_LSTM").unwrap();
    registry.reset();
    assert!(!registry.finish_retraining("ES_LSTM", generation, ModelState::Nominal));
    assert!(registry.is_empty());

    let (_, generation) = registry.begin_retraining("ES_LSTM").unwrap();
    assert!(registry.finish_retraining("ES_LSTM", generation, ModelState::Nominal));
    assert_eq!(registry.state("ES_LSTM"), ModelState::Nominal);
}

#[test]
/// Reset clears windows, accuracy, weights and state together.
fn reset_clears_everything() {
    let registry = ModelWeightRegistry::default();
    registry.record_result("ES_LSTM", true);
    registry.recompute_weights(0.1);
    registry.set_state("ES_LSTM", ModelState::Underperforming);
    assert!(!registry.is_empty());

    registry.reset();
    assert!(registry.is_empty());
    assert!(registry.weights_snapshot().is_empty());
    assert_eq!(registry.state("ES_LSTM"), ModelState::Nominal);
    assert_eq!(registry.performance("ES_LSTM"), 0.5);
}
