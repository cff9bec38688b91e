pub mod controller;

pub use controller::{
    evaluate_prediction, AdaptiveLearningController, LearningSettings, OutcomeReport, SweepReport,
};
