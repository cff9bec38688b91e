pub mod feature;
pub mod outcome;
pub mod prediction;
pub mod signal;
pub mod tick;

pub use feature::FeatureVector;
pub use outcome::{Outcome, TrainingBatch};
pub use prediction::{ModelOutput, Prediction, PredictionMetadata, ENSEMBLE_SOURCE_ID};
pub use signal::{Direction, Recommendation};
pub use tick::MarketData;
