use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("feature extraction failed for {instrument}: {reason}")]
    FeatureExtraction { instrument: String, reason: String },

    #[error("model {model_id} unavailable: {reason}")]
    ModelUnavailable { model_id: String, reason: String },

    #[error("ensemble quorum not met for {instrument}: {available} of {required} models responded")]
    QuorumNotMet {
        instrument: String,
        available: usize,
        required: usize,
    },

    #[error("outcome store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Request-scoped failures leave engine state untouched and may be retried.
    pub fn is_request_scoped(&self) -> bool {
        matches!(
            self,
            Self::FeatureExtraction { .. }
                | Self::ModelUnavailable { .. }
                | Self::QuorumNotMet { .. }
        )
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
