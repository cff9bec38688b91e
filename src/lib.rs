pub mod collaborators;
pub mod config;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod event;
pub mod features;
pub mod indicator;
pub mod learning;
pub mod model;
pub mod pipeline;
pub mod predictor;
pub mod registry;
pub mod runtime;
pub mod store;

pub use engine::AdaptiveEngine;
pub use error::{EngineError, EngineResult};
