pub mod event_bus;
pub mod sweep;

pub use event_bus::EventBus;
pub use sweep::spawn_learning_sweep;
