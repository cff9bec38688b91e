pub mod ema;
pub mod sma;
pub mod stdev;

pub use ema::Ema;
pub use sma::Sma;
pub use stdev::RollingStd;
