pub mod combiner;
pub mod roles;

pub use combiner::{combine, CombinedSignal, NEUTRAL_MIDPOINT};
pub use roles::{ModelRole, RolePriors, UNKNOWN_ROLE_PRIOR};
