mod error;
mod sweep;

pub mod prelude {
    pub use crate::error::InvalidSweepError;
    pub use crate::sweep::{SweepPlan, SweepPoint, DEFAULT_TIMEOUT_MS};
}
