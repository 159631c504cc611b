//! Shared utilities.

pub mod logging;
pub mod stats;
pub mod testing;
pub mod threading;

pub use logging::init_tracing;
pub use stats::{StatCategory, StatDetail, Stats};
pub use testing::{deadline_scale_factor, keep_tmpdirs, scaled_deadline};
pub use threading::ThreadRole;
