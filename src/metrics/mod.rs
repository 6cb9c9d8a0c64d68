pub mod engine;
pub mod stats;
pub mod summary;

pub use engine::{compute_metrics, MIN_SAMPLES};
pub use summary::Summary;
