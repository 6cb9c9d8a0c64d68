pub mod acquisition;
pub mod buffer;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod report;
pub mod resources;
pub mod settings;
pub mod stream;

// Re-export the pieces most callers need
pub use acquisition::{AcquisitionWorker, WorkerConfig};
pub use buffer::{BoundedChannel, OverflowPolicy};
pub use error::{HarnessError, Result};
pub use metrics::{compute_metrics, Summary};
pub use stream::Chunk;
