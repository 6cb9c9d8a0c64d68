pub mod worker;

pub use worker::{AcquisitionWorker, ShutdownWarning, WorkerConfig, WorkerState};
