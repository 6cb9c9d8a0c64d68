//! Error taxonomy for the harness.
//!
//! Contract violations fail fast at construction, unavailable resources are
//! surfaced to the caller, and reductions over too little data are refused.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for harness operations
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Ring buffer constructed with zero capacity
    #[error("Ring capacity must be at least 1")]
    InvalidCapacity,

    /// Selector is not a usable key/value pair
    #[error("Invalid stream selector: {0}")]
    InvalidSelector(String),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Chunk whose sample matrix does not match its timestamps
    #[error("Malformed chunk: {samples} samples for {timestamps} timestamps x {channels} channels")]
    MalformedChunk {
        samples: usize,
        timestamps: usize,
        channels: usize,
    },

    /// `start()` called on a worker that has not been stopped
    #[error("Acquisition worker is already running")]
    AlreadyRunning,

    /// No stream resolved for the selector
    #[error("No stream matching {key}=={value}")]
    StreamNotFound { key: String, value: String },

    /// Failure reported by the stream source collaborator
    #[error("Stream error: {0}")]
    Stream(String),

    /// OS introspection for resource sampling could not be obtained
    #[error("Resource monitoring unavailable: {0}")]
    MonitoringUnavailable(String),

    /// Too few samples to compute a summary
    #[error("Not enough samples: {found} (need at least {required})")]
    InsufficientSamples { found: usize, required: usize },

    /// Settings file named explicitly but missing
    #[error("Settings file '{}' does not exist", .0.display())]
    SettingsNotFound(PathBuf),

    /// Settings file with an extension other than .toml or .json
    #[error("Unsupported settings file extension '{0}'. Use .toml or .json.")]
    UnsupportedSettingsFormat(String),

    /// Settings document could not be interpreted
    #[error("Failed to parse settings: {0}")]
    SettingsParse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;
