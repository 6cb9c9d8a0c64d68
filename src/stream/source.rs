use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::clock;
use crate::error::{HarnessError, Result};

/// Property/value pair used to find a stream (e.g. `type=EEG`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub key: String,
    pub value: String,
}

impl Selector {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(HarnessError::InvalidSelector("empty key".to_string()));
        }
        Ok(Self {
            key,
            value: value.into(),
        })
    }

    /// Parse `key=value`.
    pub fn parse(text: &str) -> Result<Self> {
        match text.split_once('=') {
            Some((key, value)) => Self::new(key.trim(), value.trim()),
            None => Err(HarnessError::InvalidSelector(format!(
                "expected key=value, got '{}'",
                text
            ))),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={}", self.key, self.value)
    }
}

/// Stream endpoint returned by resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub name: String,
    pub stream_type: String,
    pub source_id: String,
    pub channel_count: usize,
    pub nominal_srate: f64,
}

impl StreamInfo {
    /// Whether this endpoint carries the property the selector asks for.
    pub fn matches(&self, selector: &Selector) -> bool {
        match selector.key.as_str() {
            "name" => self.name == selector.value,
            "type" => self.stream_type == selector.value,
            "source_id" => self.source_id == selector.value,
            _ => false,
        }
    }
}

/// Result of a single pull. Zero timestamps means the pull timed out empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PulledChunk {
    pub samples: Vec<f32>, // row-major
    pub channel_count: usize,
    pub timestamps: Vec<f64>,
}

impl PulledChunk {
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Open handle on a stream.
///
/// Methods take `&self` so the owner can close the handle while the
/// acquisition thread is blocked in `pull_chunk`.
pub trait StreamInlet: Send + Sync {
    /// Pull at most `max_samples`, blocking no longer than `timeout`.
    fn pull_chunk(&self, max_samples: usize, timeout: Duration) -> Result<PulledChunk>;

    fn close(&self) -> Result<()>;

    /// Local clock read in the same domain as the source timestamps.
    fn local_clock(&self) -> f64 {
        clock::local_clock()
    }
}

/// Discovery and connection for one kind of stream.
pub trait StreamSource: Send + Sync {
    /// Candidate endpoints matching `selector`, waiting at most `timeout`.
    fn resolve(&self, selector: &Selector, timeout: Duration) -> Result<Vec<StreamInfo>>;

    fn open(&self, info: &StreamInfo) -> Result<Arc<dyn StreamInlet>>;
}
