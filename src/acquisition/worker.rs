use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::buffer::{BoundedChannel, OverflowPolicy};
use crate::error::{HarnessError, Result};
use crate::stream::{Chunk, Selector, StreamInlet, StreamSource};

const JOIN_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub selector: Selector,
    pub chunk_size: usize,
    pub pull_timeout: Duration,
    pub ring_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub resolve_timeout: Duration,
    pub join_timeout: Duration,
}

impl WorkerConfig {
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            chunk_size: 32,
            pull_timeout: Duration::from_millis(100),
            ring_capacity: 256,
            overflow_policy: OverflowPolicy::DropOldest,
            resolve_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Resolving,
    Running,
    Stopping,
    Stopped,
}

/// Non-fatal problem hit while stopping the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownWarning {
    CloseFailed(String),
    JoinTimedOut(Duration),
}

impl fmt::Display for ShutdownWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownWarning::CloseFailed(reason) => {
                write!(f, "Error closing stream inlet: {}", reason)
            }
            ShutdownWarning::JoinTimedOut(timeout) => write!(
                f,
                "Acquisition thread did not stop within {:.1}s",
                timeout.as_secs_f64()
            ),
        }
    }
}

/// Pulls chunks from one stream on a background thread and stamps each with
/// a local receive time before pushing it into a bounded channel.
pub struct AcquisitionWorker {
    config: WorkerConfig,
    source: Arc<dyn StreamSource>,
    channel: Arc<BoundedChannel<Chunk>>,
    inlet: Option<Arc<dyn StreamInlet>>,
    handle: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    state: WorkerState,
}

impl AcquisitionWorker {
    pub fn new(config: WorkerConfig, source: Arc<dyn StreamSource>) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(HarnessError::InvalidConfig(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        let channel = Arc::new(BoundedChannel::new(
            config.ring_capacity,
            config.overflow_policy,
        )?);
        Ok(Self {
            config,
            source,
            channel,
            inlet: None,
            handle: None,
            cancel: CancellationToken::new(),
            state: WorkerState::Idle,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Channel the current run pushes into. Every `start()` replaces it, so
    /// fetch it after starting.
    pub fn channel(&self) -> Arc<BoundedChannel<Chunk>> {
        Arc::clone(&self.channel)
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn has_inlet(&self) -> bool {
        self.inlet.is_some()
    }

    pub fn has_thread(&self) -> bool {
        self.handle.is_some()
    }

    /// Resolve the stream, open it and launch the acquisition thread.
    pub fn start(&mut self) -> Result<()> {
        if matches!(self.state, WorkerState::Running | WorkerState::Resolving) {
            return Err(HarnessError::AlreadyRunning);
        }

        let channel = Arc::new(BoundedChannel::new(
            self.config.ring_capacity,
            self.config.overflow_policy,
        )?);

        self.state = WorkerState::Resolving;
        let selector = &self.config.selector;
        info!("Resolving stream {}", selector);

        let candidates = match self.source.resolve(selector, self.config.resolve_timeout) {
            Ok(candidates) => candidates,
            Err(e) => {
                self.state = WorkerState::Stopped;
                return Err(e);
            }
        };
        let Some(info) = candidates.into_iter().next() else {
            self.state = WorkerState::Stopped;
            return Err(HarnessError::StreamNotFound {
                key: selector.key.clone(),
                value: selector.value.clone(),
            });
        };

        let inlet = match self.source.open(&info) {
            Ok(inlet) => inlet,
            Err(e) => {
                self.state = WorkerState::Stopped;
                return Err(e);
            }
        };
        info!(
            "Connected to '{}' ({} channels @ {} Hz)",
            info.name, info.channel_count, info.nominal_srate
        );

        self.channel = channel;
        self.cancel = CancellationToken::new();
        let token = self.cancel.clone();
        let thread_inlet = Arc::clone(&inlet);
        let channel = Arc::clone(&self.channel);
        let chunk_size = self.config.chunk_size;
        let timeout = self.config.pull_timeout;

        let spawned = std::thread::Builder::new()
            .name("acquisition".to_string())
            .spawn(move || acquire(thread_inlet, channel, token, chunk_size, timeout));

        match spawned {
            Ok(handle) => {
                self.inlet = Some(inlet);
                self.handle = Some(handle);
                self.state = WorkerState::Running;
                Ok(())
            }
            Err(e) => {
                if let Some(warning) = close_inlet(inlet.as_ref()) {
                    warn!("{}", warning);
                }
                self.state = WorkerState::Stopped;
                Err(HarnessError::Io(e))
            }
        }
    }

    /// Signal the thread, close the inlet and wait for the thread to exit.
    ///
    /// Never fails. Problems are logged and returned as warnings. Calling
    /// this again after a completed stop does nothing.
    pub fn stop(&mut self) -> Vec<ShutdownWarning> {
        let mut warnings = Vec::new();
        if self.state == WorkerState::Stopped && self.inlet.is_none() && self.handle.is_none() {
            return warnings;
        }

        self.state = WorkerState::Stopping;
        self.cancel.cancel();

        // Closing first unblocks a pull that would otherwise wait out its timeout.
        if let Some(inlet) = self.inlet.take() {
            warnings.extend(close_inlet(inlet.as_ref()));
        }

        if let Some(handle) = self.handle.take() {
            let deadline = Instant::now() + self.config.join_timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(JOIN_POLL);
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    error!("Acquisition thread panicked");
                }
            } else {
                // Detached. The thread exits on its own once its pull returns.
                warnings.push(ShutdownWarning::JoinTimedOut(self.config.join_timeout));
            }
        }

        for warning in &warnings {
            warn!("{}", warning);
        }
        self.state = WorkerState::Stopped;
        debug!("Acquisition stopped, {} chunk(s) dropped", self.channel.drops());
        warnings
    }
}

impl Drop for AcquisitionWorker {
    fn drop(&mut self) {
        if self.inlet.is_some() || self.handle.is_some() {
            self.stop();
        }
    }
}

fn close_inlet(inlet: &dyn StreamInlet) -> Option<ShutdownWarning> {
    inlet
        .close()
        .err()
        .map(|e| ShutdownWarning::CloseFailed(e.to_string()))
}

fn acquire(
    inlet: Arc<dyn StreamInlet>,
    channel: Arc<BoundedChannel<Chunk>>,
    token: CancellationToken,
    chunk_size: usize,
    timeout: Duration,
) {
    while !token.is_cancelled() {
        let pulled = match inlet.pull_chunk(chunk_size, timeout) {
            Ok(pulled) => pulled,
            Err(e) => {
                if !token.is_cancelled() {
                    error!("Stream pull failed, acquisition ending: {}", e);
                }
                break;
            }
        };
        if pulled.is_empty() {
            continue;
        }

        let recv = inlet.local_clock();
        match Chunk::new(pulled.samples, pulled.channel_count, pulled.timestamps, recv) {
            Ok(chunk) => {
                channel.push(chunk);
            }
            Err(e) => warn!("Discarding chunk: {}", e),
        }
    }
}
