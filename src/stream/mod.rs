pub mod chunk;
pub mod clock;
pub mod source;
pub mod synthetic;

pub use chunk::Chunk;
pub use clock::local_clock;
pub use source::{PulledChunk, Selector, StreamInfo, StreamInlet, StreamSource};
pub use synthetic::{SyntheticConfig, SyntheticSource};
