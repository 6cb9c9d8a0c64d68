pub mod sampler;

pub use sampler::{ResourceProbe, ResourceSampler, ResourceUsage, SysinfoProbe};
