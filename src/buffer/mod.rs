pub mod ring;

pub use ring::{BoundedChannel, OverflowPolicy};
