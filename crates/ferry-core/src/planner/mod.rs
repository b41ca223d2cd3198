//! Chunk planning and range math.
//!
//! Splits an object of known size into fixed-size, inclusive byte ranges,
//! formats range descriptors for the chunk protocol, and tracks which
//! chunks of a transfer have completed.

mod bitmap;
mod range;

pub use bitmap::ChunkBitmap;
pub use range::{plan, ByteRange};

/// Default chunk size: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Default number of chunks in flight per transfer.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;
