//! Byte range type and chunk planning.

use crate::error::{FerryError, Result};

/// A single chunk: byte range `[start, end]` (inclusive on both ends).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Position of this range in the plan.
    pub index: usize,
    /// First byte offset.
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered by this range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Range descriptor for chunk fetches: `bytes start-end`.
    pub fn descriptor(&self) -> String {
        format!("bytes {}-{}", self.start, self.end)
    }

    /// Range descriptor for chunk uploads: `bytes start-end/total`.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }

    /// HTTP `Range` header value: `bytes=start-end`.
    pub fn range_header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Builds the chunk plan for an object of `total_size` bytes.
///
/// Ranges come out in index order, never overlap, and cover `[0, total_size)`
/// exactly. Every range is `chunk_size` long except possibly the last.
/// An empty object yields an empty plan; a zero chunk size is rejected.
pub fn plan(total_size: u64, chunk_size: u64) -> Result<Vec<ByteRange>> {
    if chunk_size == 0 {
        return Err(FerryError::InvalidSize { chunk_size });
    }
    if total_size == 0 {
        return Ok(Vec::new());
    }

    let count = total_size.div_ceil(chunk_size);
    let mut out = Vec::with_capacity(count as usize);
    let mut start = 0u64;
    let mut index = 0usize;

    while start < total_size {
        let end = start.saturating_add(chunk_size).min(total_size) - 1;
        out.push(ByteRange { index, start, end });
        start = end + 1;
        index += 1;
    }

    Ok(out)
}
