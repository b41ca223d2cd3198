//! Chunk completion bitmap.

/// One bit per chunk (LSB of byte 0 = chunk 0). Used to count acknowledged
/// chunks exactly once, whatever order they complete in.
#[derive(Debug, Clone, Default)]
pub struct ChunkBitmap {
    bytes: Vec<u8>,
    completed: usize,
}

impl ChunkBitmap {
    /// New empty bitmap with capacity for `chunk_count` bits.
    pub fn new(chunk_count: usize) -> Self {
        ChunkBitmap {
            bytes: vec![0u8; chunk_count.div_ceil(8)],
            completed: 0,
        }
    }

    /// Mark chunk `index` as completed. Returns false if it already was.
    pub fn set_completed(&mut self, index: usize) -> bool {
        let byte_idx = index / 8;
        let bit = index % 8;
        if byte_idx >= self.bytes.len() {
            self.bytes.resize(byte_idx + 1, 0);
        }
        if self.bytes[byte_idx] & (1 << bit) != 0 {
            return false;
        }
        self.bytes[byte_idx] |= 1 << bit;
        self.completed += 1;
        true
    }

    /// True if chunk `index` is marked completed.
    pub fn is_completed(&self, index: usize) -> bool {
        self.bytes
            .get(index / 8)
            .map(|&b| (b & (1 << (index % 8))) != 0)
            .unwrap_or(false)
    }

    /// Number of distinct chunks marked completed.
    pub fn completed_count(&self) -> usize {
        self.completed
    }

    /// True if every chunk in `[0, chunk_count)` is completed.
    pub fn all_completed(&self, chunk_count: usize) -> bool {
        (0..chunk_count).all(|i| self.is_completed(i))
    }
}
