//! Positional reader for upload sources.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// Read-only handle on a local file, shared by all chunk tasks of one upload.
/// Each `read_at` is independent of the others (pread-style).
#[derive(Clone)]
pub struct ChunkReader {
    file: Arc<File>,
    path: PathBuf,
    len: u64,
}

impl ChunkReader {
    /// Open `path` and record its size.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            path: path.to_path_buf(),
            len,
        })
    }

    /// File size captured at open time.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read exactly `len` bytes starting at `offset`.
    #[cfg(unix)]
    pub fn read_at(&self, offset: u64, len: u64) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        self.file.read_exact_at(&mut buf, offset)?;
        Ok(buf)
    }

    /// Non-Unix fallback: seek + read on a cloned handle.
    #[cfg(not(unix))]
    pub fn read_at(&self, offset: u64, len: u64) -> io::Result<Vec<u8>> {
        use std::io::{Read, Seek, SeekFrom};
        let mut f = (*self.file).try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        f.read_exact(&mut buf)?;
        Ok(buf)
    }
}
