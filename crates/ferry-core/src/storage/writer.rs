//! Shared positional writer over a download's `.part` file.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// Cloneable handle every chunk task of one download writes through.
#[derive(Clone)]
pub struct PartFileWriter {
    file: Arc<File>,
    temp_path: PathBuf,
    destination: PathBuf,
}

impl PartFileWriter {
    pub(crate) fn new(file: File, temp_path: PathBuf, destination: PathBuf) -> Self {
        Self {
            file: Arc::new(file),
            temp_path,
            destination,
        }
    }

    /// Writes all of `data` at `offset` (pwrite). Concurrent calls on clones
    /// are fine as long as their spans do not overlap.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.write_all_at(data, offset)
    }

    /// Seek + write on a cloned handle; callers must not write concurrently.
    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = (*self.file).try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Syncs the temp file and renames it onto the destination. Every other
    /// clone must be dropped first.
    pub fn commit(self) -> io::Result<PathBuf> {
        self.file.sync_all()?;
        let Self {
            file,
            temp_path,
            destination,
        } = self;
        drop(file);
        std::fs::rename(&temp_path, &destination)?;
        Ok(destination)
    }
}
