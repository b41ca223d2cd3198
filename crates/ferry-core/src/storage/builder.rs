//! Creates the `.part` file a download writes into.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

use super::temp_path;
use super::writer::PartFileWriter;

/// Freshly created `<destination>.part`, not yet shared with chunk tasks.
pub struct PartFileBuilder {
    file: File,
    temp_path: PathBuf,
    destination: PathBuf,
}

impl PartFileBuilder {
    /// Creates `<destination>.part` (and the destination's directory).
    /// An existing temp file is truncated; downloads never resume.
    pub fn create(destination: &Path) -> io::Result<Self> {
        if let Some(dir) = destination.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let temp_path = temp_path(destination);
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        Ok(Self {
            file,
            temp_path,
            destination: destination.to_path_buf(),
        })
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Reserves `size` bytes up front so positional writes never extend the
    /// file. Uses `posix_fallocate` on Unix, `set_len` otherwise or on failure.
    pub fn preallocate(&mut self, size: u64) -> io::Result<()> {
        if size == 0 {
            return Ok(());
        }
        #[cfg(unix)]
        {
            let r = unsafe { libc::posix_fallocate(self.file.as_raw_fd(), 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            tracing::debug!(errno = r, path = %self.temp_path.display(), "posix_fallocate unavailable; using set_len");
        }
        self.file.set_len(size)
    }

    pub fn build(self) -> PartFileWriter {
        PartFileWriter::new(self.file, self.temp_path, self.destination)
    }
}
