//! Disk I/O and download-file lifecycle.
//!
//! Streams land in a `.part` temp file next to the final path (parent
//! directories created on demand, preallocated when the size is known) and
//! are atomically renamed into place once the transfer completes. Failed or
//! cancelled transfers discard the temp file so no partials survive.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Writer for an in-flight download. Offset writes are independent
/// (pwrite-style), so the curl write callback can share it freely.
#[derive(Clone)]
pub struct PartWriter {
    file: Arc<File>,
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl PartWriter {
    /// Create the temp file for `final_path`, making parent directories as
    /// needed. Overwrites any stale temp file from an earlier attempt.
    pub fn create(final_path: &Path) -> io::Result<Self> {
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = temp_path(final_path);
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        Ok(PartWriter {
            file: Arc::new(file),
            temp_path,
            final_path: final_path.to_path_buf(),
        })
    }

    /// Preallocate `size` bytes. On Unix tries `posix_fallocate` for real
    /// block allocation; falls back to `set_len` on failure or non-Unix.
    pub fn preallocate(&self, size: u64) -> io::Result<()> {
        #[cfg(unix)]
        {
            let fd = self.file.as_raw_fd();
            let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
        }
        self.file.set_len(size)
    }

    /// Write `data` at `offset` without moving the file's logical cursor.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.write_all_at(data, offset)
    }

    /// Non-Unix fallback: seek + write on a cloned handle.
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

    /// Atomically rename the temp file into the final path. Consumes the
    /// writer; the temp file is removed if the rename fails.
    pub fn finalize(self) -> io::Result<()> {
        let PartWriter {
            file,
            temp_path,
            final_path,
        } = self;
        drop(file);
        if let Err(e) = fs::rename(&temp_path, &final_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
        Ok(())
    }

    /// Drop the temp file (failed or cancelled transfer).
    pub fn discard(self) {
        let PartWriter {
            file, temp_path, ..
        } = self;
        drop(file);
        if let Err(e) = fs::remove_file(&temp_path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("failed to remove partial file {}: {}", temp_path.display(), e);
            }
        }
    }
}

/// Path for the temp file: appends `.part` to the final path.
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Remove a file, tolerating its absence.
pub fn delete_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::info!("deleted file: {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("file not found: {}", path.display());
        }
        Err(e) => tracing::warn!("failed to delete {}: {}", path.display(), e),
    }
}
