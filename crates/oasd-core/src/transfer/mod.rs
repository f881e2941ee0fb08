//! Streaming transfer executor.
//!
//! One URL to one local file: streaming GET into a `.part` temp file, the
//! cancellation flag checked before every chunk write, integer-percent
//! progress published on every chunk except the final one (which hands off
//! to verification). Partial files never survive a failed or cancelled
//! transfer. Sizing comes from a prior HEAD request; when the size is
//! unknown or zero, percentage reporting is suppressed.

mod error;

pub use error::TransferError;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::TransferConfig;
use crate::coordinator::CancelToken;
use crate::remote;
use crate::storage::PartWriter;
use crate::store::StateStore;

/// Published while the final chunk is verified against the declared size.
pub const PROGRESS_VERIFYING: &str = "Verifying authenticity...";
/// Terminal success message for a single asset.
pub const PROGRESS_DOWNLOADED: &str = "Downloaded!";
/// Terminal message when the cancellation flag was observed.
pub const PROGRESS_CANCELLED: &str = "Download cancelled...";
/// Published when neither mirror is reachable.
pub const PROGRESS_MIRRORS_OFFLINE: &str = "Mirrors are offline...";
/// Terminal success message for a full catalog drain.
pub const PROGRESS_ALL_MODELS_DOWNLOADED: &str = "All models downloaded!";

/// Writes progress strings to one category's progress key. Values are
/// overwritten, never appended; the store is last-writer-wins.
#[derive(Clone)]
pub struct ProgressReporter {
    store: Arc<dyn StateStore>,
    key: &'static str,
}

impl ProgressReporter {
    pub fn new(store: Arc<dyn StateStore>, key: &'static str) -> Self {
        Self { store, key }
    }

    pub fn set(&self, message: &str) {
        self.store.put(self.key, message);
    }

    pub fn percent(&self, pct: u64) {
        self.store.put(self.key, &format!("{}%", pct));
    }
}

/// Stream `url` into `destination`.
///
/// Blocking; run under `spawn_blocking` from async contexts. On any error
/// the partial file has already been removed; publishing the failure message
/// and clearing the request key is the caller's job (it knows the keys).
pub fn transfer(
    url: &str,
    destination: &std::path::Path,
    cancel: &CancelToken,
    progress: &ProgressReporter,
    net: &TransferConfig,
) -> Result<(), TransferError> {
    // Size first so chunk progress can be expressed as a percentage.
    // Failure here is not fatal; it only suppresses percentage reports.
    let total = remote::remote_file_size(url, Duration::from_secs(net.head_timeout_secs))
        .ok()
        .flatten()
        .unwrap_or(0);

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(Duration::from_secs(net.connect_timeout_secs))?;
    easy.low_speed_limit(net.low_speed_limit_bytes)?;
    easy.low_speed_time(Duration::from_secs(net.low_speed_time_secs))?;

    let writer = PartWriter::create(destination)?;
    if total > 0 {
        if let Err(e) = writer.preallocate(total) {
            writer.discard();
            return Err(TransferError::Storage(e));
        }
    }

    let written = AtomicU64::new(0);
    let cancelled = AtomicBool::new(false);
    let storage_error: Mutex<Option<std::io::Error>> = Mutex::new(None);

    let perform_result = {
        let mut transfer = easy.transfer();
        let registered = transfer.write_function(|data| {
            if cancel.is_cancelled() {
                cancelled.store(true, Ordering::Relaxed);
                return Ok(0); // abort transfer
            }
            let offset = written.load(Ordering::Relaxed);
            if let Err(e) = writer.write_at(offset, data) {
                *storage_error.lock().unwrap() = Some(e);
                return Ok(0);
            }
            let done = offset + data.len() as u64;
            written.store(done, Ordering::Relaxed);
            if total > 0 {
                let pct = done.saturating_mul(100) / total;
                if pct >= 100 {
                    progress.set(PROGRESS_VERIFYING);
                } else {
                    progress.percent(pct);
                }
            }
            Ok(data.len())
        });
        match registered {
            Ok(()) => transfer.perform(),
            Err(e) => Err(e),
        }
    };

    if cancelled.load(Ordering::Relaxed) {
        writer.discard();
        return Err(TransferError::Cancelled);
    }
    if let Some(e) = storage_error.lock().unwrap().take() {
        writer.discard();
        return Err(TransferError::Storage(e));
    }
    if let Err(e) = perform_result {
        writer.discard();
        return Err(TransferError::from_curl(e));
    }

    let code = match easy.response_code() {
        Ok(code) => code,
        Err(e) => {
            writer.discard();
            return Err(TransferError::from_curl(e));
        }
    };
    if code == 404 {
        writer.discard();
        return Err(TransferError::NotFound);
    }
    if !(200..300).contains(&code) {
        writer.discard();
        return Err(TransferError::Server(code));
    }

    writer.finalize()?;
    Ok(())
}
