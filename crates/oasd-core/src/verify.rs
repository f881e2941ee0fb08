//! Post-transfer verification.
//!
//! A size-equality check only: the local byte count must equal the remote
//! declared size. Length-preserving corruption is not detected; the engine
//! does not validate a cryptographic digest.

use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::config::TransferConfig;
use crate::remote;

/// True iff the local file exists and its size equals the remote declared
/// size. False when the file is missing or the remote size cannot be
/// determined.
pub fn verify(local_path: &Path, url: &str, net: &TransferConfig) -> bool {
    let Ok(meta) = fs::metadata(local_path) else {
        tracing::warn!("file not found for verification: {}", local_path.display());
        return false;
    };
    match remote::remote_file_size(url, Duration::from_secs(net.head_timeout_secs)) {
        Ok(Some(remote_size)) => remote_size == meta.len(),
        Ok(None) => false,
        Err(e) => {
            tracing::warn!("could not determine remote size of {}: {}", url, e);
            false
        }
    }
}
