//! Catalog reconciliation: the diff between the remote manifest (or
//! directory listing) and local filesystem state, and the minimal set of
//! fetches, deletions and published-parameter updates that closes it.

pub mod manifest;
pub mod models;
pub mod themes;

use thiserror::Error;

use crate::transfer::TransferError;

/// Failures that abort a reconciliation pass without mutating the catalog.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("both mirrors unreachable")]
    MirrorsOffline,
    #[error("manifest unavailable: {0}")]
    ManifestUnavailable(String),
    #[error(transparent)]
    Transfer(#[from] TransferError),
}
