//! Transfer error taxonomy and its mapping to published progress messages.

use thiserror::Error;

/// Failure modes of a single asset transfer.
///
/// `NotFound` is deliberately distinct from the other kinds: callers treat it
/// as "try the next extension or mirror" rather than a terminal failure.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Asset absent on the current mirror (HTTP 404).
    #[error("asset not found on mirror")]
    NotFound,
    /// Any other non-success HTTP status.
    #[error("server error (HTTP {0})")]
    Server(u32),
    /// Network-level failure (connection reset, DNS, broken transfer).
    #[error("connection dropped")]
    Connection,
    /// Connect or read-stall timeout.
    #[error("download timed out")]
    Timeout,
    /// Cancellation flag observed between chunks.
    #[error("download cancelled")]
    Cancelled,
    /// Completed transfer whose size does not match the declared size.
    #[error("verification failed")]
    Verification,
    /// Local disk failure.
    #[error("storage: {0}")]
    Storage(#[from] std::io::Error),
    /// Any other request failure.
    #[error("network request failed: {0}")]
    Request(String),
}

impl TransferError {
    /// Classify a curl error into the taxonomy so the caller can decide
    /// whether to fail over to the secondary mirror.
    pub fn from_curl(e: curl::Error) -> Self {
        if e.is_operation_timedout() {
            return TransferError::Timeout;
        }
        if e.is_couldnt_connect()
            || e.is_couldnt_resolve_host()
            || e.is_couldnt_resolve_proxy()
            || e.is_read_error()
            || e.is_recv_error()
            || e.is_send_error()
            || e.is_got_nothing()
            || e.is_partial_file()
        {
            return TransferError::Connection;
        }
        TransferError::Request(e.to_string())
    }

    /// The human-readable string published to the progress key.
    pub fn progress_message(&self) -> String {
        match self {
            TransferError::NotFound => "Failed: Server error (404)".to_string(),
            TransferError::Server(code) => format!("Failed: Server error ({})", code),
            TransferError::Connection => "Failed: Connection dropped...".to_string(),
            TransferError::Timeout => "Failed: Download timed out...".to_string(),
            TransferError::Cancelled => "Download cancelled...".to_string(),
            TransferError::Verification => "Failed: Verification failed...".to_string(),
            TransferError::Storage(_) => "Failed: Unexpected error.".to_string(),
            TransferError::Request(_) => {
                "Failed: Network request error. Check connection.".to_string()
            }
        }
    }
}

impl From<curl::Error> for TransferError {
    fn from(e: curl::Error) -> Self {
        TransferError::from_curl(e)
    }
}
