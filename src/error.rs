use thiserror::Error;

/// Import outcomes the caller must tell apart from plain failures.
///
/// Everything else (unreadable files, persistence errors) travels through
/// `anyhow` with context attached at the call site.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The source file's structure matches no recognized layout for its
    /// file type. Terminal for the import; no partial plan is produced.
    #[error("{path}: {reason}")]
    FormatMismatch { path: String, reason: String },

    /// Cooperative cancellation was requested during extraction.
    #[error("import cancelled")]
    Cancelled,
}
