//! Export failures.

/// Why an export did not produce an output file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExportError {
    /// The preset cannot write this asset into a file with this extension.
    #[error("Incompatible output file type: '{0}'")]
    IncompatibleOutputFileType(String),

    /// The backend could not set up an export for the request.
    #[error("Could not create export session")]
    InvalidExportSession,

    /// Encoding or file replacement failed.
    #[error("Export failed: {0}")]
    Internal(String),
}

impl ExportError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
