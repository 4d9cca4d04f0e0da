//! Error types shared across FrameSift crates.

use std::path::PathBuf;

/// Top-level error type for FrameSift media and tooling operations.
#[derive(Debug, thiserror::Error)]
pub enum FramesiftError {
    #[error("Media error: {message}")]
    Media { message: String },

    #[error("Probe error: {message}")]
    Probe { message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using FramesiftError.
pub type FramesiftResult<T> = Result<T, FramesiftError>;

impl FramesiftError {
    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media {
            message: msg.into(),
        }
    }

    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe {
            message: msg.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_messages() {
        assert_eq!(
            FramesiftError::probe("no streams").to_string(),
            "Probe error: no streams"
        );
        assert_eq!(
            FramesiftError::decode("bad packet").to_string(),
            "Decode error: bad packet"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: FramesiftError = io.into();
        assert!(matches!(err, FramesiftError::Io(_)));
    }
}
