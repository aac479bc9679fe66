//! Error types for host-side asset handling.

use thiserror::Error;

/// Errors produced while loading or validating host-side data.
#[derive(Error, Debug)]
pub enum Error {
    /// An asset could not be located or decoded.
    #[error("Failed to load asset {path}: {reason}")]
    AssetLoad { path: String, reason: String },

    /// Invalid data error
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl Error {
    /// Build an [`Error::AssetLoad`] for the given path.
    pub fn asset_load(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        Self::AssetLoad {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
