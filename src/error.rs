//! Error handling and custom error types
//!
//! Provides unified error handling across the crate using thiserror.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] dotenvy::Error),

    #[error("Failed to publish cache file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Compression API error (status {status}): {message}")]
    CompressionApi { status: u16, message: String },

    #[error("Compression quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Compression timed out after {0:?}")]
    CompressionTimeout(Duration),

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Unknown transform: {0}")]
    UnknownTransform(String),

    #[error("Cached image {} can not be written back to the asset store", .0.display())]
    CachedWriteBack(PathBuf),

    #[error("Variant generation failed: {0}")]
    Generation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invariant violation: {0}")]
    Invariant(String),
}

impl Error {
    /// True for failures worth retrying against the remote compressor.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Error::CompressionApi { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
