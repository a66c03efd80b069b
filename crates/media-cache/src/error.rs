//! Error types for the media cache

use std::fmt;

/// Why a media load failed
///
/// Cloneable so callers coalesced onto one in-flight fetch can all receive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// Upstream answered with a non-success status
    Fetch { status: u16 },
    /// The request never produced a response
    Network(String),
    /// The response body could not be read into memory
    Storage(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Fetch { status } => write!(f, "Fetch error: upstream returned status {}", status),
            LoadError::Network(msg) => write!(f, "Network error: {}", msg),
            LoadError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<reqwest::Error> for LoadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_body() || err.is_decode() {
            LoadError::Storage(err.to_string())
        } else {
            LoadError::Network(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, LoadError>;
