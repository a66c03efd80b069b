//! Error types for the asset store

use std::fmt;

#[derive(Debug)]
pub enum AssetStoreError {
    Io(Box<std::io::Error>),
    Index(String),
}

impl fmt::Display for AssetStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetStoreError::Io(err) => write!(f, "IO error: {}", err),
            AssetStoreError::Index(msg) => write!(f, "Index error: {}", msg),
        }
    }
}

impl std::error::Error for AssetStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AssetStoreError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AssetStoreError {
    fn from(err: std::io::Error) -> Self {
        AssetStoreError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for AssetStoreError {
    fn from(err: serde_json::Error) -> Self {
        AssetStoreError::Index(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AssetStoreError>;
