//! Error types for the media cache server

use std::fmt;

#[derive(Debug)]
pub enum ServerError {
    AssetStore(asset_store::AssetStoreError),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::AssetStore(err) => write!(f, "Asset store error: {}", err),
            ServerError::Io(err) => write!(f, "IO error: {}", err),
            ServerError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::AssetStore(err) => Some(err),
            ServerError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<asset_store::AssetStoreError> for ServerError {
    fn from(err: asset_store::AssetStoreError) -> Self {
        ServerError::AssetStore(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for ServerError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ServerError::Config(err.to_string())
    }
}

impl From<url::ParseError> for ServerError {
    fn from(err: url::ParseError) -> Self {
        ServerError::Config(format!("invalid BASE_URL: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
