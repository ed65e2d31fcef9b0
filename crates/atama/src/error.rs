use std::io;

use atama_path::PathError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("path is empty")]
    EmptyPath,
    #[error("path not found: {0}")]
    PathNotFound(String),
    #[error("value at {0:?} is not a container")]
    NotContainer(String),
    #[error("invalid sequence index {index:?} under {key:?}")]
    InvalidIndex { key: String, index: String },
    #[error("the key {0:?} is reserved and cannot be set or deleted manually")]
    ReservedKey(String),
    #[error("invalid listen expression {0:?}")]
    InvalidListenExpr(String),
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),
    #[error("persistence failed: {0}")]
    Persist(#[from] PersistError),
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot encode/decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("root snapshot is not an object")]
    NotObject,
}

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("failed to read options file: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse options: {0}")]
    Toml(#[from] toml::de::Error),
}
