use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("Unknown channel: {id}")]
    UnknownChannel { id: String },

    #[error("Not found: {name}")]
    NotFound { name: String },

    #[error("Transport error on {target}: {message}")]
    Transport { target: String, message: String },

    #[error("Build failed for channel '{channel}': {message}")]
    BuildFailed { channel: String, message: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Failed to parse config {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Unknown config key: {key}")]
    ConfigKeyNotFound { key: String },

    #[error("Artifact root is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, ReleaseError>;

impl ReleaseError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnknownChannel { .. } => 2,
            Self::NotFound { .. } => 3,
            Self::Transport { .. } => 4,
            Self::InvalidArgument { .. } => 5,
            Self::ConfigParse { .. } | Self::ConfigKeyNotFound { .. } => 6,
            _ => 1,
        }
    }

    pub(crate) fn transport(target: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Transport {
            target: target.into(),
            message: message.to_string(),
        }
    }
}
