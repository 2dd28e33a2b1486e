//! Invocation error types and classification

use std::path::PathBuf;
use thiserror::Error;

/// Error classes surfaced by a local invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Configuration,
    PathNotFound,
    ImagePull,
    ContainerRuntime,
    Credentials,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "ConfigurationError",
            Self::PathNotFound => "PathNotFoundError",
            Self::ImagePull => "ImagePullError",
            Self::ContainerRuntime => "ContainerRuntimeError",
            Self::Credentials => "CredentialsError",
        }
    }

    /// Process exit status used by the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration => 2,
            Self::PathNotFound => 3,
            Self::ImagePull => 4,
            Self::ContainerRuntime => 5,
            Self::Credentials => 6,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while invoking a function locally
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("invalid runtime name {0}")]
    UnknownRuntime(String),

    #[error("Missing required property: {0}")]
    MissingProperty(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Code location not found: {}", path.display())]
    PathNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to pull image {image}: {message}")]
    ImagePull { image: String, message: String },

    #[error("Container runtime error: {0}")]
    ContainerRuntime(String),

    #[error("Container exited with status {0}")]
    ContainerExit(i64),

    #[error("Invocation interrupted")]
    Interrupted,

    #[error("Failed to load credentials: {0}")]
    Credentials(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InvokeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownRuntime(_) | Self::MissingProperty(_) | Self::InvalidConfig(_) => {
                ErrorCode::Configuration
            }
            Self::PathNotFound { .. } => ErrorCode::PathNotFound,
            Self::ImagePull { .. } => ErrorCode::ImagePull,
            Self::ContainerRuntime(_)
            | Self::ContainerExit(_)
            | Self::Interrupted
            | Self::Io(_) => ErrorCode::ContainerRuntime,
            Self::Credentials(_) => ErrorCode::Credentials,
        }
    }
}
