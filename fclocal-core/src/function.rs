//! Function models

use crate::error::InvokeError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Supported function runtimes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Runtime {
    Nodejs6,
    Nodejs8,
    Python27,
    Python3,
    Java8,
    Php72,
}

/// Language family of a runtime, used to pick a debug protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeFamily {
    Node,
    Python,
    Java,
    Php,
}

impl Runtime {
    pub const ALL: [Runtime; 6] = [
        Self::Nodejs6,
        Self::Nodejs8,
        Self::Python27,
        Self::Python3,
        Self::Java8,
        Self::Php72,
    ];

    /// Parse runtime string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "nodejs6" => Some(Self::Nodejs6),
            "nodejs8" => Some(Self::Nodejs8),
            "python2.7" => Some(Self::Python27),
            "python3" => Some(Self::Python3),
            "java8" => Some(Self::Java8),
            "php7.2" => Some(Self::Php72),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nodejs6 => "nodejs6",
            Self::Nodejs8 => "nodejs8",
            Self::Python27 => "python2.7",
            Self::Python3 => "python3",
            Self::Java8 => "java8",
            Self::Php72 => "php7.2",
        }
    }

    /// Suffix of the runtime image name (`runtime-<suffix>`)
    pub fn image_name(&self) -> &'static str {
        match self {
            Self::Python3 => "python3.6",
            other => other.as_str(),
        }
    }

    pub fn family(&self) -> RuntimeFamily {
        match self {
            Self::Nodejs6 | Self::Nodejs8 => RuntimeFamily::Node,
            Self::Python27 | Self::Python3 => RuntimeFamily::Python,
            Self::Java8 => RuntimeFamily::Java,
            Self::Php72 => RuntimeFamily::Php,
        }
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static configuration of one function, as supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionSpec {
    pub runtime: String,
    pub handler: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initializer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initialization_timeout: Option<u32>,
    pub code_uri: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_size: Option<u32>,
    #[serde(default)]
    pub environment_variables: IndexMap<String, String>,
}

impl FunctionSpec {
    pub fn new(
        runtime: impl Into<String>,
        handler: impl Into<String>,
        code_uri: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runtime: runtime.into(),
            handler: handler.into(),
            code_uri: code_uri.into(),
            ..Default::default()
        }
    }

    /// Check that every required property is present
    pub fn validate(&self) -> Result<(), InvokeError> {
        if self.runtime.trim().is_empty() {
            return Err(InvokeError::MissingProperty("Runtime"));
        }
        if self.handler.trim().is_empty() {
            return Err(InvokeError::MissingProperty("Handler"));
        }
        if self.code_uri.as_os_str().is_empty() {
            return Err(InvokeError::MissingProperty("CodeUri"));
        }
        Ok(())
    }
}
