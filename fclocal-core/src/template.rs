//! Function template loading
//!
//! Reads the YAML template describing services and their functions and turns
//! each function entry into a [`FunctionSpec`].

use crate::error::InvokeError;
use crate::function::FunctionSpec;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const SERVICE_TYPE: &str = "Aliyun::Serverless::Service";
pub const FUNCTION_TYPE: &str = "Aliyun::Serverless::Function";

/// Template file looked up when none is given
pub const DEFAULT_TEMPLATE: &str = "template.yml";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid template: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Function not found in template: {0}")]
    FunctionNotFound(String),

    #[error("Invalid function {function}: {message}")]
    InvalidFunction { function: String, message: String },
}

impl From<TemplateError> for InvokeError {
    fn from(err: TemplateError) -> Self {
        InvokeError::InvalidConfig(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTemplate {
    #[serde(default)]
    resources: IndexMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FunctionProperties {
    #[serde(default)]
    runtime: String,
    #[serde(default)]
    handler: String,
    initializer: Option<String>,
    initialization_timeout: Option<u32>,
    code_uri: Option<PathBuf>,
    memory_size: Option<u32>,
    #[serde(default)]
    environment_variables: IndexMap<String, Value>,
}

/// A function declared in a template
#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub service_name: String,
    pub function_name: String,
    pub spec: FunctionSpec,
}

/// Parsed template
#[derive(Debug, Clone, Default)]
pub struct Template {
    functions: Vec<FunctionDefinition>,
}

impl Template {
    /// Load a template file; relative `CodeUri`s resolve against its directory
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        Self::parse(&content, base_dir)
    }

    pub fn parse(content: &str, base_dir: &Path) -> Result<Self, TemplateError> {
        let raw: RawTemplate = serde_yaml::from_str(content)?;
        let mut functions = Vec::new();

        for (service_name, service) in raw.resources {
            if resource_type(&service) != Some(SERVICE_TYPE) {
                continue;
            }

            let Value::Mapping(entries) = service else {
                continue;
            };

            for (key, value) in entries {
                let Some(function_name) = key.as_str() else {
                    continue;
                };
                if resource_type(&value) != Some(FUNCTION_TYPE) {
                    continue;
                }

                let spec = function_spec(function_name, value, base_dir)?;
                debug!(
                    service = %service_name,
                    function = %function_name,
                    runtime = %spec.runtime,
                    "Loaded function from template"
                );

                functions.push(FunctionDefinition {
                    service_name: service_name.clone(),
                    function_name: function_name.to_string(),
                    spec,
                });
            }
        }

        Ok(Self { functions })
    }

    pub fn functions(&self) -> &[FunctionDefinition] {
        &self.functions
    }

    /// Find a function by `service/function` or by bare function name (first match)
    pub fn find_function(&self, name: &str) -> Result<&FunctionDefinition, TemplateError> {
        let found = match name.split_once('/') {
            Some((service, function)) => self
                .functions
                .iter()
                .find(|f| f.service_name == service && f.function_name == function),
            None => self.functions.iter().find(|f| f.function_name == name),
        };

        found.ok_or_else(|| TemplateError::FunctionNotFound(name.to_string()))
    }
}

fn resource_type(value: &Value) -> Option<&str> {
    value.get("Type").and_then(Value::as_str)
}

fn function_spec(name: &str, value: Value, base_dir: &Path) -> Result<FunctionSpec, TemplateError> {
    let invalid = |message: String| TemplateError::InvalidFunction {
        function: name.to_string(),
        message,
    };

    let props: FunctionProperties = match value.get("Properties") {
        Some(props) => serde_yaml::from_value(props.clone()).map_err(|e| invalid(e.to_string()))?,
        None => FunctionProperties::default(),
    };

    let mut environment_variables = IndexMap::with_capacity(props.environment_variables.len());
    for (key, value) in props.environment_variables {
        let value = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            other => {
                return Err(invalid(format!(
                    "environment variable {key} must be a scalar, got {other:?}"
                )))
            }
        };
        environment_variables.insert(key, value);
    }

    let code_uri = props
        .code_uri
        .map(|uri| {
            if uri.is_absolute() {
                uri
            } else {
                base_dir.join(uri)
            }
        })
        .unwrap_or_default();

    Ok(FunctionSpec {
        runtime: props.runtime,
        handler: props.handler,
        initializer: props.initializer,
        initialization_timeout: props.initialization_timeout,
        code_uri,
        memory_size: props.memory_size,
        environment_variables,
    })
}
