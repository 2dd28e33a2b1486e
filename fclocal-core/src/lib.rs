//! Core types for fclocal
//!
//! This crate provides the function model, credentials and error types shared
//! by the invocation engine and the CLI.

pub mod credentials;
pub mod error;
pub mod function;
pub mod template;

pub use credentials::{CredentialProvider, Credentials, EnvCredentialProvider, StaticCredentials};
pub use error::{ErrorCode, InvokeError};
pub use function::{FunctionSpec, Runtime, RuntimeFamily};
pub use template::{FunctionDefinition, Template, TemplateError};
