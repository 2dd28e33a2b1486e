//! Container environment assembly

use crate::debug::DebugConfigGenerator;
use fclocal_core::{Credentials, FunctionSpec, Runtime};
use tracing::debug;

/// Marks the process as running in the local sandbox
pub const LOCAL_MARKER: &str = "local=true";

pub const ACCESS_KEY_ID_VAR: &str = "FC_ACCESS_KEY_ID";
pub const ACCESS_KEY_SECRET_VAR: &str = "FC_ACCESS_KEY_SECRET";

/// Declared function variables as `NAME=VALUE`, in declaration order
pub fn function_env(spec: &FunctionSpec) -> Vec<String> {
    spec.environment_variables
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect()
}

/// Build the full environment passed into the function container
///
/// Later entries win on duplicate names; that resolution is left to the
/// container engine.
pub fn assemble_env(
    spec: &FunctionSpec,
    runtime: Runtime,
    credentials: &Credentials,
    debug_port: Option<u16>,
    generator: &dyn DebugConfigGenerator,
) -> Vec<String> {
    let mut env = function_env(spec);
    debug!(count = env.len(), "Loaded function environment");

    env.push(LOCAL_MARKER.to_string());
    env.push(format!("{ACCESS_KEY_ID_VAR}={}", credentials.access_key_id));
    env.push(format!(
        "{ACCESS_KEY_SECRET_VAR}={}",
        credentials.access_key_secret
    ));

    if let Some(port) = debug_port {
        if let Some(debug_env) = generator.debug_env(runtime, port) {
            debug!(debug_env = %debug_env, "Adding debug environment");
            env.push(debug_env);
        }
    }

    env
}
