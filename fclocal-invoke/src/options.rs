//! Container options composition
//!
//! Options are kept as a JSON tree shaped like the engine's container create
//! body (`Env`, `HostConfig`, `ExposedPorts`, ...), so runtime-specific debug
//! fragments can be overlaid with [`merge`] before the tree is handed to the
//! engine.

use crate::debug::DebugConfigGenerator;
use crate::mount::Mount;
use fclocal_core::{FunctionSpec, InvokeError, Runtime};
use serde_json::{json, Map, Value};
use tracing::debug;

/// Immutable options for one container run
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerOptions(Value);

impl ContainerOptions {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn env(&self) -> Vec<&str> {
        self.0["Env"]
            .as_array()
            .map(|env| env.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn auto_remove(&self) -> bool {
        self.0["HostConfig"]["AutoRemove"].as_bool().unwrap_or(false)
    }

    pub fn mounts(&self) -> &[Value] {
        self.0["HostConfig"]["Mounts"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Recursively overlay `overlay` onto `base`
///
/// Objects merge key by key; any other overlay value (arrays included)
/// replaces the base value wholesale.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => merge_objects(base, overlay),
        (base, overlay) => *base = overlay,
    }
}

fn merge_objects(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        match base.get_mut(&key) {
            Some(existing) => merge(existing, value),
            None => {
                base.insert(key, value);
            }
        }
    }
}

/// Compose the options for one invocation
///
/// Pure: the environment is assembled beforehand and nothing here touches the
/// filesystem or the engine.
pub fn build_options(
    spec: &FunctionSpec,
    runtime: Runtime,
    mount: &Mount,
    env: Vec<String>,
    debug_port: Option<u16>,
    generator: &dyn DebugConfigGenerator,
) -> Result<ContainerOptions, InvokeError> {
    let mount = serde_json::to_value(mount)
        .map_err(|e| InvokeError::InvalidConfig(format!("invalid mount: {e}")))?;

    let mut options = json!({
        "Env": env,
        "HostConfig": {
            "AutoRemove": true,
            "Mounts": [mount],
        },
    });

    if let Some(memory_mb) = spec.memory_size {
        options["HostConfig"]["Memory"] = json!(i64::from(memory_mb) * 1024 * 1024);
    }

    if let Some(port) = debug_port {
        let overrides = generator.container_overrides(runtime, port);
        debug!(overrides = %overrides, "Applying debug container overrides");
        if !overrides.is_null() {
            merge(&mut options, overrides);
        }
    }

    debug!(options = %options, "Built container options");
    Ok(ContainerOptions(options))
}
