//! Local function invocation
//!
//! One invocation runs one ephemeral container. The stages run strictly in
//! order and the first failure aborts the invocation; nothing is retried here.

use crate::debug::DebugConfigGenerator;
use crate::env::assemble_env;
use crate::image::{find_image, ImageManager, PullPolicy, DEFAULT_PULL_TIMEOUT};
use crate::mount::{resolve_mount, Mount, CODE_DIR};
use crate::options::build_options;
use crate::runtime::{ContainerRuntime, OutputSink};
use fclocal_core::{CredentialProvider, FunctionSpec, InvokeError, Runtime};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

pub const CONFIG_BEGIN: &str = "///////////////// config begin /////////////////";
pub const CONFIG_END: &str = "///////////////// config end /////////////////";

/// Tunables shared by every invocation of an [`Invoker`]
#[derive(Debug, Clone)]
pub struct InvokeSettings {
    pub pull_policy: PullPolicy,
    pub pull_timeout: Duration,
}

impl Default for InvokeSettings {
    fn default() -> Self {
        Self {
            pull_policy: PullPolicy::IfMissing,
            pull_timeout: DEFAULT_PULL_TIMEOUT,
        }
    }
}

/// A single invocation request
#[derive(Debug, Clone)]
pub struct InvokeRequest<'a> {
    pub service_name: &'a str,
    pub function_name: &'a str,
    pub spec: &'a FunctionSpec,
    /// Port the runtime's debugger listens on; `0` means no debug session
    pub debug_port: Option<u16>,
    /// Event payload, passed through to the runtime untouched
    pub event: Option<&'a str>,
    /// Print an IDE attach configuration before starting
    pub debugger_config: bool,
}

impl<'a> InvokeRequest<'a> {
    pub fn new(service_name: &'a str, function_name: &'a str, spec: &'a FunctionSpec) -> Self {
        Self {
            service_name,
            function_name,
            spec,
            debug_port: None,
            event: None,
            debugger_config: false,
        }
    }

    /// Debug port of a real debug session, if any
    pub fn debug_session_port(&self) -> Option<u16> {
        self.debug_port.filter(|&port| port != 0)
    }
}

/// Arguments passed to the runtime image's entrypoint
///
/// An empty event and a zero initialization timeout are left out.
pub fn build_command(spec: &FunctionSpec, event: Option<&str>) -> Vec<String> {
    let mut cmd = vec!["-h".to_string(), spec.handler.clone()];

    if let Some(event) = event.filter(|event| !event.is_empty()) {
        cmd.push("--event".to_string());
        cmd.push(event.to_string());
    }

    if let Some(initializer) = &spec.initializer {
        cmd.push("-i".to_string());
        cmd.push(initializer.clone());
    }

    if let Some(timeout) = spec.initialization_timeout.filter(|&timeout| timeout > 0) {
        cmd.push("--initializationTimeout".to_string());
        cmd.push(timeout.to_string());
    }

    debug!(cmd = ?cmd, "Built container command");
    cmd
}

/// Unique container name derived from the function's identity
pub fn container_name(service_name: &str, function_name: &str) -> String {
    let sanitize = |s: &str| -> String {
        s.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                    c
                } else {
                    '-'
                }
            })
            .collect()
    };

    format!(
        "fclocal-{}-{}-{}",
        sanitize(service_name),
        sanitize(function_name),
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    )
}

/// Directory holding the function sources on the host
fn source_dir(mount: &Mount) -> &Path {
    if mount.target == CODE_DIR {
        &mount.source
    } else {
        mount.source.parent().unwrap_or(&mount.source)
    }
}

fn render_debugger_config(config: &Value) -> Result<String, InvokeError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    config
        .serialize(&mut serializer)
        .map_err(|e| InvokeError::InvalidConfig(format!("invalid debugger config: {e}")))?;

    Ok(format!(
        "you can paste these config to .vscode/launch.json, and then attach to your running function\n\
         {CONFIG_BEGIN}\n{}\n{CONFIG_END}\n",
        String::from_utf8_lossy(&buf)
    ))
}

/// Runs functions locally, one container per invocation
pub struct Invoker {
    runtime: Arc<dyn ContainerRuntime>,
    credentials: Arc<dyn CredentialProvider>,
    debug: Arc<dyn DebugConfigGenerator>,
    images: ImageManager,
}

impl Invoker {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        credentials: Arc<dyn CredentialProvider>,
        debug: Arc<dyn DebugConfigGenerator>,
        settings: InvokeSettings,
    ) -> Self {
        let images = ImageManager::new(
            runtime.clone(),
            settings.pull_policy,
            settings.pull_timeout,
        );
        Self {
            runtime,
            credentials,
            debug,
            images,
        }
    }

    /// Invoke a function, mirroring the container's stdout into `out`
    ///
    /// Completes when the container exits; a non-zero exit status is an error.
    pub async fn invoke(
        &self,
        request: &InvokeRequest<'_>,
        out: OutputSink<'_>,
    ) -> Result<(), InvokeError> {
        let spec = request.spec;
        spec.validate()?;

        let cmd = build_command(spec, request.event);

        let image = find_image(&spec.runtime)
            .ok_or_else(|| InvokeError::UnknownRuntime(spec.runtime.clone()))?;
        let runtime = Runtime::from_str(&spec.runtime)
            .ok_or_else(|| InvokeError::UnknownRuntime(spec.runtime.clone()))?;

        info!(
            service = %request.service_name,
            function = %request.function_name,
            runtime = %runtime,
            image = %image,
            "Invoking function"
        );

        let mount = resolve_mount(&spec.code_uri).await?;
        let credentials = self.credentials.credentials().await?;

        self.images.ensure_image(&image, &mut *out).await?;

        let debug_port = request.debug_session_port();
        debug!(debug_port = ?debug_port, "Debug settings");

        if request.debugger_config {
            match debug_port {
                Some(port) => {
                    let config = self.debug.attach_config(
                        request.service_name,
                        request.function_name,
                        runtime,
                        source_dir(&mount),
                        port,
                    );
                    out.write_all(render_debugger_config(&config)?.as_bytes())
                        .await?;
                    out.flush().await?;
                }
                None => warn!("Debugger config requested without a debug port, skipping"),
            }
        }

        let env = assemble_env(
            spec,
            runtime,
            &credentials,
            debug_port,
            self.debug.as_ref(),
        );
        let options = build_options(
            spec,
            runtime,
            &mount,
            env,
            debug_port,
            self.debug.as_ref(),
        )?;

        let name = container_name(request.service_name, request.function_name);
        let status = self
            .runtime
            .run_container(&name, &image, &cmd, &mut *out, &options)
            .await?;

        if status != 0 {
            warn!(container = %name, status, "Function container exited abnormally");
            return Err(InvokeError::ContainerExit(status));
        }

        info!(container = %name, "Invocation finished");
        Ok(())
    }
}
