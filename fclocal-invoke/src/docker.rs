//! Docker-backed container runtime
//!
//! Talks to the local Docker daemon through bollard. Containers are created
//! with the options tree built for the invocation, attached before start so
//! no output is lost, and waited on until the engine removes them.

use crate::image::ImageReference;
use crate::options::ContainerOptions;
use crate::runtime::{ContainerRuntime, OutputSink, PullProgress};
use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions, LogOutput,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::{ContainerWaitResponse, HostConfig};
use bollard::Docker;
use fclocal_core::InvokeError;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

fn engine_error(err: BollardError) -> InvokeError {
    InvokeError::ContainerRuntime(err.to_string())
}

/// Exit status from the first item of a `removed` wait
///
/// Only called once the output stream has ended cleanly. A wait that reaches
/// the daemon after auto-remove finds no container; the run is then treated
/// as a normal exit.
fn wait_status(
    outcome: Option<Result<ContainerWaitResponse, BollardError>>,
) -> Result<i64, InvokeError> {
    match outcome {
        Some(Ok(response)) => Ok(response.status_code),
        Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
        Some(Err(BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        })) => {
            debug!(message = %message, "Container already removed when wait started");
            Ok(0)
        }
        Some(Err(e)) => Err(engine_error(e)),
        None => Err(InvokeError::ContainerRuntime(
            "container wait ended without a status".to_string(),
        )),
    }
}

/// Container runtime backed by the local Docker daemon
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using `DOCKER_HOST` or the platform's default socket
    pub fn connect() -> Result<Self, InvokeError> {
        let docker = Docker::connect_with_local_defaults().map_err(engine_error)?;
        Ok(Self { docker })
    }

    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    /// Returns whether the daemon answers a ping
    pub async fn is_available(&self) -> bool {
        match self.docker.ping().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Docker not available");
                false
            }
        }
    }

    async fn force_remove(&self, id: &str) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self.docker.remove_container(id, Some(options)).await {
            debug!(container_id = %id, error = %e, "Container already gone");
        }
    }
}

/// Split the options tree into the typed parts of a create request
fn field<T: DeserializeOwned>(options: &Value, key: &str) -> Result<Option<T>, InvokeError> {
    options
        .get(key)
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| InvokeError::InvalidConfig(format!("invalid container option {key}: {e}")))
}

fn create_config(
    image: &ImageReference,
    cmd: &[String],
    options: &ContainerOptions,
) -> Result<Config<String>, InvokeError> {
    let value = options.as_value();

    let env: Option<Vec<String>> = field(value, "Env")?;
    let host_config: Option<HostConfig> = field(value, "HostConfig")?;
    let exposed_ports = value
        .get("ExposedPorts")
        .and_then(Value::as_object)
        .map(|ports| {
            ports
                .keys()
                .map(|port| (port.clone(), HashMap::new()))
                .collect::<HashMap<_, _>>()
        });

    Ok(Config {
        image: Some(image.to_string()),
        cmd: Some(cmd.to_vec()),
        env,
        exposed_ports,
        host_config,
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(false),
        ..Default::default()
    })
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_images(&self, reference: &str) -> Result<Vec<String>, InvokeError> {
        let mut filters = HashMap::new();
        filters.insert("reference".to_string(), vec![reference.to_string()]);

        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                filters,
                ..Default::default()
            }))
            .await
            .map_err(engine_error)?;

        debug!(reference = %reference, count = images.len(), "Listed local images");
        Ok(images.into_iter().map(|image| image.id).collect())
    }

    async fn pull_image(
        &self,
        image: &ImageReference,
        progress: mpsc::UnboundedSender<PullProgress>,
    ) -> Result<(), InvokeError> {
        let pull_error = |message: String| InvokeError::ImagePull {
            image: image.to_string(),
            message,
        };

        let options = CreateImageOptions {
            from_image: image.name(),
            tag: image.tag(),
            ..Default::default()
        };

        let mut stream = Box::pin(self.docker.create_image(Some(options), None, None));
        while let Some(item) = stream.next().await {
            let info = item.map_err(|e| pull_error(e.to_string()))?;
            if let Some(error) = info.error {
                return Err(pull_error(error));
            }

            // The receiver may have gone away; the pull still runs to completion.
            let _ = progress.send(PullProgress {
                id: info.id,
                status: info.status,
                progress: info.progress,
            });
        }

        Ok(())
    }

    async fn run_container(
        &self,
        name: &str,
        image: &ImageReference,
        cmd: &[String],
        stdout: OutputSink<'_>,
        options: &ContainerOptions,
    ) -> Result<i64, InvokeError> {
        let config = create_config(image, cmd, options)?;

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.to_string(),
                    ..Default::default()
                }),
                config,
            )
            .await
            .map_err(engine_error)?;

        for warning in &created.warnings {
            warn!(container = %name, warning = %warning, "Container created with warning");
        }

        let AttachContainerResults { mut output, .. } = self
            .docker
            .attach_container(
                &created.id,
                Some(AttachContainerOptions::<String> {
                    stdout: Some(true),
                    stderr: Some(true),
                    stream: Some(true),
                    ..Default::default()
                }),
            )
            .await
            .map_err(engine_error)?;

        // Spawned before start: with auto-remove the exit status is only
        // observable until the engine deletes the container.
        let wait = {
            let docker = self.docker.clone();
            let id = created.id.clone();
            tokio::spawn(async move {
                let mut stream = Box::pin(
                    docker.wait_container(&id, Some(WaitContainerOptions { condition: "removed" })),
                );
                stream.next().await
            })
        };

        if let Err(e) = self
            .docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
        {
            // Auto-remove only applies once a container has run.
            wait.abort();
            self.force_remove(&created.id).await;
            return Err(engine_error(e));
        }

        info!(container = %name, image = %image, "Started function container");

        let pump = async {
            let mut stderr = tokio::io::stderr();
            while let Some(chunk) = output.next().await {
                match chunk.map_err(engine_error)? {
                    LogOutput::StdOut { message } | LogOutput::Console { message } => {
                        stdout.write_all(&message).await?;
                    }
                    LogOutput::StdErr { message } => stderr.write_all(&message).await?,
                    LogOutput::StdIn { .. } => {}
                }
            }
            stdout.flush().await?;
            Ok::<_, InvokeError>(())
        };

        tokio::select! {
            pumped = pump => pumped?,
            _ = tokio::signal::ctrl_c() => {
                warn!(container = %name, "Interrupted, removing function container");
                self.force_remove(&created.id).await;
                wait.abort();
                return Err(InvokeError::Interrupted);
            }
        }

        let status = wait.await.map_err(|e| {
            InvokeError::ContainerRuntime(format!("container wait task failed: {e}"))
        })?;
        let status = wait_status(status)?;

        debug!(container = %name, status, "Function container exited");
        Ok(status)
    }
}
