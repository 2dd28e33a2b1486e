//! In-memory container runtime

use async_trait::async_trait;
use fclocal_core::InvokeError;
use fclocal_invoke::{ContainerOptions, ContainerRuntime, ImageReference, OutputSink, PullProgress};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::debug;

/// A container run observed by [`FakeRuntime`]
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    pub options: ContainerOptions,
}

/// Calls made against [`FakeRuntime`], in order
#[derive(Debug, Clone)]
pub enum RuntimeCall {
    ListImages(String),
    PullImage(String),
    RunContainer(RunRecord),
}

/// Container runtime double that records every call
///
/// Pulled images become present locally, so a second invocation with the
/// default pull policy skips the pull.
pub struct FakeRuntime {
    images: Mutex<HashSet<String>>,
    calls: Mutex<Vec<RuntimeCall>>,
    pull_failure: Option<String>,
    pull_delay: Option<Duration>,
    progress_events: usize,
    exit_status: i64,
    output: Vec<u8>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            images: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            pull_failure: None,
            pull_delay: None,
            progress_events: 3,
            exit_status: 0,
            output: Vec::new(),
        }
    }

    /// Mark `reference` as already present locally
    pub fn with_image(self, reference: impl Into<String>) -> Self {
        self.images.lock().insert(reference.into());
        self
    }

    /// Make every pull fail with `message`
    pub fn failing_pull(mut self, message: impl Into<String>) -> Self {
        self.pull_failure = Some(message.into());
        self
    }

    /// Make every pull take `delay` before reporting progress
    pub fn slow_pull(mut self, delay: Duration) -> Self {
        self.pull_delay = Some(delay);
        self
    }

    pub fn with_progress_events(mut self, count: usize) -> Self {
        self.progress_events = count;
        self
    }

    /// Exit status reported for every container
    pub fn exiting_with(mut self, status: i64) -> Self {
        self.exit_status = status;
        self
    }

    /// Bytes every container writes to stdout
    pub fn printing(mut self, output: impl Into<Vec<u8>>) -> Self {
        self.output = output.into();
        self
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().clone()
    }

    pub fn pull_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, RuntimeCall::PullImage(_)))
            .count()
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RuntimeCall::RunContainer(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: RuntimeCall) {
        debug!(call = ?call, "Fake runtime call");
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_images(&self, reference: &str) -> Result<Vec<String>, InvokeError> {
        self.record(RuntimeCall::ListImages(reference.to_string()));

        let images = self.images.lock();
        Ok(images
            .iter()
            .filter(|image| image.as_str() == reference)
            .map(|image| format!("sha256:{image}"))
            .collect())
    }

    async fn pull_image(
        &self,
        image: &ImageReference,
        progress: mpsc::UnboundedSender<PullProgress>,
    ) -> Result<(), InvokeError> {
        self.record(RuntimeCall::PullImage(image.to_string()));

        if let Some(message) = &self.pull_failure {
            return Err(InvokeError::ImagePull {
                image: image.to_string(),
                message: message.clone(),
            });
        }

        if let Some(delay) = self.pull_delay {
            tokio::time::sleep(delay).await;
        }

        for layer in 0..self.progress_events {
            let _ = progress.send(PullProgress {
                id: Some(format!("layer{layer}")),
                status: Some("Downloading".to_string()),
                progress: None,
            });
        }

        self.images.lock().insert(image.to_string());
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
        self.record(RuntimeCall::RunContainer(RunRecord {
            name: name.to_string(),
            image: image.to_string(),
            cmd: cmd.to_vec(),
            options: options.clone(),
        }));

        stdout.write_all(&self.output).await?;
        stdout.flush().await?;
        Ok(self.exit_status)
    }
}
