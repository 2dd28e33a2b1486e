//! Container engine abstraction
//!
//! The invocation engine needs exactly three calls from a container engine:
//! list images by reference, pull an image while streaming progress, and run
//! a container to completion. Any engine offering these can back [`Invoker`].
//!
//! [`Invoker`]: crate::invocation::Invoker

use crate::image::ImageReference;
use crate::options::ContainerOptions;
use async_trait::async_trait;
use fclocal_core::InvokeError;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

/// One progress event emitted while an image is pulled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullProgress {
    pub id: Option<String>,
    pub status: Option<String>,
    pub progress: Option<String>,
}

/// Sink for container stdout
pub type OutputSink<'a> = &'a mut (dyn AsyncWrite + Unpin + Send);

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Ids of local images matching `reference` exactly
    async fn list_images(&self, reference: &str) -> Result<Vec<String>, InvokeError>;

    /// Pull `image`, sending each progress event on `progress`
    ///
    /// Resolves once the pull stream has completed. The sender is dropped on
    /// return, which closes the channel for the consumer.
    async fn pull_image(
        &self,
        image: &ImageReference,
        progress: mpsc::UnboundedSender<PullProgress>,
    ) -> Result<(), InvokeError>;

    /// Create and start a container, stream its stdout into `stdout`, and wait
    /// for it to exit. Returns the exit status.
    async fn run_container(
        &self,
        name: &str,
        image: &ImageReference,
        cmd: &[String],
        stdout: OutputSink<'_>,
        options: &ContainerOptions,
    ) -> Result<i64, InvokeError>;
}
