//! Runtime images: lookup and local availability

use crate::runtime::{ContainerRuntime, OutputSink, PullProgress};
use fclocal_core::{InvokeError, Runtime};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Registry namespace of the runtime images
pub const IMAGE_PREFIX: &str = "aliyunfc";

/// Tag shared by every runtime image
pub const IMAGE_TAG: &str = "1.1.0";

/// Default upper bound for a single image pull
pub const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_secs(600);

/// Fully-qualified image name and tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    name: String,
    tag: String,
}

impl ImageReference {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
        }
    }

    /// Image used to emulate `runtime`
    pub fn for_runtime(runtime: Runtime) -> Self {
        Self::new(
            format!("{IMAGE_PREFIX}/runtime-{}", runtime.image_name()),
            IMAGE_TAG,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// Map a runtime identifier to its image; `None` for unsupported runtimes
pub fn find_image(runtime: &str) -> Option<ImageReference> {
    let image = Runtime::from_str(runtime).map(ImageReference::for_runtime);
    debug!(
        runtime = %runtime,
        image = ?image.as_ref().map(ToString::to_string),
        "Resolved runtime image"
    );
    image
}

/// When to fetch the runtime image from the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullPolicy {
    /// Pull only when the image is absent locally
    #[default]
    IfMissing,
    /// Pull before every invocation
    Always,
}

impl PullPolicy {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "if-missing" | "ifmissing" | "missing" => Some(Self::IfMissing),
            "always" | "latest" => Some(Self::Always),
            _ => None,
        }
    }
}

/// Ensures runtime images are present before a container is started
pub struct ImageManager {
    runtime: Arc<dyn ContainerRuntime>,
    policy: PullPolicy,
    pull_timeout: Duration,
}

impl ImageManager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        policy: PullPolicy,
        pull_timeout: Duration,
    ) -> Self {
        Self {
            runtime,
            policy,
            pull_timeout,
        }
    }

    pub async fn image_exists(&self, image: &ImageReference) -> Result<bool, InvokeError> {
        let images = self.runtime.list_images(&image.to_string()).await?;
        Ok(!images.is_empty())
    }

    /// Pull `image` if it is missing or the policy asks for a refresh
    pub async fn ensure_image(
        &self,
        image: &ImageReference,
        out: OutputSink<'_>,
    ) -> Result<(), InvokeError> {
        let exists = self.image_exists(image).await?;

        if exists && self.policy == PullPolicy::IfMissing {
            info!(image = %image, "skip pulling image");
            return Ok(());
        }

        self.pull(image, out).await
    }

    async fn pull(&self, image: &ImageReference, out: OutputSink<'_>) -> Result<(), InvokeError> {
        info!(image = %image, policy = ?self.policy, "Pulling runtime image");
        let pull_error = |message: String| InvokeError::ImagePull {
            image: image.to_string(),
            message,
        };
        let output_error =
            |e: std::io::Error| pull_error(format!("failed to report progress: {e}"));

        write_progress(out, format!("begin pulling image {image}").as_bytes())
            .await
            .map_err(output_error)?;

        let (tx, mut rx) = mpsc::unbounded_channel::<PullProgress>();
        let pull = self.runtime.pull_image(image, tx);
        let report = async {
            while let Some(event) = rx.recv().await {
                debug!(
                    image = %image,
                    id = ?event.id,
                    status = ?event.status,
                    progress = ?event.progress,
                    "Pull progress"
                );
                write_progress(&mut *out, b".").await?;
            }
            Ok::<_, std::io::Error>(())
        };

        let outcome =
            tokio::time::timeout(self.pull_timeout, async { tokio::join!(pull, report) }).await;

        let (pulled, reported) = outcome
            .map_err(|_| pull_error(format!("timed out after {:?}", self.pull_timeout)))?;

        pulled.map_err(|e| match e {
            e @ InvokeError::ImagePull { .. } => e,
            other => pull_error(other.to_string()),
        })?;
        reported.map_err(output_error)?;

        write_progress(out, b"\npull image finished\n")
            .await
            .map_err(output_error)?;
        info!(image = %image, "Pulled runtime image");
        Ok(())
    }
}

async fn write_progress(out: OutputSink<'_>, bytes: &[u8]) -> std::io::Result<()> {
    out.write_all(bytes).await?;
    out.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_image() {
        assert_eq!(
            find_image("nodejs8").unwrap().to_string(),
            "aliyunfc/runtime-nodejs8:1.1.0"
        );
        assert_eq!(
            find_image("python3").unwrap().to_string(),
            "aliyunfc/runtime-python3.6:1.1.0"
        );
        assert_eq!(
            find_image("php7.2").unwrap().name(),
            "aliyunfc/runtime-php7.2"
        );
    }

    #[test]
    fn test_find_image_total_over_supported() {
        for runtime in Runtime::ALL {
            let image = find_image(runtime.as_str()).unwrap();
            assert!(image.name().starts_with("aliyunfc/runtime-"));
            assert_eq!(image.tag(), IMAGE_TAG);
        }
    }

    #[test]
    fn test_find_image_unknown() {
        assert!(find_image("go1").is_none());
        assert!(find_image("python3.6").is_none());
        assert!(find_image("").is_none());
    }

    #[test]
    fn test_pull_policy_from_str() {
        assert_eq!(PullPolicy::from_str("always"), Some(PullPolicy::Always));
        assert_eq!(PullPolicy::from_str("If-Missing"), Some(PullPolicy::IfMissing));
        assert_eq!(PullPolicy::from_str("never"), None);
        assert_eq!(PullPolicy::default(), PullPolicy::IfMissing);
    }
}
