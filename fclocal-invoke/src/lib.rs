//! Local function invocation for fclocal
//!
//! Runs a function inside a container built from its runtime's image, with the
//! code mounted read-only and output streamed back to the caller.

pub mod debug;
pub mod docker;
pub mod env;
pub mod image;
pub mod invocation;
pub mod mount;
pub mod options;
pub mod runtime;

pub use debug::{DebugConfigGenerator, VscodeDebugGenerator};
pub use docker::DockerRuntime;
pub use image::{find_image, ImageManager, ImageReference, PullPolicy};
pub use invocation::{build_command, InvokeRequest, InvokeSettings, Invoker};
pub use mount::{resolve_mount, Mount, MountKind, CODE_DIR};
pub use options::{build_options, merge, ContainerOptions};
pub use runtime::{ContainerRuntime, OutputSink, PullProgress};
