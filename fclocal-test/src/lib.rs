//! Test utilities for fclocal
//!
//! Provides doubles and fixtures for driving the invocation engine without a
//! container engine:
//! - [`FakeRuntime`], a recording in-memory container runtime
//! - code directory fixtures
//! - tracing setup for test output
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fclocal_core::{FunctionSpec, StaticCredentials};
//! use fclocal_invoke::{InvokeRequest, InvokeSettings, Invoker, VscodeDebugGenerator};
//! use fclocal_test::{code_dir, FakeRuntime};
//!
//! #[tokio::test]
//! async fn test_invoke() {
//!     let code = code_dir();
//!     let runtime = Arc::new(FakeRuntime::new());
//!     let invoker = Invoker::new(
//!         runtime.clone(),
//!         Arc::new(StaticCredentials::new("id", "secret")),
//!         Arc::new(VscodeDebugGenerator::default()),
//!         InvokeSettings::default(),
//!     );
//!
//!     let spec = FunctionSpec::new("nodejs8", "index.handler", code.path());
//!     let mut out: Vec<u8> = Vec::new();
//!     invoker
//!         .invoke(&InvokeRequest::new("svc", "fn", &spec), &mut out)
//!         .await
//!         .unwrap();
//!     assert_eq!(runtime.runs().len(), 1);
//! }
//! ```

pub mod runtime;

pub use runtime::{FakeRuntime, RunRecord, RuntimeCall};

use tempfile::TempDir;

/// Credentials handed out by test providers
pub const TEST_ACCESS_KEY_ID: &str = "test-key-id";
pub const TEST_ACCESS_KEY_SECRET: &str = "test-key-secret";

/// Temporary function code directory containing an `index.js`
pub fn code_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create code directory");
    std::fs::write(
        dir.path().join("index.js"),
        "exports.handler = (event, context, callback) => callback(null, 'hello world');\n",
    )
    .expect("Failed to write index.js");
    dir
}

/// Install a test subscriber once; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fclocal=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
