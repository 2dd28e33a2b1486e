//! Integration tests for local invocation
//!
//! These tests drive the invoker end to end against the recording runtime
//! from `fclocal-test`, so no container engine is needed.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use fclocal_core::{
    CredentialProvider, Credentials, ErrorCode, FunctionSpec, InvokeError, StaticCredentials,
};
use fclocal_invoke::invocation::{CONFIG_BEGIN, CONFIG_END};
use fclocal_invoke::{
    ContainerRuntime, ImageManager, InvokeRequest, InvokeSettings, Invoker, PullPolicy,
    VscodeDebugGenerator,
};
use fclocal_test::{
    code_dir, init_tracing, FakeRuntime, RuntimeCall, TEST_ACCESS_KEY_ID, TEST_ACCESS_KEY_SECRET,
};
use tokio::io::AsyncWrite;

const NODEJS8_IMAGE: &str = "aliyunfc/runtime-nodejs8:1.1.0";

fn invoker(runtime: Arc<FakeRuntime>, settings: InvokeSettings) -> Invoker {
    Invoker::new(
        runtime,
        Arc::new(StaticCredentials::new(
            TEST_ACCESS_KEY_ID,
            TEST_ACCESS_KEY_SECRET,
        )),
        Arc::new(VscodeDebugGenerator::default()),
        settings,
    )
}

struct FailingCredentials;

/// Output whose reader has gone away
struct ClosedOutput;

impl AsyncWrite for ClosedOutput {
    fn poll_write(
        self: Pin<&mut Self>,
        _: &mut Context<'_>,
        _: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl CredentialProvider for FailingCredentials {
    async fn credentials(&self) -> Result<Credentials, InvokeError> {
        Err(InvokeError::Credentials("no profile configured".to_string()))
    }
}

#[tokio::test]
async fn test_invoke_nodejs8_directory() {
    init_tracing();
    let code = code_dir();
    let runtime = Arc::new(FakeRuntime::new().printing("hello world\n"));
    let invoker = invoker(runtime.clone(), InvokeSettings::default());

    let spec = FunctionSpec::new("nodejs8", "index.handler", code.path());
    let mut out: Vec<u8> = Vec::new();
    invoker
        .invoke(&InvokeRequest::new("localdemo", "hello", &spec), &mut out)
        .await
        .unwrap();

    let runs = runtime.runs();
    assert_eq!(runs.len(), 1);

    let run = &runs[0];
    assert_eq!(run.image, NODEJS8_IMAGE);
    assert_eq!(run.cmd, vec!["-h", "index.handler"]);
    assert!(run.name.starts_with("fclocal-localdemo-hello-"));
    assert!(run.options.auto_remove());

    let mounts = run.options.mounts();
    assert_eq!(mounts.len(), 1);
    assert_eq!(mounts[0]["Type"], "bind");
    assert_eq!(mounts[0]["Target"], "/code");
    assert_eq!(mounts[0]["ReadOnly"], true);
    assert_eq!(mounts[0]["Source"], code.path().to_str().unwrap());

    assert_eq!(
        run.options.env(),
        vec![
            "local=true",
            "FC_ACCESS_KEY_ID=test-key-id",
            "FC_ACCESS_KEY_SECRET=test-key-secret",
        ]
    );

    let printed = String::from_utf8(out).unwrap();
    assert!(printed.ends_with("hello world\n"));
}

#[tokio::test]
async fn test_unsupported_runtime_aborts_early() {
    let runtime = Arc::new(FakeRuntime::new());
    let invoker = invoker(runtime.clone(), InvokeSettings::default());

    // The code location does not exist either; the runtime check must come first.
    let spec = FunctionSpec::new("go1", "main", "/definitely/missing/code");
    let mut out: Vec<u8> = Vec::new();
    let err = invoker
        .invoke(&InvokeRequest::new("svc", "fn", &spec), &mut out)
        .await
        .unwrap_err();

    assert!(matches!(err, InvokeError::UnknownRuntime(ref r) if r == "go1"));
    assert_eq!(err.code(), ErrorCode::Configuration);
    assert!(runtime.calls().is_empty());
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_missing_code_location() {
    let runtime = Arc::new(FakeRuntime::new());
    let invoker = invoker(runtime.clone(), InvokeSettings::default());

    let spec = FunctionSpec::new("python3", "index.handler", "/definitely/missing/code");
    let mut out: Vec<u8> = Vec::new();
    let err = invoker
        .invoke(&InvokeRequest::new("svc", "fn", &spec), &mut out)
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::PathNotFound);
    assert!(runtime.calls().is_empty());
}

#[tokio::test]
async fn test_credentials_failure_before_container_work() {
    let code = code_dir();
    let runtime = Arc::new(FakeRuntime::new());
    let invoker = Invoker::new(
        runtime.clone(),
        Arc::new(FailingCredentials),
        Arc::new(VscodeDebugGenerator::default()),
        InvokeSettings::default(),
    );

    let spec = FunctionSpec::new("nodejs8", "index.handler", code.path());
    let mut out: Vec<u8> = Vec::new();
    let err = invoker
        .invoke(&InvokeRequest::new("svc", "fn", &spec), &mut out)
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::Credentials);
    assert!(runtime.calls().is_empty());
}

#[tokio::test]
async fn test_present_image_is_not_pulled() {
    let code = code_dir();
    let runtime = Arc::new(FakeRuntime::new().with_image(NODEJS8_IMAGE));
    let invoker = invoker(runtime.clone(), InvokeSettings::default());

    let spec = FunctionSpec::new("nodejs8", "index.handler", code.path());
    let mut out: Vec<u8> = Vec::new();
    invoker
        .invoke(&InvokeRequest::new("svc", "fn", &spec), &mut out)
        .await
        .unwrap();

    assert_eq!(runtime.pull_count(), 0);
    assert!(matches!(
        &runtime.calls()[0],
        RuntimeCall::ListImages(reference) if reference == NODEJS8_IMAGE
    ));
}

#[tokio::test]
async fn test_missing_image_is_pulled_once() {
    let code = code_dir();
    let runtime = Arc::new(FakeRuntime::new().with_progress_events(4));
    let invoker = invoker(runtime.clone(), InvokeSettings::default());

    let spec = FunctionSpec::new("nodejs8", "index.handler", code.path());
    let mut out: Vec<u8> = Vec::new();
    invoker
        .invoke(&InvokeRequest::new("svc", "fn", &spec), &mut out)
        .await
        .unwrap();
    assert_eq!(runtime.pull_count(), 1);

    let printed = String::from_utf8(out).unwrap();
    assert!(printed.starts_with(&format!("begin pulling image {NODEJS8_IMAGE}....")));
    assert!(printed.contains("pull image finished"));

    // Now cached locally
    let mut out: Vec<u8> = Vec::new();
    invoker
        .invoke(&InvokeRequest::new("svc", "fn", &spec), &mut out)
        .await
        .unwrap();
    assert_eq!(runtime.pull_count(), 1);
    assert_eq!(runtime.runs().len(), 2);
}

#[tokio::test]
async fn test_always_policy_pulls_present_image() {
    let runtime = Arc::new(FakeRuntime::new().with_image(NODEJS8_IMAGE));
    let images = ImageManager::new(
        runtime.clone() as Arc<dyn ContainerRuntime>,
        PullPolicy::Always,
        Duration::from_secs(5),
    );

    let image = fclocal_invoke::find_image("nodejs8").unwrap();
    let mut out: Vec<u8> = Vec::new();
    images.ensure_image(&image, &mut out).await.unwrap();

    assert_eq!(runtime.pull_count(), 1);
}

#[tokio::test]
async fn test_pull_failure_is_fatal() {
    let code = code_dir();
    let runtime = Arc::new(FakeRuntime::new().failing_pull("manifest unknown"));
    let invoker = invoker(runtime.clone(), InvokeSettings::default());

    let spec = FunctionSpec::new("nodejs8", "index.handler", code.path());
    let mut out: Vec<u8> = Vec::new();
    let err = invoker
        .invoke(&InvokeRequest::new("svc", "fn", &spec), &mut out)
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::ImagePull);
    assert!(err.to_string().contains("manifest unknown"));
    assert!(runtime.runs().is_empty());
}

#[tokio::test]
async fn test_pull_timeout() {
    let code = code_dir();
    let runtime = Arc::new(FakeRuntime::new().slow_pull(Duration::from_secs(30)));
    let invoker = invoker(
        runtime.clone(),
        InvokeSettings {
            pull_timeout: Duration::from_millis(50),
            ..InvokeSettings::default()
        },
    );

    let spec = FunctionSpec::new("nodejs8", "index.handler", code.path());
    let mut out: Vec<u8> = Vec::new();
    let err = invoker
        .invoke(&InvokeRequest::new("svc", "fn", &spec), &mut out)
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::ImagePull);
    assert!(err.to_string().contains("timed out after 50ms"));
    assert_eq!(runtime.pull_count(), 1);
    assert!(runtime.runs().is_empty());
}

#[tokio::test]
async fn test_progress_write_failure_is_pull_error() {
    let runtime = Arc::new(FakeRuntime::new());
    let images = ImageManager::new(
        runtime.clone() as Arc<dyn ContainerRuntime>,
        PullPolicy::IfMissing,
        Duration::from_secs(5),
    );

    let image = fclocal_invoke::find_image("nodejs8").unwrap();
    let err = images
        .ensure_image(&image, &mut ClosedOutput)
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::ImagePull);
}

#[tokio::test]
async fn test_debug_session() {
    let code = code_dir();
    let runtime = Arc::new(FakeRuntime::new().with_image(NODEJS8_IMAGE));
    let invoker = invoker(runtime.clone(), InvokeSettings::default());

    let spec = FunctionSpec::new("nodejs8", "index.handler", code.path());
    let request = InvokeRequest {
        debug_port: Some(9229),
        debugger_config: true,
        event: Some(r#"{"key":"value"}"#),
        ..InvokeRequest::new("localdemo", "hello", &spec)
    };

    let mut out: Vec<u8> = Vec::new();
    invoker.invoke(&request, &mut out).await.unwrap();

    let printed = String::from_utf8(out).unwrap();
    let begin = printed.find(CONFIG_BEGIN).unwrap() + CONFIG_BEGIN.len();
    let end = printed.find(CONFIG_END).unwrap();
    let config: serde_json::Value = serde_json::from_str(&printed[begin..end]).unwrap();
    let entry = &config["configurations"][0];
    assert_eq!(entry["name"], "fc/localdemo/hello");
    assert_eq!(entry["port"], 9229);
    assert_eq!(entry["localRoot"], code.path().to_str().unwrap());

    let run = &runtime.runs()[0];
    assert_eq!(
        run.cmd,
        vec!["-h", "index.handler", "--event", r#"{"key":"value"}"#]
    );
    assert_eq!(
        run.options.env().last().copied(),
        Some("DEBUG_OPTIONS=--inspect-brk=0.0.0.0:9229")
    );

    let value = run.options.as_value();
    assert!(run.options.auto_remove());
    assert_eq!(run.options.mounts().len(), 1);
    assert_eq!(
        value["HostConfig"]["PortBindings"]["9229/tcp"][0]["HostPort"],
        "9229"
    );
}

#[tokio::test]
async fn test_zero_debug_port_is_no_debug_session() {
    let code = code_dir();
    let runtime = Arc::new(FakeRuntime::new().with_image(NODEJS8_IMAGE));
    let invoker = invoker(runtime.clone(), InvokeSettings::default());

    let spec = FunctionSpec::new("nodejs8", "index.handler", code.path());
    let request = InvokeRequest {
        debug_port: Some(0),
        debugger_config: true,
        ..InvokeRequest::new("svc", "fn", &spec)
    };

    let mut out: Vec<u8> = Vec::new();
    invoker.invoke(&request, &mut out).await.unwrap();

    assert!(out.is_empty());

    let run = &runtime.runs()[0];
    assert!(!run
        .options
        .env()
        .iter()
        .any(|var| var.starts_with("DEBUG_OPTIONS=")));

    let value = run.options.as_value();
    assert!(value["ExposedPorts"].is_null());
    assert!(value["HostConfig"]["PortBindings"].is_null());
}

#[tokio::test]
async fn test_empty_event_is_not_passed() {
    let code = code_dir();
    let runtime = Arc::new(FakeRuntime::new().with_image(NODEJS8_IMAGE));
    let invoker = invoker(runtime.clone(), InvokeSettings::default());

    let spec = FunctionSpec::new("nodejs8", "index.handler", code.path());
    let request = InvokeRequest {
        event: Some(""),
        ..InvokeRequest::new("svc", "fn", &spec)
    };

    let mut out: Vec<u8> = Vec::new();
    invoker.invoke(&request, &mut out).await.unwrap();

    assert_eq!(runtime.runs()[0].cmd, vec!["-h", "index.handler"]);
}

#[tokio::test]
async fn test_debug_port_without_config_prints_nothing() {
    let code = code_dir();
    let runtime = Arc::new(FakeRuntime::new().with_image(NODEJS8_IMAGE));
    let invoker = invoker(runtime.clone(), InvokeSettings::default());

    let spec = FunctionSpec::new("nodejs8", "index.handler", code.path());
    let request = InvokeRequest {
        debug_port: Some(9229),
        ..InvokeRequest::new("svc", "fn", &spec)
    };

    let mut out: Vec<u8> = Vec::new();
    invoker.invoke(&request, &mut out).await.unwrap();

    assert!(out.is_empty());
    assert_eq!(runtime.runs().len(), 1);
}

#[tokio::test]
async fn test_file_code_location() {
    let code = code_dir();
    let jar = code.path().join("app.jar");
    std::fs::write(&jar, b"PK").unwrap();

    let runtime = Arc::new(FakeRuntime::new().with_image("aliyunfc/runtime-java8:1.1.0"));
    let invoker = invoker(runtime.clone(), InvokeSettings::default());

    let spec = FunctionSpec::new("java8", "example.App::handleRequest", &jar);
    let mut out: Vec<u8> = Vec::new();
    invoker
        .invoke(&InvokeRequest::new("svc", "java", &spec), &mut out)
        .await
        .unwrap();

    let run = &runtime.runs()[0];
    assert_eq!(run.options.mounts()[0]["Target"], "/code/app.jar");
}

#[tokio::test]
async fn test_nonzero_exit_is_error() {
    let code = code_dir();
    let runtime = Arc::new(
        FakeRuntime::new()
            .with_image(NODEJS8_IMAGE)
            .exiting_with(1),
    );
    let invoker = invoker(runtime.clone(), InvokeSettings::default());

    let spec = FunctionSpec::new("nodejs8", "index.handler", code.path());
    let mut out: Vec<u8> = Vec::new();
    let err = invoker
        .invoke(&InvokeRequest::new("svc", "fn", &spec), &mut out)
        .await
        .unwrap_err();

    assert!(matches!(err, InvokeError::ContainerExit(1)));
    assert_eq!(err.code(), ErrorCode::ContainerRuntime);
}

#[tokio::test]
async fn test_missing_handler_is_configuration_error() {
    let code = code_dir();
    let runtime = Arc::new(FakeRuntime::new());
    let invoker = invoker(runtime.clone(), InvokeSettings::default());

    let spec = FunctionSpec::new("nodejs8", "", code.path());
    let mut out: Vec<u8> = Vec::new();
    let err = invoker
        .invoke(&InvokeRequest::new("svc", "fn", &spec), &mut out)
        .await
        .unwrap_err();

    assert!(matches!(err, InvokeError::MissingProperty("Handler")));
    assert!(runtime.calls().is_empty());
}
