//! fclocal - run serverless functions locally
//!
//! Invokes functions declared in a template inside containers built from the
//! matching runtime image, with optional debugger attachment.

mod config;

use clap::{Parser, Subcommand, ValueEnum};
use fclocal_core::template::DEFAULT_TEMPLATE;
use fclocal_core::{ErrorCode, InvokeError, Template};
use fclocal_invoke::{
    DockerRuntime, InvokeRequest, InvokeSettings, Invoker, PullPolicy, VscodeDebugGenerator,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, ConfigCredentialProvider};

#[derive(Parser, Debug)]
#[command(name = "fclocal")]
#[command(about = "Run serverless functions locally in containers", long_about = None)]
struct Args {
    /// Configuration file (defaults to ./fclocal.toml when present)
    #[arg(long, global = true, env = "FCLOCAL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "FCLOCAL_LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Invoke a function once in a local container
    Invoke(InvokeArgs),
}

#[derive(clap::Args, Debug)]
struct InvokeArgs {
    /// Function to invoke, as `service/function` or `function`
    function: String,

    /// Template declaring the function
    #[arg(short, long, default_value = DEFAULT_TEMPLATE, env = "FCLOCAL_TEMPLATE")]
    template: PathBuf,

    /// Event payload file, or `-` to read it from stdin
    #[arg(short, long)]
    event: Option<String>,

    /// Start the function runtime in debug mode listening on this port
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    debug_port: Option<u16>,

    /// Print an attach configuration for this debugger
    #[arg(short = 'c', long, value_enum)]
    debugger: Option<Debugger>,

    /// Image pull policy, overriding the configuration file
    #[arg(long, value_parser = parse_pull_policy)]
    pull: Option<PullPolicy>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Debugger {
    Vscode,
}

fn parse_pull_policy(s: &str) -> Result<PullPolicy, String> {
    PullPolicy::from_str(s)
        .ok_or_else(|| format!("unknown pull policy '{s}' (expected if-missing or always)"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout belongs to the function.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("fclocal={}", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load(args.config.as_deref())?;

    match args.command {
        Command::Invoke(invoke_args) => {
            if let Err(err) = invoke(invoke_args, &config).await {
                let code = err.code();
                error!(code = %code, "{err}");
                eprintln!("{code}: {err}");
                std::process::exit(code.exit_code());
            }
        }
    }

    Ok(())
}

async fn read_event(source: &str) -> Result<String, InvokeError> {
    if source == "-" {
        let mut event = String::new();
        tokio::io::stdin().read_to_string(&mut event).await?;
        return Ok(event);
    }

    tokio::fs::read_to_string(source)
        .await
        .map_err(|e| InvokeError::InvalidConfig(format!("failed to read event {source}: {e}")))
}

async fn invoke(args: InvokeArgs, config: &Config) -> Result<(), InvokeError> {
    let template = Template::load(&args.template)?;
    let function = template.find_function(&args.function)?;

    let event = match &args.event {
        Some(source) => Some(read_event(source).await?),
        None => None,
    };

    let settings = InvokeSettings {
        pull_policy: args.pull.unwrap_or(config.docker.pull_policy),
        pull_timeout: Duration::from_secs(config.docker.pull_timeout_secs),
    };

    info!(
        service = %function.service_name,
        function = %function.function_name,
        pull_policy = ?settings.pull_policy,
        "Starting local invocation"
    );

    let runtime = Arc::new(DockerRuntime::connect()?);
    let invoker = Invoker::new(
        runtime.clone(),
        Arc::new(ConfigCredentialProvider::new(&config.credentials)),
        Arc::new(VscodeDebugGenerator::new(&config.debug.php_remote_host)),
        settings,
    );

    let request = InvokeRequest {
        debug_port: args.debug_port,
        event: event.as_deref(),
        debugger_config: args.debugger.is_some(),
        ..InvokeRequest::new(&function.service_name, &function.function_name, &function.spec)
    };

    let mut stdout = tokio::io::stdout();
    let result = invoker.invoke(&request, &mut stdout).await;

    if let Err(err) = &result {
        if err.code() == ErrorCode::ContainerRuntime && !runtime.is_available().await {
            error!("Docker daemon is not reachable; is Docker running?");
        }
    }

    result
}
