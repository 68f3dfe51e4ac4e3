//! vasr-enhance - command-line entry point
//!
//! Subcommands:
//! - `run`: enhance one file in-process, print `SUCCESS`/`FAILED`
//! - `wrap`: enhance one file through the external tool with copy fallback
//! - `serve`: long-lived request server
//! - `request`: send one request to a running server
//!
//! Diagnostics go to stderr; stdout carries only machine-readable results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vasr_common::config::{load_toml_config, resolve_device, resolve_threads};
use vasr_common::protocol::ServerRequest;
use vasr_enhance::config::{BackendKind, TomlConfig, DEFAULT_CHUNK_DURATION};
use vasr_enhance::external::{
    probe_python_module, wrapper, CandidateRunner, FallbackLadder, MediaTools, ProcessEnv, Wrapper,
};
use vasr_enhance::{Backend, ChannelDispatcher, RequestServer, ServerClient, ServerContext, WorkerModel};

#[derive(Parser, Debug)]
#[command(name = "vasr-enhance")]
#[command(about = "Audio super-resolution orchestrator")]
#[command(version)]
struct Cli {
    /// TOML config file (default: <config dir>/vasr/vasr.toml)
    #[arg(long, global = true, env = "VASR_CONFIG")]
    config: Option<PathBuf>,

    /// Python interpreter with the enhancement package installed
    #[arg(long, global = true, env = "VASR_PYTHON")]
    python: Option<String>,

    /// Compute device (overrides AUDIO_SR_DEVICE)
    #[arg(long, global = true)]
    device: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Enhance one file with the in-process model
    Run {
        input: PathBuf,
        output: PathBuf,
        /// Segment length in seconds
        chunk_duration: Option<String>,
    },

    /// Enhance one file through the external command-line tool
    Wrap {
        input: PathBuf,
        output: PathBuf,
        /// Single command template using {input} and {output}
        #[arg(long)]
        cmd: Option<String>,
    },

    /// Serve enhancement requests over TCP
    Serve {
        #[arg(long, env = "VASR_HOST")]
        host: Option<String>,

        #[arg(short, long, env = "VASR_PORT")]
        port: Option<u16>,

        /// Copy input to output instead of enhancing
        #[arg(long)]
        always_copy: bool,

        #[arg(long, value_enum, env = "VASR_BACKEND")]
        backend: Option<BackendKind>,

        /// Skip the start-up import check
        #[arg(long)]
        no_warmup: bool,

        /// Maximum requests dispatched at once
        #[arg(long)]
        max_concurrent: Option<usize>,
    },

    /// Send one request to a running server and print the JSON reply
    Request {
        input: String,
        output: String,

        #[arg(long, env = "VASR_HOST")]
        host: Option<String>,

        #[arg(short, long, env = "VASR_PORT")]
        port: Option<u16>,

        /// Give up waiting for the response after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config: TomlConfig = load_toml_config(cli.config.as_deref()).context("Failed to load config")?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "Starting vasr-enhance v{} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let python = cli.python.clone().unwrap_or_else(|| config.model.python.clone());
    let env = ProcessEnv {
        device: resolve_device(cli.device.as_deref(), config.device.as_deref()),
        threads: resolve_threads(config.threads),
    };
    info!(device = %env.device, threads = env.threads, "Runtime environment");

    match cli.command {
        Commands::Run {
            input,
            output,
            chunk_duration,
        } => run_single(config, python, env, input, output, chunk_duration).await,
        Commands::Wrap { input, output, cmd } => run_wrapper(config, python, env, input, output, cmd).await,
        Commands::Serve {
            host,
            port,
            always_copy,
            backend,
            no_warmup,
            max_concurrent,
        } => {
            let options = ServeOptions {
                host: host.unwrap_or_else(|| config.server.host.clone()),
                port: port.unwrap_or(config.server.port),
                always_copy: always_copy || config.server.always_copy,
                backend: backend.unwrap_or(config.server.backend),
                warmup: config.server.warmup && !no_warmup,
                max_concurrent: max_concurrent.or(config.server.max_concurrent),
            };
            serve(config, python, env, options).await
        }
        Commands::Request {
            input,
            output,
            host,
            port,
            timeout,
        } => {
            let addr = format!(
                "{}:{}",
                host.unwrap_or_else(|| config.server.host.clone()),
                port.unwrap_or(config.server.port)
            );
            send_request(addr, input, output, timeout.map(Duration::from_secs)).await
        }
    }
}

// ========================================
// Single-run modes
// ========================================

/// Chunk duration argument; anything unparsable falls back to the default
fn parse_chunk_duration(arg: Option<&str>, configured: f64) -> f64 {
    match arg {
        None => configured,
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() && value > 0.0 => value,
            _ => {
                warn!(value = raw, "Invalid chunk duration, using {}", DEFAULT_CHUNK_DURATION);
                DEFAULT_CHUNK_DURATION
            }
        },
    }
}

async fn run_single(
    config: TomlConfig,
    python: String,
    env: ProcessEnv,
    input: PathBuf,
    output: PathBuf,
    chunk_arg: Option<String>,
) -> Result<ExitCode> {
    if !input.exists() {
        error!(input = %input.display(), "File not found");
        println!("FAILED");
        return Ok(ExitCode::FAILURE);
    }

    let chunk_duration = parse_chunk_duration(chunk_arg.as_deref(), config.chunk_duration());
    let params = config.model.params();
    let model_name = config.model.name.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        let model = WorkerModel::spawn(&python, &model_name, &env.device, env.threads)?;
        let dispatcher = ChannelDispatcher::new(Arc::new(model), params, chunk_duration);
        dispatcher.enhance_file(&input, &output)
    })
    .await
    .context("Enhancement task failed")?;

    match outcome {
        Ok(report) => {
            info!("{}", report);
            println!("SUCCESS");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            if e.is_resource_exhausted() {
                error!(error = %e, "Out of memory; try a shorter chunk duration");
            } else {
                error!(error = %e, "Enhancement failed");
            }
            println!("FAILED");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_wrapper(
    config: TomlConfig,
    python: String,
    env: ProcessEnv,
    input: PathBuf,
    output: PathBuf,
    cmd: Option<String>,
) -> Result<ExitCode> {
    let runner = CandidateRunner::new(config.cli.wrapper_forms(), &python, &config.model.name, env);
    let (timeout, interval) = (config.cli.poll_timeout(), config.cli.poll_interval());

    let code = tokio::task::spawn_blocking(move || match cmd {
        Some(template) => wrapper::run_template(&template, &input, &output, &runner),
        None => Wrapper::new(runner, timeout, interval).run(&input, &output),
    })
    .await
    .context("Wrapper task failed")?;

    info!(code, "Wrapper finished");
    Ok(exit_code(code))
}

// ========================================
// Server
// ========================================

struct ServeOptions {
    host: String,
    port: u16,
    always_copy: bool,
    backend: BackendKind,
    warmup: bool,
    max_concurrent: Option<usize>,
}

async fn serve(config: TomlConfig, python: String, env: ProcessEnv, options: ServeOptions) -> Result<ExitCode> {
    let backend = match options.backend {
        BackendKind::Disabled => Backend::Disabled,
        BackendKind::Model => {
            let (model_name, device, threads) = (config.model.name.clone(), env.device.clone(), env.threads);
            let model = tokio::task::spawn_blocking(move || WorkerModel::spawn(&python, &model_name, &device, threads))
                .await
                .context("Model start-up task failed")?
                .context("Failed to load model")?;
            info!(device = model.device(), "Model backend ready");
            Backend::Model(ChannelDispatcher::new(
                Arc::new(model),
                config.model.params(),
                config.chunk_duration(),
            ))
        }
        BackendKind::Cli => {
            if options.warmup {
                let python = python.clone();
                tokio::task::spawn_blocking(move || probe_python_module(&python, "audiosr"))
                    .await
                    .context("Warm-up task failed")?;
            }
            let runner = CandidateRunner::new(config.cli.server_forms(), &python, &config.model.name, env);
            Backend::Cli(FallbackLadder::new(runner, MediaTools::from_settings(&config.media)))
        }
    };

    let context = ServerContext::new(backend, options.always_copy);
    let server = RequestServer::bind((options.host.as_str(), options.port), context, options.max_concurrent)
        .await
        .with_context(|| format!("Failed to bind {}:{}", options.host, options.port))?;

    server.run_until(shutdown_signal()).await.context("Server error")?;

    info!("Server shutdown complete");
    Ok(ExitCode::SUCCESS)
}

async fn send_request(
    addr: String,
    input: String,
    output: String,
    timeout: Option<Duration>,
) -> Result<ExitCode> {
    let request = ServerRequest::new(input, output);
    let client = match timeout {
        Some(timeout) => ServerClient::new(addr).with_timeout(timeout),
        None => ServerClient::new(addr),
    };
    let response = tokio::task::spawn_blocking(move || client.send(&request))
        .await
        .context("Request task failed")?
        .context("Request failed")?;

    println!("{}", serde_json::to_string(&response)?);
    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
