use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use codeshare_core::security::ApiKey;
use codeshare_llm::{CompletionGateway, GatewayConfig, GeminiConfig, GeminiProvider};
use codeshare_sandbox::{SandboxConfig, SandboxExecutor};
use codeshare_server::ServerConfig;
use codeshare_telemetry::{LogFormat, TelemetryConfig};

const API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Collaborative code-editing backend: session relay, sandboxed execution and completions.
#[derive(Debug, Parser)]
#[command(name = "codeshare", version)]
struct Cli {
    #[arg(long, env = "CODESHARE_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "CODESHARE_PORT", default_value_t = 8000)]
    port: u16,

    /// Outbound queue depth per WebSocket connection.
    #[arg(long, env = "CODESHARE_MAX_SEND_QUEUE", default_value_t = 256)]
    max_send_queue: usize,

    #[arg(long, env = "CODESHARE_INTERPRETER", default_value = "python3")]
    interpreter: PathBuf,

    /// Wall-clock limit per execution, in seconds.
    #[arg(long, env = "CODESHARE_EXEC_TIMEOUT_SECS", default_value_t = 5)]
    exec_timeout_secs: u64,

    #[arg(long, env = "CODESHARE_MAX_CONCURRENT_EXECUTIONS", default_value_t = 8)]
    max_concurrent_executions: usize,

    /// Cap on captured stdout and stderr, each.
    #[arg(long, env = "CODESHARE_MAX_OUTPUT_BYTES", default_value_t = 1_000_000)]
    max_output_bytes: usize,

    #[arg(long, env = "CODESHARE_GEMINI_MODEL", default_value = "gemini-flash-latest")]
    gemini_model: String,

    #[arg(
        long,
        env = "CODESHARE_GEMINI_BASE_URL",
        default_value = "https://generativelanguage.googleapis.com"
    )]
    gemini_base_url: String,

    #[arg(long, env = "CODESHARE_COMPLETION_TIMEOUT_SECS", default_value_t = 15)]
    completion_timeout_secs: u64,

    /// Default level; `RUST_LOG` takes precedence.
    #[arg(long, env = "CODESHARE_LOG_LEVEL", default_value = "info")]
    log_level: tracing::Level,

    /// `json` or `pretty`.
    #[arg(long, env = "CODESHARE_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,
}

impl Cli {
    fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            log_level: self.log_level,
            format: self.log_format,
            ..Default::default()
        }
    }

    fn sandbox_config(&self) -> SandboxConfig {
        SandboxConfig {
            interpreter: self.interpreter.clone(),
            timeout: Duration::from_secs(self.exec_timeout_secs),
            max_concurrent: self.max_concurrent_executions,
            max_output_bytes: self.max_output_bytes,
        }
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            max_send_queue: self.max_send_queue,
        }
    }

    fn gateway(&self) -> anyhow::Result<CompletionGateway> {
        let Some(api_key) = ApiKey::from_env(API_KEY_VAR) else {
            tracing::warn!("{API_KEY_VAR} not set, autocomplete will return empty suggestions");
            return Ok(CompletionGateway::disabled());
        };
        let provider = GeminiProvider::new(
            api_key,
            GeminiConfig {
                model: self.gemini_model.clone(),
                base_url: self.gemini_base_url.clone(),
            },
        )
        .context("failed to build completion provider")?;
        tracing::info!(model = %self.gemini_model, "completion provider configured");

        Ok(CompletionGateway::new(
            Arc::new(provider),
            GatewayConfig {
                request_timeout: Duration::from_secs(self.completion_timeout_secs),
                ..Default::default()
            },
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    codeshare_telemetry::init_telemetry(&cli.telemetry_config())
        .context("failed to initialize logging")?;

    tracing::info!("starting codeshare server");

    let executor = SandboxExecutor::new(cli.sandbox_config());
    let gateway = cli.gateway()?;

    let config = cli.server_config();
    let handle = codeshare_server::start(config, executor, gateway)
        .await
        .with_context(|| format!("failed to bind {}:{}", cli.host, cli.port))?;

    tracing::info!(port = handle.port, "codeshare server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
