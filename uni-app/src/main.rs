//! unillm command-line entry point.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use uni_llm::{GenerationOptions, LlmClient};

#[derive(Debug, Parser)]
#[command(name = "unillm", version, about = "One chat call across several LLM providers")]
struct Cli {
    /// Config file (default: ~/.unillm/config.toml).
    #[arg(long, global = true, env = "UNILLM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List providers and whether each has an API key.
    Status,
    /// Send one prompt and print the answer.
    Ask {
        prompt: String,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        system: Option<String>,
        #[arg(long)]
        max_tokens: Option<u32>,
        #[arg(long)]
        temperature: Option<f64>,
        /// Print the answer as it arrives.
        #[arg(long)]
        stream: bool,
    },
    /// Send one prompt to every configured provider.
    Compare { prompt: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(anyhow::anyhow!("load .env: {e}"));
        }
    }
    init_tracing()?;

    let cli = Cli::parse();
    let cfg = config::UniConfig::load(cli.config).await?;
    let registry = cfg.build_registry()?.install()?;
    tracing::info!(
        default_provider = %registry.default_provider(),
        providers = registry.provider_ids().count(),
        "config loaded"
    );

    let client = LlmClient::new(registry);
    let mut stdout = std::io::stdout();

    match cli.command {
        Command::Status => commands::status(registry, &mut stdout),
        Command::Ask {
            prompt,
            provider,
            system,
            max_tokens,
            temperature,
            stream,
        } => {
            let options = GenerationOptions {
                max_tokens,
                temperature,
                stream,
            };
            let args = commands::AskArgs {
                prompt: &prompt,
                provider: provider.as_deref(),
                system: system.as_deref(),
                options,
            };
            commands::ask(&client, args, &mut stdout).await
        }
        Command::Compare { prompt } => commands::compare(&client, &prompt, &mut stdout).await,
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(v) => v,
        Err(_) => EnvFilter::new("warn,unillm=info,uni_app=info,uni_llm=info"),
    };
    let log_format = std::env::var("UNILLM_LOG_FORMAT")
        .unwrap_or_else(|_| "compact".to_string())
        .to_ascii_lowercase();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true);

    match log_format.as_str() {
        "json" => builder
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
            .init(),
        "pretty" => builder.pretty().init(),
        "compact" => builder.compact().init(),
        other => {
            return Err(anyhow::anyhow!(
                "unsupported UNILLM_LOG_FORMAT={other:?}; expected one of: json, pretty, compact"
            ));
        }
    }

    tracing::debug!(log_format = %log_format, "tracing initialized");
    Ok(())
}
