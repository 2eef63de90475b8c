//! CipherBox - key hierarchy tool

use cipherbox_cli::{run, CliConfig, Command};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "cipherbox")]
#[command(about = "Key hierarchy tool for CipherBox vaults")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "CIPHERBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, env = "CIPHERBOX_DEBUG")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = CliConfig::load(args.config.as_deref())?;

    // Logs go to stderr so stdout stays machine-readable
    let log_level = if args.debug { "debug" } else { config.log.as_str() };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("cipherbox_cli={0},cipherbox_core={0},cipherbox_crypto={0}", log_level)
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!(?config, "configuration loaded");

    let output = run(args.command, &config)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
