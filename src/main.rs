//! # PDF Inbox CLI (`inbox`)
//!
//! ## Usage
//!
//! ```bash
//! inbox --config ./config/inbox.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `inbox watch` | Watch the configured directory and process new PDFs until Ctrl-C |
//! | `inbox process <PDF>...` | Process the given files once |
//! | `inbox models` | List the models installed on the inference host |
//!
//! `--pipeline tasks|images` overrides `pipeline.kind` from the config file.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

use pdf_inbox::config;
use pdf_inbox::inference::OllamaClient;
use pdf_inbox::ingest;
use pdf_inbox::models::PipelineKind;

/// Watches a folder for PDFs and logs what a local model makes of them.
#[derive(Parser)]
#[command(
    name = "inbox",
    about = "Watch a folder for PDFs and log model summaries to CSV",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/inbox.toml")]
    config: PathBuf,

    /// Pipeline to run, overriding `pipeline.kind`.
    #[arg(long, global = true, value_enum)]
    pipeline: Option<PipelineKind>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the inbox directory until interrupted.
    ///
    /// Each new PDF is processed once; documents already in the log are
    /// skipped.
    Watch,

    /// Process the given PDF files once and exit.
    Process {
        /// PDF files to process.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List the models available on the inference host.
    Models,
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = config::load_config(&cli.config)?;
    if let Some(kind) = cli.pipeline {
        cfg.pipeline.kind = kind;
    }

    match cli.command {
        Commands::Watch => ingest::run_watch(&cfg).await?,
        Commands::Process { paths } => ingest::run_process(&cfg, &paths).await?,
        Commands::Models => {
            let client = OllamaClient::new(&cfg.inference, &cfg.pipeline)?;
            for name in client.list_models().await? {
                let marker = if name == client.model() { " (configured)" } else { "" };
                println!("{}{}", name, marker);
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
