mod api;
mod cli;
mod commands;
mod layout;
mod model;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch(args) => commands::fetch::run(args),
        Commands::Rename(args) => commands::rename::run(args),
        Commands::ExportText(args) => commands::export_text::run(args),
        Commands::PdfText(args) => commands::pdf_text::run(args),
        Commands::Status(args) => commands::status::run(args),
        Commands::Versions(args) => commands::versions::run(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
