//! exseek - Main Entry Point

use clap::Parser;
use exseek::cli::{cmd_evaluate, cmd_predict, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "exseek=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate(args) => cmd_evaluate(&args)?,
        Commands::Predict { model, matrix, output } => cmd_predict(&model, &matrix, &output)?,
    }

    Ok(())
}
