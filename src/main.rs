use clap::Parser;
use tracing_subscriber::EnvFilter;

use crossreview::cli::{self, Commands};
use crossreview::errors::ReviewError;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // Initialize logging
    let log_level = match (cli.quiet, cli.verbose) {
        (true, 0) => "warn",
        (_, 0) => "info",
        (_, 1) => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!cli.no_color)
        .with_writer(std::io::stderr)
        .init();

    if cli.no_color {
        console::set_colors_enabled(false);
    }

    let result = match cli.command {
        Commands::Run(args) => cli::run::handle_run(args, cli.quiet).await,
        Commands::Compare(args) => cli::compare::handle_compare(args, cli.quiet).await,
        Commands::Validate(args) => cli::validate::handle_validate(args).await,
        Commands::Dimensions => {
            cli::validate::handle_dimensions();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        let exit_code = match &e {
            ReviewError::Config(_) | ReviewError::Yaml(_) => 2,
            ReviewError::Provisioning(_) => 3,
            ReviewError::AllRunsFailed(_) => 4,
            _ => 1,
        };
        std::process::exit(exit_code);
    }
}
