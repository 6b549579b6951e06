use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "crossreview", version = crate::VERSION, about = "Run independent code reviews side by side and reconcile their findings")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Review a scope with every configured source and compare the results
    Run(RunArgs),
    /// Compare run reports written by earlier sessions
    Compare(CompareArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
    /// List the analysis dimensions
    Dimensions,
}

#[derive(Args, Clone)]
pub struct RunArgs {
    /// YAML configuration file
    #[arg(short, long, default_value = "crossreview.yaml")]
    pub config: String,

    /// Path to review, relative to the repository root
    #[arg(short, long)]
    pub scope: Option<String>,

    /// Source label to run (repeatable; replaces the configured list)
    #[arg(long = "source")]
    pub sources: Vec<String>,

    /// Engine that settles severity disagreements
    #[arg(long)]
    pub arbitrator: Option<String>,

    /// Output directory for reports
    #[arg(short, long)]
    pub output: Option<String>,

    /// Print the session outcome as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone)]
pub struct CompareArgs {
    /// Run report JSON files (runs/<label>.json)
    #[arg(required = true, num_args = 2..)]
    pub reports: Vec<String>,

    /// Configuration providing the arbitrator engine and isolation settings
    #[arg(short, long)]
    pub config: Option<String>,

    /// Engine that settles severity disagreements
    #[arg(long)]
    pub arbitrator: Option<String>,

    /// Directory for comparison.json and comparison.md
    #[arg(short, long)]
    pub output: Option<String>,

    /// Print the comparison as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Config file to validate
    pub config: String,
}
