use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "conflate",
    about = "Conflate candidate addresses against a known address corpus",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log at DEBUG instead of INFO
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Format of the summary printed to stderr
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Conflate an address file and write create/modify features
    Run(RunArgs),
    /// Load a known-address corpus into the database
    Import(ImportArgs),
    /// Print the canonical token string for a street name
    Tokenize(TokenizeArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Line-delimited GeoJSON of candidate addresses
    #[arg(long)]
    pub in_address: PathBuf,
    /// SQLite database holding the persistent and staging tables
    #[arg(long)]
    pub db: PathBuf,
    /// Output file; stdout when omitted
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Known-address corpus to import before conflating
    #[arg(long)]
    pub in_persistent: Option<PathBuf>,
    /// Where to write corpus lines that failed to import
    #[arg(long)]
    pub error_persistent: Option<PathBuf>,
    /// Where to write rejected input lines
    #[arg(long)]
    pub error_output: Option<PathBuf>,
    #[arg(long)]
    pub workers: Option<usize>,
    /// ISO 3166-1 alpha-2 country code
    #[arg(long)]
    pub country: Option<String>,
    /// ISO 3166-2 region code
    #[arg(long)]
    pub region: Option<String>,
    /// Built-in token tables, e.g. `en,es`
    #[arg(long, value_delimiter = ',')]
    pub tokens: Vec<String>,
    /// JSON file of extra token equivalence groups
    #[arg(long)]
    pub token_file: Option<PathBuf>,
    /// Mapping function applied to every input line
    #[arg(long)]
    pub map_address: Option<String>,
    /// TOML file with an `[engine]` section
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct ImportArgs {
    #[arg(long)]
    pub db: PathBuf,
    #[arg(long)]
    pub in_persistent: PathBuf,
    #[arg(long)]
    pub error_persistent: Option<PathBuf>,
    #[arg(long, default_value = "10")]
    pub max_connections: usize,
}

#[derive(Args)]
pub struct TokenizeArgs {
    pub name: String,
    #[arg(long, value_delimiter = ',')]
    pub tokens: Vec<String>,
    #[arg(long)]
    pub token_file: Option<PathBuf>,
}
