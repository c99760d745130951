//! CLI argument definitions for gradefetch.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `resolve` | Resolve one student's examination record |
//! | `sources` | List configured sources in dispatch order |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | `$GRADEFETCH_CONFIG`, then `./gradefetch.toml` | Configuration file |
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--log-level` | `$RUST_LOG`, then `warn` | Log filter written to stderr |
//!
//! # Examples
//!
//! ```bash
//! gradefetch resolve --roll 654321 --regulation 2022 --program "Diploma in Engineering"
//! gradefetch --config ./deploy/gradefetch.toml sources --format table
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Resolve examination records across several result databases.
#[derive(Debug, Parser)]
#[command(
    name = "gradefetch",
    author,
    version,
    about = "Multi-source examination result lookup"
)]
pub struct Cli {
    /// Configuration file (TOML, or JSON with a .json extension).
    #[arg(long, global = true, env = "GRADEFETCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Log filter directive, e.g. `debug` or `gradefetch_core=trace`.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    /// Aligned columns for terminal display.
    Table,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve one examination record.
    Resolve(ResolveArgs),
    /// List configured sources.
    Sources(SourcesArgs),
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Roll number.
    #[arg(long)]
    pub roll: String,

    /// Regulation year, e.g. 2022.
    #[arg(long)]
    pub regulation: String,

    /// Program name, e.g. "Diploma in Engineering".
    #[arg(long)]
    pub program: String,

    /// Make this source current before resolving.
    #[arg(long)]
    pub prefer: Option<String>,
}

#[derive(Debug, Args)]
pub struct SourcesArgs {
    /// Include inactive sources.
    #[arg(long, default_value_t = false)]
    pub all: bool,
}
