//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    completions::CompletionsArgs, delete::DeleteArgs, init::InitArgs, link::LinkArgs,
    list::ListArgs, new::NewArgs, set::SetArgs, show::ShowArgs, status::StatusArgs,
};

#[derive(Parser)]
#[command(name = "tts")]
#[command(author, version, about = "Tessera Thing Store")]
#[command(long_about = "Edit an engineering model through transactions against a local thing store.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output (debug logging on stderr)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Project root (default: auto-detect by finding .tts/)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new TTS project
    Init(InitArgs),

    /// Create a thing
    New(NewArgs),

    /// Set attributes of a thing
    Set(SetArgs),

    /// Point a reference field of a thing at another thing
    Link(LinkArgs),

    /// Delete a thing and everything it contains
    Delete(DeleteArgs),

    /// List things in the store
    List(ListArgs),

    /// Show one thing
    Show(ShowArgs),

    /// Show store and cache status
    Status(StatusArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Automatically detect based on context (yaml for show, table for list)
    #[default]
    Auto,
    /// YAML format (full fidelity)
    Yaml,
    /// Tab-separated values (for piping)
    Tsv,
    /// JSON format (for programming)
    Json,
    /// Just IDs, one per line
    Id,
}
