use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::retriever::DEFAULT_K;

#[derive(Debug, Parser)]
#[command(
    name = "coverbert",
    about = "Retrieve few-shot vacancy/response examples for application letters"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Override the ColBERT model ID or local model path
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Clean the raw corpus, embed it and write the vector index
    Build(BuildArgs),
    /// Find the examples closest to a vacancy
    Search(SearchArgs),
    /// Print a generation prompt built around retrieved examples
    Prompt(PromptArgs),
    /// Show artifact status
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Build --

#[derive(Debug, Parser)]
pub struct BuildArgs {
    /// Raw JSON-lines corpus (defaults to few_shot_examples.jsonl in the data directory)
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Output the summary as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The vacancy text to search for
    pub query: String,

    /// Number of examples to return
    #[arg(short = 'k', long, default_value_t = DEFAULT_K)]
    pub k: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    /// Print full vacancy and response text instead of a preview
    #[arg(long)]
    pub full: bool,
}

// -- Prompt --

#[derive(Debug, Parser)]
pub struct PromptArgs {
    /// The vacancy text being applied to
    pub vacancy: String,

    /// File holding the candidate's experience summary
    #[arg(long)]
    pub summary: PathBuf,

    /// Résumé summary shown with every example (defaults to resume_short.txt in the data directory)
    #[arg(long)]
    pub static_summary: Option<PathBuf>,

    /// Number of examples to include
    #[arg(short = 'k', long, default_value_t = DEFAULT_K)]
    pub k: usize,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "coverbert",
            &mut std::io::stdout(),
        );
    }
}
