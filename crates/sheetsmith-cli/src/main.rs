//! sheetsmith CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use sheetsmith_core::DEFAULT_PROBLEM_COUNT;

mod commands;
mod output;

#[derive(Parser)]
#[command(
    name = "sheetsmith",
    version,
    about = "Turn a worksheet photo into fresh practice problems"
)]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Provider to use (overrides `default_provider`)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Model to use (overrides `default_model`)
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a worksheet photo
    Analyze {
        /// Worksheet image (png, jpg, webp, gif or pdf)
        #[arg(long)]
        image: PathBuf,

        /// Ignore handwriting on the worksheet
        #[arg(long)]
        remove_handwriting: bool,

        /// Write the analysis JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print the raw result envelope as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate practice problems from a saved analysis
    Generate {
        /// Analysis JSON file (see `analyze --output`)
        #[arg(long)]
        analysis: PathBuf,

        /// Number of problems
        #[arg(long, default_value_t = DEFAULT_PROBLEM_COUNT)]
        count: u32,

        /// Extra instructions for the generator
        #[arg(long)]
        prompt: Option<String>,

        /// Print the raw result envelope as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate problems shaped by your own instructions
    Customize {
        /// Analysis JSON file (see `analyze --output`)
        #[arg(long)]
        analysis: PathBuf,

        /// How the problems should differ (e.g. "make them harder")
        #[arg(long)]
        prompt: String,

        /// Number of problems
        #[arg(long, default_value_t = DEFAULT_PROBLEM_COUNT)]
        count: u32,

        /// Print the raw result envelope as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyze a worksheet and generate problems in one go
    Run {
        /// Worksheet image (png, jpg, webp, gif or pdf)
        #[arg(long)]
        image: PathBuf,

        /// Number of problems
        #[arg(long, default_value_t = DEFAULT_PROBLEM_COUNT)]
        count: u32,

        /// Customize the problems with these instructions
        #[arg(long)]
        prompt: Option<String>,

        /// Ignore handwriting on the worksheet
        #[arg(long)]
        remove_handwriting: bool,

        /// Print the session as JSON
        #[arg(long)]
        json: bool,
    },

    /// List available models (only `--provider`'s when given)
    ListModels,

    /// Create a starter config and a sample analysis
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sheetsmith=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let target = commands::Target {
        config: cli.config,
        provider: cli.provider,
        model: cli.model,
    };

    let result = match cli.command {
        Commands::Analyze {
            image,
            remove_handwriting,
            output,
            json,
        } => commands::analyze::execute(&target, image, remove_handwriting, output, json).await,
        Commands::Generate {
            analysis,
            count,
            prompt,
            json,
        } => commands::generate::execute(&target, analysis, count, prompt, json).await,
        Commands::Customize {
            analysis,
            prompt,
            count,
            json,
        } => commands::customize::execute(&target, analysis, prompt, count, json).await,
        Commands::Run {
            image,
            count,
            prompt,
            remove_handwriting,
            json,
        } => commands::run::execute(&target, image, count, prompt, remove_handwriting, json).await,
        Commands::ListModels => commands::list_models::execute(&target).await,
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
