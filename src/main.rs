mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "promptdex")]
#[command(about = "Find the right prompt in your prompt collection", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
pub struct GlobalArgs {
    #[arg(long, global = true, help = "Config file (default: ~/.prompts/config.yaml)")]
    pub config: Option<PathBuf>,
    #[arg(long = "root", global = true, help = "Document root, repeatable (overrides config)")]
    pub roots: Vec<PathBuf>,
    #[arg(long, global = true, help = "Snapshot directory (overrides config)")]
    pub index_dir: Option<PathBuf>,
    #[arg(short, long, global = true, help = "Log index lifecycle to stderr")]
    pub verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or rebuild the semantic index
    Index {
        #[arg(long, help = "Discard the existing snapshot and rebuild")]
        rebuild: bool,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Search prompts (semantic, with keyword fallback)
    Search {
        query: String,
        #[arg(long, short, help = "Limit results")]
        limit: Option<usize>,
        #[arg(long, help = "Use keyword search only")]
        fallback: bool,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Show index status
    Status {
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// List prompt files
    List {
        #[arg(long, help = "Only prompts whose name or content contains this keyword")]
        filter: Option<String>,
        #[arg(long, help = "Preview the first N lines")]
        preview: Option<usize>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = std::env::var("PROMPTDEX_LOG")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    match cli.command {
        Commands::Index { rebuild, json } => commands::index::run(&cli.global, rebuild, json),
        Commands::Search {
            query,
            limit,
            fallback,
            json,
        } => commands::search::run(&cli.global, &query, limit, fallback, json),
        Commands::Status { json } => commands::status::run(&cli.global, json),
        Commands::List { filter, preview } => {
            commands::list::run(&cli.global, filter.as_deref(), preview)
        }
    }
}
