//! Strata CLI - command-line interface for the storage metadata catalog
//!
//! Captures file-system and cloud metadata, turns it into a canonical object
//! catalog plus a containment graph, and writes bulk-load artifacts.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use strata_core::path::PathCodec;
use strata_core::types::Platform;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;

use commands::*;
use config::StrataConfig;
use output::OutputFormat;

/// Parse a platform name (`linux`, `mac`, `windows`, `dropbox`, `icloud`)
fn parse_platform(s: &str) -> Result<Platform, String> {
    s.parse::<Platform>().map_err(|e| e.to_string())
}

/// Storage metadata catalog pipeline.
///
/// Strata walks local trees or reads cloud provider listings, normalizes the
/// metadata per platform, assigns stable identifiers and emits objects and
/// containment edges as NDJSON with a load descriptor.
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version)]
#[command(about = "Storage metadata catalog pipeline")]
#[command(propagate_version = true)]
#[command(next_help_heading = "Options")]
#[command(after_help = "Quick Start:
  strata run ~/Documents          Index and ingest a tree in one step
  strata index /data              Capture raw entries only
  strata ingest data/<index>.jsonl
  strata import listing.json --provider dropbox

Examples:
  strata codec encode 'a:b?.txt'  Show the stored form of a name
  strata --format json run .      Machine-readable summary")]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format (overrides config default)
    #[arg(long, global = true, value_enum)]
    format: Option<OutputFormat>,

    /// Configuration file (defaults to ./strata.toml, then the user config dir)
    #[arg(long, global = true, env = "STRATA_CONFIG")]
    config: Option<PathBuf>,

    /// Fail on an unreadable or invalid configuration file
    #[arg(long, global = true)]
    strict: bool,
}

/// Cloud providers with importable listings
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Provider {
    Dropbox,
    Icloud,
}

impl From<Provider> for Platform {
    fn from(provider: Provider) -> Self {
        match provider {
            Provider::Dropbox => Platform::Dropbox,
            Provider::Icloud => Platform::ICloud,
        }
    }
}

/// Reserved-character schemes selectable on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CodecArg {
    Percent,
    LegacyTokens,
}

impl From<CodecArg> for PathCodec {
    fn from(codec: CodecArg) -> Self {
        match codec {
            CodecArg::Percent => PathCodec::Percent,
            CodecArg::LegacyTokens => PathCodec::LegacyTokens,
        }
    }
}

#[derive(clap::Args, Debug, Default)]
pub struct WalkArgs {
    /// Walker threads (1 = sequential, 0 = automatic)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Stop descending after this many seconds
    #[arg(long)]
    deadline: Option<u64>,

    /// Glob pattern to exclude (repeatable)
    #[arg(long = "ignore", value_name = "PATTERN")]
    ignore: Vec<String>,

    /// Follow symbolic links
    #[arg(long)]
    follow_symlinks: bool,
}

#[derive(clap::Args, Debug, Default)]
pub struct IngestArgs {
    /// Reserved-character scheme for canonical paths
    #[arg(long, value_enum)]
    codec: Option<CodecArg>,

    /// Fail when two directories share a canonical path
    #[arg(long)]
    strict_duplicates: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk a local directory tree and write its raw entries
    #[command(visible_alias = "scan")]
    Index {
        /// Directory to capture
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Directory for the index file (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        walk: WalkArgs,
    },

    /// Convert a pre-fetched cloud provider listing into raw entries
    Import {
        /// Provider listing (.json array or .jsonl)
        records: PathBuf,

        /// Provider the listing came from
        #[arg(short, long, value_enum)]
        provider: Provider,

        /// Directory for the index file (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Normalize an index file and emit objects, edges and a load descriptor
    Ingest {
        /// Index file produced by `index` or `import`
        input: PathBuf,

        /// Platform of the input (inferred from the file name when omitted)
        #[arg(long, value_parser = parse_platform)]
        platform: Option<Platform>,

        /// Directory for the artifacts (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        ingest: IngestArgs,
    },

    /// Index and ingest a local tree in one step
    Run {
        /// Directory to capture
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Directory for all artifacts (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        walk: WalkArgs,

        #[command(flatten)]
        ingest: IngestArgs,
    },

    /// Encode or decode a name with a path codec
    Codec {
        #[command(subcommand)]
        action: CodecAction,

        /// Scheme to apply
        #[arg(long, value_enum, default_value = "percent", global = true)]
        codec: CodecArg,
    },
}

#[derive(Subcommand)]
pub enum CodecAction {
    /// Replace reserved characters in a name
    Encode { name: String },
    /// Restore reserved characters in an encoded name
    Decode { name: String },
}

fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = StrataConfig::load(cli.config.as_deref(), cli.strict)?;

    // Resolve output format: CLI flag > config default > Table
    let format = cli.format.unwrap_or_else(|| {
        config
            .default_format()
            .and_then(|f| f.parse().ok())
            .unwrap_or(OutputFormat::Table)
    });

    if let Some(use_color) = config.use_color() {
        colored::control::set_override(use_color);
    }

    let command = match cli.command {
        Some(cmd) => cmd,
        None => {
            let _ = Cli::command().print_help();
            println!();
            return Ok(());
        }
    };

    let show_progress = !cli.quiet && format == OutputFormat::Table;

    match command {
        Commands::Index { root, output, walk } => {
            index::run(&root, output.as_deref(), &walk, &config, show_progress, format)
        }
        Commands::Import {
            records,
            provider,
            output,
        } => import::run(&records, provider.into(), output.as_deref(), &config, format),
        Commands::Ingest {
            input,
            platform,
            output,
            ingest: args,
        } => ingest::run(&input, platform, output.as_deref(), &args, &config, format),
        Commands::Run {
            root,
            output,
            walk,
            ingest: args,
        } => run::run(
            &root,
            output.as_deref(),
            &walk,
            &args,
            &config,
            show_progress,
            format,
        ),
        Commands::Codec { action, codec: scheme } => codec::run(action, scheme.into(), format),
    }
}
