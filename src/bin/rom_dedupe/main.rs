mod config;
mod credentials;
mod dedupe;
mod logger;

use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, ValueEnum};
use clap_complete::Shell;
use colored::Colorize;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use rom_dedupe::database::Database;
use rom_dedupe::region::Region;

use crate::dedupe::RomDedupe;

/// What to do with files marked for removal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Move to a `to_delete` directory under the scanned root
    #[default]
    Move,
    /// Send to the system trash
    Trash,
    /// Delete permanently
    Delete,
}

/// Metadata service used for cross-language title matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    #[default]
    Igdb,
    #[value(name = "thegamesdb")]
    #[serde(rename = "thegamesdb")]
    TheGamesDb,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Move => "move",
            Self::Trash => "trash",
            Self::Delete => "delete",
        };
        write!(f, "{name}")
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Igdb => "igdb",
            Self::TheGamesDb => "thegamesdb",
        };
        write!(f, "{name}")
    }
}

#[derive(Parser)]
#[command(author, version, name = env!("CARGO_BIN_NAME"), about = "Remove regional duplicates from ROM collections")]
pub(crate) struct Args {
    /// Input directories or files
    #[arg(value_hint = clap::ValueHint::AnyPath)]
    paths: Vec<PathBuf>,

    /// Additional file extensions to include
    #[arg(short = 'e', long, num_args = 1, action = clap::ArgAction::Append, name = "EXTENSION")]
    extension: Vec<String>,

    /// Region priority, highest first
    #[arg(short = 'R', long, value_delimiter = ',', name = "REGION")]
    region_priority: Vec<Region>,

    /// Regions whose single-region groups are always kept
    #[arg(short = 'k', long = "preserve", value_delimiter = ',', name = "PRESERVE")]
    preserve: Vec<Region>,

    /// What to do with duplicates
    #[arg(short = 'a', long, value_enum, name = "ACTION")]
    action: Option<Action>,

    /// Metadata service for title lookups
    #[arg(short = 's', long, value_enum, name = "SERVICE")]
    service: Option<Service>,

    /// Only print changes without touching files
    #[arg(short = 'p', long)]
    print: bool,

    /// Recurse into subdirectories
    #[arg(short = 'r', long)]
    recurse: bool,

    /// Match by filename and aliases only, without network lookups
    #[arg(short = 'o', long)]
    offline: bool,

    /// Maximum number of concurrent lookups
    #[arg(short = 'c', long, name = "COUNT")]
    concurrency: Option<usize>,

    /// Do not ask for confirmation
    #[arg(short = 'y', long)]
    yes: bool,

    /// Clear the identity cache and exit
    #[arg(long, group = "cache_mode")]
    clear_cache: bool,

    /// Show identity cache contents and exit
    #[arg(long, group = "cache_mode")]
    cache_info: bool,

    /// Generate shell completion
    #[arg(short = 'l', long, name = "SHELL")]
    completion: Option<Shell>,

    /// Print verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    if let Some(ref shell) = args.completion {
        rom_dedupe::generate_shell_completion(*shell, Args::command(), true, env!("CARGO_BIN_NAME"))
    } else if args.clear_cache {
        let database = Database::open_default()?;
        let cleared = database.clear()?;
        println!("{}", format!("Cleared {cleared} entries from identity cache").green());
        Ok(())
    } else if args.cache_info {
        show_cache_contents(args.verbose)
    } else {
        RomDedupe::new(args)?.run().await
    }
}

/// Log to stderr. `RUST_LOG` overrides the default level.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "rom_dedupe=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn show_cache_contents(verbose: bool) -> Result<()> {
    let database = Database::open_default()?;
    if verbose {
        database.print_debug_info();
        return Ok(());
    }
    let cache = rom_dedupe::cache::IdentityCache::new();
    let count = cache.load_from(&database)?;
    if count == 0 {
        println!("Identity cache is empty");
        return Ok(());
    }
    for (key, entry) in cache.entries() {
        let canonical = entry.to_string();
        let canonical = if entry.is_no_match() {
            canonical.red()
        } else {
            canonical.green()
        };
        println!("{:<48} {canonical}", key.to_string());
    }
    println!("\n{count} entries");
    Ok(())
}
