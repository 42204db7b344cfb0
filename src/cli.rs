//! Command-line interface definitions for the redcache maintenance tool.
//!
//! The browser calls the library directly; this binary is the
//! user-triggered maintenance surface: inspecting the cache, repairing
//! index drift, and bulk deletion.
//!
//! # Example
//!
//! ```bash
//! # Show cache counters
//! redcache stats
//!
//! # Reconcile disk contents with the indexes
//! redcache repair
//!
//! # Delete metadata only
//! redcache clear --yes
//!
//! # Delete metadata and media
//! redcache clear --full --yes
//!
//! # Verbose mode for debugging
//! redcache -v repair
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Disk-backed media and metadata cache maintenance for Red Media Browser.
#[derive(Debug, Parser)]
#[command(name = "redcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit errors as JSON for scripting
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Cache root directory (defaults to config, then the platform
    /// cache directory)
    #[arg(long, global = true, env = "REDCACHE_ROOT")]
    pub cache_root: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for the maintenance tool.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show cache counters (files, bytes, indexed posts)
    Stats(StatsArgs),
    /// Reconcile disk contents against the cache indexes
    Repair(RepairArgs),
    /// Delete cached metadata, optionally media too
    Clear(ClearArgs),
}

/// Arguments for the `stats` subcommand.
#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Emit the counters as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `repair` subcommand.
#[derive(Debug, Args)]
pub struct RepairArgs {
    /// Emit the repair report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `clear` subcommand.
#[derive(Debug, Args)]
pub struct ClearArgs {
    /// Also delete all cached media files, not just metadata
    #[arg(long)]
    pub full: bool,

    /// Skip the confirmation requirement
    #[arg(short = 'y', long)]
    pub yes: bool,
}
