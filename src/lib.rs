//! redcache - local cache subsystem for Red Media Browser
//!
//! A disk-backed, content-addressable media cache with a per-post
//! metadata store, built to serve fast non-blocking existence checks to
//! a UI thread while background workers download and commit media
//! concurrently.
//!
//! # Architecture
//!
//! - [`resolver`]: pure URL → path and post ID → path mapping
//! - [`index`]: in-memory set of cached file paths (O(1) `exists`)
//! - [`metadata`]: per-post JSON records plus the submission index
//! - [`coordinator`]: atomic commit of file + index + metadata
//! - [`maintenance`]: repair and bulk deletion
//! - [`prefetch`]: rayon worker pool draining download batches
//! - [`cache`]: the [`cache::MediaCache`] facade tying it together

pub mod cache;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod index;
pub mod logging;
pub mod maintenance;
pub mod media_type;
pub mod metadata;
pub mod prefetch;
pub mod resolver;
pub mod signal;

use anyhow::{Context, Result};

use cache::MediaCache;
use cli::{Cli, Commands};
use config::Config;
use error::ExitCode;

/// Run the maintenance CLI to completion.
///
/// Returns the exit code to terminate with; `Err` means an unexpected
/// failure the caller reports (see `main.rs` for the error envelope).
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let handler = signal::install_handler().context("Failed to install signal handler")?;
    let flag = handler.get_flag();

    let config = Config::load();
    let cache_root = match &cli.cache_root {
        Some(root) => root.clone(),
        None => config
            .effective_cache_root()
            .context("Failed to determine cache root")?,
    };
    log::info!("Using cache root: {}", cache_root.display());

    match cli.command {
        Commands::Stats(args) => {
            let cache = MediaCache::open(&cache_root, Some(&flag))?;
            let stats = cache.stats();
            if args.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!(
                    "{} media files ({} bytes), {} indexed posts",
                    stats.media_files, stats.media_bytes, stats.indexed_posts
                );
            }
            Ok(ExitCode::Success)
        }
        Commands::Repair(args) => {
            let cache = MediaCache::open(&cache_root, Some(&flag))?;
            let report = cache.repair(Some(&flag))?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report.to_json())?);
            } else {
                println!("Repair complete: {report}");
            }
            Ok(ExitCode::Success)
        }
        Commands::Clear(args) => {
            if !args.yes {
                eprintln!(
                    "Refusing to delete without --yes ({} would be removed)",
                    if args.full {
                        "all cached media and metadata"
                    } else {
                        "all cached metadata"
                    }
                );
                return Ok(ExitCode::GeneralError);
            }
            let cache = MediaCache::new(&cache_root);
            if args.full {
                cache.clear_full()?;
                println!("Cleared media and metadata caches");
            } else {
                cache.clear_metadata()?;
                println!("Cleared metadata cache");
            }
            Ok(ExitCode::Success)
        }
    }
}
