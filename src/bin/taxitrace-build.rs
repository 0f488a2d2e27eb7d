//! Offline build pipeline: R-tree index, sub-path mining, and path-store
//! consolidation over a trajectory corpus.

use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use std::time::Instant;

use taxitrace::{Config, TrackDir, build_index_from_dir, consolidate, mine_corpus};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of per-taxi track files (overrides the config).
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Directory to root all built artifacts under (overrides the config).
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the on-disk 3D R-tree over every trajectory point.
    Index,
    /// Mine grid-quantized sub-paths into sharded block files.
    Mine,
    /// Fold the block files into the SQLite path store.
    Consolidate,
    /// Run index, mine, and consolidate in sequence.
    All,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    if let Some(data_dir) = args.data_dir {
        config = config.with_data_dir(data_dir);
    }
    if let Some(out_dir) = args.out_dir {
        config = config.rooted_at(out_dir);
    }

    let tracks = TrackDir::new(&config.data_dir);
    let started = Instant::now();

    match args.command {
        Command::Index => build_index(&tracks, &config)?,
        Command::Mine => mine(&tracks, &config)?,
        Command::Consolidate => fold(&config)?,
        Command::All => {
            build_index(&tracks, &config)?;
            mine(&tracks, &config)?;
            fold(&config)?;
        }
    }

    info!("done in {:.2}s", started.elapsed().as_secs_f64());
    Ok(())
}

fn build_index(tracks: &TrackDir, config: &Config) -> anyhow::Result<()> {
    let stats = build_index_from_dir(tracks, &config.index_basename, config.rtree_fanout)?;
    info!(
        "index: {} points from {} files, {} lines skipped",
        stats.points, stats.files, stats.skipped_lines
    );
    Ok(())
}

fn mine(tracks: &TrackDir, config: &Config) -> anyhow::Result<()> {
    let stats = mine_corpus(tracks, config)?;
    info!(
        "mining: {} sub-paths from {} tracks, {} blocks written",
        stats.subpaths, stats.tracks, stats.blocks_written
    );
    Ok(())
}

fn fold(config: &Config) -> anyhow::Result<()> {
    let stats = consolidate(config)?;
    info!("store: {} paths from {} blocks", stats.paths, stats.blocks);
    Ok(())
}
