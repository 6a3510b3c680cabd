use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn, LevelFilter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use harvester_lib::artists::{ArtistHarvest, ArtistMatch};
use harvester_lib::artwork::ArtworkStore;
use harvester_lib::collections::{ArtDownload, CollectionHarvest, CollectionRecord};
use harvester_lib::confidence::ConfidenceScorer;
use harvester_lib::extractor::Extractor;
use harvester_lib::hooks::GitCommitHook;
use harvester_lib::links::{LinkHarvest, TrackLink};
use harvester_lib::scraper::CollectionScraper;
use harvester_lib::search_engine::YtDlp;
use harvester_lib::validator::Validator;
use harvester_lib::{export, input_loader, logger, work};
use harvester_lib::{CheckpointStore, Harvest, HarvestConfig, RunSummary, Scheduler};

#[derive(Parser, Debug)]
#[command(name = "harvester", version, about = "Resumable harvesting of collection metadata, video links and artist channels")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Checkpoint/result file
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Maximum new items to fetch in this run
    #[arg(long, global = true)]
    max_items: Option<usize>,

    /// Maximum unresolved entries re-attempted by the retry pass
    #[arg(long, global = true)]
    retry_budget: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    #[arg(long, global = true)]
    checkpoint_secs: Option<u64>,

    /// off, error, warn, info, debug or trace
    #[arg(long, global = true)]
    log_level: Option<LevelFilter>,

    /// Commit the result file after every save
    #[arg(long, global = true)]
    git: bool,

    /// Push after each commit (implies --git)
    #[arg(long, global = true)]
    push: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape collection pages for an inclusive id range
    Collections {
        #[arg(long)]
        start: u64,
        #[arg(long)]
        end: u64,
        #[arg(long)]
        download_art: bool,
        #[arg(long)]
        art_dir: Option<PathBuf>,
        /// Also export the results as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Find a video link for every track in a metadata file
    Links {
        #[arg(long)]
        metadata: PathBuf,
        #[arg(long)]
        missing_log: Option<PathBuf>,
    },
    /// Find the channel of every artist in a metadata file
    Artists {
        #[arg(long)]
        metadata: PathBuf,
        /// Also write a plain {"artists": [{id, name}]} list
        #[arg(long)]
        simple_output: Option<PathBuf>,
        #[arg(long)]
        min_confidence: Option<f64>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logger::init(cli.common.log_level);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = HarvestConfig::load(cli.common.config.as_deref())
        .context("could not load configuration")?;
    apply_common(&mut config, &cli.common);

    match cli.command {
        Command::Collections {
            start,
            end,
            download_art,
            art_dir,
            csv,
        } => {
            config.collections.download_art |= download_art;
            if let Some(dir) = art_dir {
                config.collections.art_dir = dir;
            }
            if csv.is_some() {
                config.collections.csv = csv;
            }
            config.validate()?;
            let output = output_path(&cli.common, "metadata.json");
            run_collections(&config, start, end, &output).await
        }
        Command::Links {
            metadata,
            missing_log,
        } => {
            if let Some(path) = missing_log {
                config.search.missing_log = path;
            }
            config.validate()?;
            let output = output_path(&cli.common, "youtube-links.json");
            run_links(&config, &metadata, &output).await
        }
        Command::Artists {
            metadata,
            simple_output,
            min_confidence,
        } => {
            if simple_output.is_some() {
                config.artists.simple_output = simple_output;
            }
            if let Some(min) = min_confidence {
                config.artists.rules.min_confidence = min;
            }
            config.validate()?;
            let output = output_path(&cli.common, "artists_verified_detailed.json");
            run_artists(&config, &metadata, &output).await
        }
    }
}

fn apply_common(config: &mut HarvestConfig, args: &CommonArgs) {
    if let Some(n) = args.concurrency {
        config.run.concurrency = n;
    }
    if args.max_items.is_some() {
        config.run.max_items_per_run = args.max_items;
    }
    if let Some(n) = args.retry_budget {
        config.run.null_retry_budget = n;
    }
    if let Some(secs) = args.timeout {
        config.retry.timeout_secs = secs;
    }
    if let Some(n) = args.max_attempts {
        config.retry.max_attempts = n;
    }
    if let Some(secs) = args.checkpoint_secs {
        config.run.checkpoint_every_secs = secs;
    }
    if args.git || args.push {
        config.git.enabled = true;
    }
    config.git.push |= args.push;
}

fn output_path(args: &CommonArgs, default: &str) -> PathBuf {
    args.output.clone().unwrap_or_else(|| PathBuf::from(default))
}

fn scheduler<H: Harvest>(harvest: H, config: &HarvestConfig) -> Scheduler<H> {
    let scheduler = Scheduler::new(harvest, config.run_settings());
    if config.git.enabled {
        scheduler.with_hook(Arc::new(GitCommitHook::new(&config.git.repo, config.git.push)))
    } else {
        scheduler
    }
}

/// Resolves on Ctrl+C. If the handler cannot be installed the run simply
/// cannot be interrupted gracefully.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => warn!("Interrupt received, saving progress..."),
        Err(e) => {
            error!("Could not listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

fn report(label: &str, summary: &RunSummary) {
    info!("{}", "=".repeat(60));
    info!(
        "{} finished in phase {:?} after {:.1}s{}{}",
        label,
        summary.phase,
        summary.elapsed.as_secs_f64(),
        if summary.capped { " (run limit reached)" } else { "" },
        if summary.interrupted { " (interrupted)" } else { "" },
    );
    info!(
        "Attempted {}: ✓ {} | ✗ {} | ⚠ {}",
        summary.attempted, summary.resolved, summary.rejected, summary.failed
    );
    if summary.retried > 0 {
        info!(
            "Retry pass: {} re-attempted, {} recovered",
            summary.retried, summary.retry_resolved
        );
    }
    if summary.purged > 0 {
        info!("Purged {} unresolved entries from the result file.", summary.purged);
    }
    info!("{}", "=".repeat(60));
}

async fn run_collections(config: &HarvestConfig, start: u64, end: u64, output: &Path) -> Result<()> {
    let domain = work::id_range(start, end, &config.collections.url_template)
        .context("invalid collection range")?;
    let policy = config.retry_policy();
    let art_policy = config.art_policy();

    let source = CollectionScraper::new(
        &config.collections.user_agent,
        policy.timeout.max(art_policy.timeout),
    )
    .context("could not build HTTP client")?;
    let mut harvest = CollectionHarvest::new(source, Extractor::new()?, policy);
    if config.collections.download_art {
        info!("Album art will be saved under {:?}", config.collections.art_dir);
        harvest = harvest.with_art(ArtDownload {
            store: ArtworkStore::new(&config.collections.art_dir)?,
            policy: art_policy,
        });
    }

    let scheduler = scheduler(harvest, config);
    let mut store: CheckpointStore<CollectionRecord> = CheckpointStore::load(output);
    let summary = scheduler.run(&domain, &mut store, shutdown_signal()).await?;
    report("collections", &summary);

    if config.collections.download_art {
        let tally = scheduler.harvest().art_tally();
        info!("Album art: {} saved, {} failed", tally.saved, tally.failed);
    }
    if let Some(csv) = &config.collections.csv {
        export::write_collections_csv(csv, store.records().map(|(_, r)| r))
            .with_context(|| format!("could not export {}", csv.display()))?;
    }
    Ok(())
}

async fn run_links(config: &HarvestConfig, metadata: &Path, output: &Path) -> Result<()> {
    let albums = input_loader::load_albums(metadata)?;
    let domain = input_loader::track_items(&albums);
    if domain.is_empty() {
        warn!("No tracks found in {:?}", metadata);
    }

    let harvest = LinkHarvest::new(
        YtDlp::new(&config.search.ytdlp_binary),
        Validator::new(config.search.rules.clone()),
        config.retry_policy(),
    )
    .with_windows(config.link_windows())
    .with_overrides(config.search.override_keys())
    .with_missing_log(&config.search.missing_log);

    let mut store: CheckpointStore<TrackLink> = CheckpointStore::load(output);
    let summary = scheduler(harvest, config)
        .run(&domain, &mut store, shutdown_signal())
        .await?;
    report("links", &summary);
    Ok(())
}

async fn run_artists(config: &HarvestConfig, metadata: &Path, output: &Path) -> Result<()> {
    let albums = input_loader::load_albums(metadata)?;
    let domain = input_loader::artist_items(&albums);
    if domain.is_empty() {
        warn!("No artists found in {:?}", metadata);
    }

    let harvest = ArtistHarvest::new(
        YtDlp::new(&config.search.ytdlp_binary),
        ConfidenceScorer::new(config.artists.rules.clone()),
        config.retry_policy(),
    )
    .with_limits(config.artist_limits());

    let mut store: CheckpointStore<ArtistMatch> = CheckpointStore::load(output);
    let summary = scheduler(harvest, config)
        .run(&domain, &mut store, shutdown_signal())
        .await?;
    report("artists", &summary);

    if let Some(path) = &config.artists.simple_output {
        export::write_artist_list(path, store.records().map(|(_, r)| r))
            .with_context(|| format!("could not export {}", path.display()))?;
    }
    Ok(())
}
