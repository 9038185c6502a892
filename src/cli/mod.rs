use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::warn;

use crate::config::Config;
use crate::discover::{CommandFetcher, JsonFileSource};
use crate::egress;
use crate::global;
use crate::ledger::RetryLedger;
use crate::pipeline::Orchestrator;
use crate::render;
use crate::turns::{turns_to_segments, CaptionSegment, TurnSegmenter};

#[derive(Parser, Debug)]
#[command(name = "quorum")]
#[command(about = "Speaker-attributed transcripts for public meetings", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Discover new meetings and process them end to end
    Run,
    /// Detect speaker turns in a caption file (no diarization)
    Captions(CaptionsCliArgs),
    /// Show retry and processed-set state
    Ledger,
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct CaptionsCliArgs {
    /// JSON file with an array of {begin, end, text} caption cues
    pub input: PathBuf,
    /// Output filename prefix (default: turns)
    #[arg(short, long, default_value = "turns")]
    pub output: String,
}

pub async fn handle_run_command() -> Result<()> {
    let config = Config::load()?;

    let timeout = std::time::Duration::from_secs(config.run.http_timeout_seconds);
    let egress = egress::establish(&config.egress, timeout).await?;

    let listing = config
        .source
        .listing_file
        .clone()
        .context("source.listing_file is not configured")?;
    let fetch_command = config
        .source
        .fetch_command
        .clone()
        .context("source.fetch_command is not configured")?;

    let source = Box::new(JsonFileSource::new(listing));
    let fetcher = Box::new(CommandFetcher::new(fetch_command, global::downloads_dir()?));

    let orchestrator = Orchestrator::from_config(&config, &egress, source, fetcher, None)?;

    // Let an in-flight entry finish; just stop picking up new ones.
    let shutdown = orchestrator.shutdown_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received, finishing in-flight work");
            shutdown.store(true, Ordering::SeqCst);
        }
    });

    let summary = orchestrator.run().await?;

    println!(
        "Run complete: {} found, {} new, {} processed, {} failed",
        summary.found, summary.new, summary.processed, summary.failed
    );

    if !summary.success() {
        bail!("{} entr(ies) failed this run", summary.failed);
    }

    Ok(())
}

pub fn handle_captions_command(args: CaptionsCliArgs) -> Result<()> {
    let config = Config::load()?;

    let content = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read {:?}", args.input))?;
    let captions: Vec<CaptionSegment> =
        serde_json::from_str(&content).context("Failed to parse caption file")?;

    println!("Loaded {} caption cues", captions.len());

    let segmenter = TurnSegmenter::new(config.turns);
    let turns = segmenter.segment(&captions);
    let segments = turns_to_segments(&turns);

    let named: Vec<&_> = turns
        .iter()
        .filter(|t| !t.speaker_label.starts_with("Speaker "))
        .collect();

    println!("Detected {} turns ({} self-identified speakers)", turns.len(), named.len());
    for turn in &named {
        println!(
            "  - {} [{}] ({} words)",
            turn.speaker_label,
            render::format_timestamp(turn.start()),
            turn.word_count()
        );
    }

    let txt_path = format!("{}.txt", args.output);
    let csv_path = format!("{}.csv", args.output);
    std::fs::write(&txt_path, render::to_txt(&segments)).context("Failed to write txt output")?;
    std::fs::write(&csv_path, render::to_csv(&segments)).context("Failed to write csv output")?;

    println!("Wrote {txt_path} and {csv_path}");

    Ok(())
}

pub fn handle_ledger_command() -> Result<()> {
    let config = Config::load()?;
    let ledger = RetryLedger::open_default(&config.retry)?;

    let pending = ledger.pending_retries();
    let processed = ledger.processed_keys();

    println!("Processed entries: {}", processed.len());
    println!("Entries under retry: {}", pending.len());

    for (key, record) in &pending {
        println!(
            "  {} - attempt {}/{} (last: {})",
            key,
            record.count,
            ledger.max_retries(),
            record.last_reason.as_deref().unwrap_or("unknown")
        );
    }

    Ok(())
}
