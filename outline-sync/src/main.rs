use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use outline_sync::append::{append_entry, contains_ignore_case};
use outline_sync::config::Config;
use outline_sync::merge::{merge_entry_outcome, merge_line_outcome};
use outline_sync::normalize::normalize;
use outline_sync::record::load_records;
use outline_sync::sync::{SyncOptions, run_source};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "outline-sync",
    about = "Keep tracker records in sync with outline pages",
    version
)]
struct Cli {
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sync a JSON file of normalized records into a configured source's pages.
    Sync(SyncArgs),

    /// Replace or insert one keyed entry in an outline file.
    Merge(MergeArgs),

    /// Append an entry to a chronological page unless it is already there.
    Append(AppendArgs),

    /// Strip vendor boilerplate from a free-text body.
    Normalize(NormalizeArgs),
}

#[derive(Debug, Args)]
struct SyncArgs {
    /// Path to config.json.
    #[arg(long)]
    config: PathBuf,
    /// Source name as defined in the configuration.
    #[arg(long)]
    source: String,
    /// JSON array of records produced by a fetcher.
    #[arg(long)]
    records: PathBuf,
    /// Report what would change without writing.
    #[arg(long)]
    dry_run: bool,
    /// Print the sync report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct MergeArgs {
    /// Outline file to update.
    #[arg(long)]
    file: PathBuf,
    /// Substring identifying the entry.
    #[arg(long)]
    key: String,
    /// Replacement entry text (may span several lines).
    #[arg(long)]
    entry: String,
    /// Treat entries as single lines instead of blocks.
    #[arg(long)]
    line: bool,
    /// Overwrite the file instead of printing to stdout.
    #[arg(long)]
    in_place: bool,
}

#[derive(Debug, Args)]
struct AppendArgs {
    /// Outline file to append to.
    #[arg(long)]
    file: PathBuf,
    #[arg(long)]
    headline: String,
    /// Body rendered as a collapsed child entry.
    #[arg(long, default_value = "")]
    body: String,
    /// Token searched before appending. Defaults to the headline.
    #[arg(long)]
    token: Option<String>,
}

#[derive(Debug, Args)]
struct NormalizeArgs {
    /// File holding the body. Reads stdin when omitted.
    input: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Sync(args) => handle_sync(args),
        Commands::Merge(args) => handle_merge(args),
        Commands::Append(args) => handle_append(args),
        Commands::Normalize(args) => handle_normalize(args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "outline_sync=debug"
    } else {
        "outline_sync=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(io::stderr)
        .init();
}

fn handle_sync(args: SyncArgs) -> Result<()> {
    let SyncArgs {
        config,
        source,
        records,
        dry_run,
        json,
    } = args;

    let config = Config::load(&config).context("loading configuration")?;
    let records = load_records(&records)?;
    if records.is_empty() {
        warn!(source = %source, "no records to sync");
    }

    let report = run_source(&config, &source, &records, SyncOptions { dry_run })
        .with_context(|| format!("syncing source {source:?}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{source}: {} page(s) written, {} unchanged; {} replaced, {} inserted, {} appended, {} skipped",
            report.pages_written,
            report.pages_unchanged,
            report.entries_replaced,
            report.entries_inserted,
            report.entries_appended,
            report.entries_skipped,
        );
        for key in &report.duplicate_keys {
            println!("warning: {key} matched more than one entry");
        }
    }
    Ok(())
}

fn handle_merge(args: MergeArgs) -> Result<()> {
    let MergeArgs {
        file,
        key,
        entry,
        line,
        in_place,
    } = args;

    let original = read_or_empty(&file)?;
    let outcome = if line {
        merge_line_outcome(&original, &key, &entry)
    } else {
        merge_entry_outcome(&original, &key, &entry)
    };
    debug!(matches = outcome.matches, "merged entry");
    if outcome.matches > 1 {
        warn!(key = %key, matches = outcome.matches, "key matched several entries");
    }

    if in_place {
        write_if_changed(&file, &original, &outcome.text)?;
    } else {
        print!("{}", outcome.text);
        if !outcome.text.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

fn handle_append(args: AppendArgs) -> Result<()> {
    let AppendArgs {
        file,
        headline,
        body,
        token,
    } = args;

    let token = token.unwrap_or_else(|| headline.clone());
    let original = read_or_empty(&file)?;
    if contains_ignore_case(&original, &token) {
        info!(path = %file.display(), "entry already present");
        return Ok(());
    }
    let updated = append_entry(&original, &headline, &normalize(&body));
    write_if_changed(&file, &original, &updated)?;
    Ok(())
}

fn handle_normalize(args: NormalizeArgs) -> Result<()> {
    let body = match args.input {
        Some(path) => fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
            buf
        }
    };
    print!("{}", normalize(&body));
    Ok(())
}

fn read_or_empty(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(err).with_context(|| format!("reading {:?}", path)),
    }
}

/// Returns whether the file was rewritten.
fn write_if_changed(path: &Path, original: &str, updated: &str) -> Result<bool> {
    if original == updated {
        info!(path = %path.display(), "file unchanged");
        return Ok(false);
    }
    fs::write(path, updated.as_bytes()).with_context(|| format!("writing {:?}", path))?;
    info!(path = %path.display(), "file changed");
    Ok(true)
}
