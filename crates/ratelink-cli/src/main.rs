use std::fs::File;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use ratelink_client::{ClientConfig, RatingsClient};
use ratelink_core::{MatchPolicy, NameNormalization, Selection};
use ratelink_pipeline::{AlwaysProceed, ConfirmGate, Pipeline, PipelineConfig};
use ratelink_store::{DuckCache, JsonDirCache, ResultCache};

mod export;
mod input;

const DUCKDB_FILE: &str = "cache.duckdb";

#[derive(Parser)]
#[command(name = "ratelink", version, about = "Link business records to FSA food hygiene ratings")]
struct Cli {
    /// Where crawl results are cached.
    #[arg(long, env = "RATELINK_CACHE_DIR", default_value = "raw_data", global = true)]
    cache_dir: PathBuf,

    #[arg(
        long,
        env = "RATELINK_BACKEND",
        value_enum,
        default_value_t = Backend::Json,
        global = true
    )]
    backend: Backend,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// One JSON file per record.
    Json,
    /// A single DuckDB file inside the cache directory.
    Duckdb,
}

#[derive(Subcommand)]
enum Command {
    /// Search the ratings API for every record not yet cached.
    Crawl(CrawlArgs),
    /// Match cached results and export them as CSV.
    Tabulate(TabulateArgs),
}

#[derive(Args)]
struct CrawlArgs {
    /// CSV dataset to link.
    #[arg(long)]
    input: PathBuf,

    #[arg(long, default_value = "gplace_id")]
    id_col: String,
    #[arg(long, default_value = "name")]
    name_col: String,
    #[arg(long, default_value = "location")]
    address_col: String,
    #[arg(long, default_value = "post_code")]
    postcode_col: String,

    /// Crawl a random sample of this many records instead of the whole file.
    #[arg(long)]
    sample: Option<usize>,

    #[arg(long, env = "RATELINK_API_URL", default_value = ratelink_client::http::DEFAULT_BASE_URL)]
    api_url: String,

    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Records crawled at once.
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Skip the confirmation prompt.
    #[arg(long, short = 'y')]
    yes: bool,
}

#[derive(Args)]
struct TabulateArgs {
    #[arg(long, default_value = "fsa_data_collected.csv")]
    output: PathBuf,

    /// Also write the IDs of unmatched records here.
    #[arg(long)]
    unmatched: Option<PathBuf>,

    /// Lowercase names and drop a leading "The" before comparing.
    #[arg(long)]
    fold_names: bool,

    /// Pick the best accepted candidate instead of the first.
    #[arg(long)]
    best: bool,
}

/// Asks on the terminal before a batch starts.
struct StdinGate;

impl ConfirmGate for StdinGate {
    fn confirm(&self, pending: usize) -> bool {
        eprintln!("{pending} searches to be made using the Food Standards API");
        eprint!("Do you wish to continue? [y/n] ");
        let _ = std::io::stderr().flush();

        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(_) => answer.trim().eq_ignore_ascii_case("y"),
            Err(_) => false,
        }
    }
}

fn open_cache(backend: Backend, dir: &Path) -> anyhow::Result<Box<dyn ResultCache>> {
    let cache: Box<dyn ResultCache> = match backend {
        Backend::Json => Box::new(
            JsonDirCache::open(dir).with_context(|| format!("opening cache at {}", dir.display()))?,
        ),
        Backend::Duckdb => {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            let path = dir.join(DUCKDB_FILE);
            Box::new(
                DuckCache::open_persistent(&path)
                    .with_context(|| format!("opening cache at {}", path.display()))?,
            )
        }
    };
    Ok(cache)
}

async fn crawl(cache: Box<dyn ResultCache>, args: CrawlArgs) -> anyhow::Result<()> {
    let columns = input::Columns {
        id: args.id_col,
        name: args.name_col,
        address: args.address_col,
        postcode: args.postcode_col,
    };
    let records = input::load_records(&args.input, &columns, args.sample)?;

    let client = RatingsClient::new(ClientConfig {
        base_url: args.api_url,
        timeout: Duration::from_secs(args.timeout_secs),
    })
    .context("building HTTP client")?;
    let pipeline = Pipeline::new(
        client,
        cache,
        PipelineConfig {
            concurrency: args.concurrency,
        },
    );

    let gate: &dyn ConfirmGate = if args.yes { &AlwaysProceed } else { &StdinGate };
    let report = pipeline.crawl(records, gate).await?;

    for (id, err) in &report.failed {
        tracing::warn!(id = %id, error = %err, "record left uncached, eligible for the next run");
    }
    tracing::info!(
        already_searched = report.already_cached,
        invalid_ids = report.invalid_ids,
        crawled = report.crawled,
        empty = report.empty,
        failed = report.failed.len(),
        declined = report.declined,
        "crawl summary"
    );
    Ok(())
}

fn tabulate(cache: Box<dyn ResultCache>, args: TabulateArgs) -> anyhow::Result<()> {
    let policy = MatchPolicy {
        names: if args.fold_names {
            NameNormalization::Folded
        } else {
            NameNormalization::AsGiven
        },
        selection: if args.best {
            Selection::BestAccepted
        } else {
            Selection::FirstAcceptable
        },
        ..MatchPolicy::default()
    };
    let tabulation = ratelink_pipeline::tabulate(&*cache, &policy).context("reading cache")?;

    let file = File::create(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    let written = export::write_matches(file, &tabulation.decisions)?;
    tracing::info!(path = %args.output.display(), rows = written, "wrote matches");

    if let Some(path) = &args.unmatched {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let written = export::write_unmatched(file, &tabulation.decisions)?;
        tracing::info!(path = %path.display(), rows = written, "wrote unmatched ids");
    }

    if !tabulation.malformed.is_empty() {
        tracing::warn!(skipped = tabulation.malformed.len(), "unreadable cache entries skipped");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    tracing::info!("ratelink v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let cache = open_cache(cli.backend, &cli.cache_dir)?;

    match cli.command {
        Command::Crawl(args) => crawl(cache, args).await,
        Command::Tabulate(args) => tabulate(cache, args),
    }
}
