//! ff-scrape main entry point
//!
//! This is the command-line interface for the ff-scrape story archive crawler.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use ff_scrape::config::{load_config_with_hash, validate, Config, DelayProfile};
use ff_scrape::output::{export_run, human_size, print_statistics};
use ff_scrape::storage::{new_run_key, run_root, ContentStore};
use ff_scrape::{Coordinator, ScrapeError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// ff-scrape: a polite story archive crawler
///
/// ff-scrape walks a category listing one request at a time, stores every
/// story and chapter as JSON under `<out-dir>/<key>`, and can later fill in
/// missing chapters or pick up only what changed since the last run.
#[derive(Parser, Debug)]
#[command(name = "ff-scrape")]
#[command(version = "1.0.0")]
#[command(about = "A polite story archive crawler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Path to TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Key of the run to work on; `pages` makes a new one when omitted
    #[arg(long, global = true)]
    key: Option<String>,

    /// Directory holding all runs
    #[arg(long, global = true, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Listing category to crawl (e.g. "anime/RWBY")
    #[arg(long, global = true)]
    category: Option<String>,

    /// Keep every raw response under `<out-dir>/<key>/dump`
    #[arg(long, global = true)]
    dump_html: bool,

    /// Use the short delay profile
    #[arg(long, global = true)]
    light: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl a range of listing pages and every chapter they list
    Pages {
        /// First page to crawl
        #[arg(default_value_t = 1)]
        first: u32,

        /// Last page to crawl; read from the listing when omitted
        last: Option<u32>,
    },

    /// Fetch chapters missing from an existing run
    Chapters,

    /// Refresh an existing run with whatever changed on the site
    Update,

    /// Export an existing run into flat JSON files
    Export {
        /// Directory receiving `<key>/stories.json` and `<key>/chapters/`
        #[arg(long, value_name = "DIR", default_value = "./export")]
        dest: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.common.verbose, cli.common.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ff_scrape=info,warn"),
            1 => EnvFilter::new("ff_scrape=debug,info"),
            2 => EnvFilter::new("ff_scrape=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load(&cli.common)?;

    let key = match (&cli.command, cli.common.key.clone()) {
        (_, Some(key)) => key,
        (Command::Pages { .. }, None) => {
            let key = new_run_key();
            tracing::info!("Starting new run. (key={})", key);
            key
        }
        (Command::Chapters, None) => return Err(ScrapeError::MissingRunKey("chapters").into()),
        (Command::Update, None) => return Err(ScrapeError::MissingRunKey("update").into()),
        (Command::Export { .. }, None) => return Err(ScrapeError::MissingRunKey("export").into()),
    };

    if let Command::Export { dest } = &cli.command {
        return handle_export(&config, &key, dest).await;
    }

    let coordinator = Coordinator::new(&config, &key)?;
    tracing::info!("Run directory: {}", coordinator.store().root().display());

    match cli.command {
        Command::Pages { first, last } => {
            let stories = coordinator.get_pages(first, last).await?;
            tracing::info!("Crawled {} stories", stories.len());
        }
        Command::Chapters => {
            let stories = coordinator.get_chapters_from_existing().await?;
            tracing::info!("Checked chapters of {} stories", stories);
        }
        Command::Update => {
            let pages = coordinator.update_existing().await?;
            tracing::info!("Update caught up after {} pages", pages);
        }
        Command::Export { .. } => {}
    }

    if !cli.common.quiet {
        print_statistics(&key, &coordinator.stats());
    }
    Ok(())
}

/// Loads the config file if one was given, applies command line overrides
/// and validates the result
fn load(args: &CommonArgs) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    if let Some(out_dir) = &args.out_dir {
        config.output.out_dir = out_dir.clone();
    }
    if let Some(category) = &args.category {
        config.site.category = category.clone();
    }
    if args.dump_html {
        config.output.dump_html = true;
    }
    if args.light {
        config.throttle.profile = DelayProfile::Light;
    }

    validate(&config)?;
    Ok(config)
}

/// Handles the `export` command
async fn handle_export(config: &Config, key: &str, dest: &std::path::Path) -> anyhow::Result<()> {
    let source = ContentStore::new(run_root(&config.output.out_dir, key));
    let dest = dest.join(key);

    tracing::info!(
        "Exporting {} to {}",
        source.root().display(),
        dest.display()
    );
    let summary = export_run(&source, &dest).await?;

    println!(
        "✓ Exported {} stories and {} chapters ({}) to {}",
        summary.stories,
        summary.chapters,
        human_size(summary.bytes),
        dest.display()
    );
    Ok(())
}
