use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;

use wikipdf::config::{DEFAULT_CONFIG_PATH, DEFAULT_WIKI_URL};
use wikipdf::pagelist::PageListStrategy;
use wikipdf::render::OutputFormat;
use wikipdf::{load_config_from_path, Overrides, Settings};

/// Download every article of a MediaWiki site and bundle it into PDFs.
#[derive(Debug, Parser)]
#[command(name = "wikipdf", version)]
struct Cli {
    /// Any URL on the wiki; only its scheme and host are used.
    url: Option<String>,

    /// Config file (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Folder holding one text file per article.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Folder receiving the rendered batches.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Articles per document.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Seconds to wait between downloads.
    #[arg(long)]
    delay: Option<u64>,

    /// How to enumerate the wiki's pages.
    #[arg(long, value_enum)]
    strategy: Option<PageListStrategy>,

    /// Output document format.
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Re-download pages that are already cached.
    #[arg(long)]
    force: bool,

    /// Trust the cached copy of the last page too.
    #[arg(long)]
    no_refresh_last: bool,

    /// Leave redirect pages out of the page list.
    #[arg(long)]
    skip_redirects: bool,

    /// Render from the existing cache without touching the network.
    #[arg(long)]
    skip_crawl: bool,

    /// Fill the cache but do not render.
    #[arg(long)]
    skip_render: bool,

    /// Omit the contents page from each document.
    #[arg(long)]
    no_toc: bool,

    /// Debug logging.
    #[arg(long, short)]
    verbose: bool,

    /// Errors only.
    #[arg(long, short, conflicts_with = "verbose")]
    quiet: bool,
}

fn init_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    };

    // RUST_LOG overrides the flags.
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .compact()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => {
            if !wikipdf::expand_tilde_path(path).exists() {
                bail!("config file {} does not exist", path.display());
            }
            load_config_from_path(path)?
        }
        None => load_config_from_path(DEFAULT_CONFIG_PATH)?,
    };

    if cli.url.is_none() && config.as_ref().and_then(|c| c.url.as_ref()).is_none() {
        info!(url = DEFAULT_WIKI_URL, "no URL provided; running with the default wiki");
    }

    let overrides = Overrides {
        url: cli.url,
        cache_dir: cli.cache_dir,
        output_dir: cli.output_dir,
        batch_size: cli.batch_size,
        delay_secs: cli.delay,
        strategy: cli.strategy,
        format: cli.format,
        force: cli.force,
        no_refresh_last: cli.no_refresh_last,
        skip_redirects: cli.skip_redirects,
        skip_crawl: cli.skip_crawl,
        skip_render: cli.skip_render,
        no_toc: cli.no_toc,
    };
    let settings = Settings::resolve(config, overrides).context("invalid settings")?;

    let summary = wikipdf::run(&settings).with_context(|| format!("processing {}", settings.root))?;

    if let Some(crawl) = summary.crawl {
        info!(
            pages = crawl.listed,
            cached = crawl.cached,
            downloaded = crawl.downloaded,
            failed = crawl.failed,
            cache = %settings.cache_dir.display(),
            "cache ready"
        );
    }
    if let Some(render) = summary.render {
        info!(
            batches = render.batches,
            written = render.written,
            failed = render.failed,
            output = %settings.output_dir.display(),
            "rendering finished"
        );
        if render.failed > 0 {
            bail!("{} of {} batches failed to render", render.failed, render.batches);
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("wikipdf: error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
