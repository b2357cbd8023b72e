//! `wikipdf.toml` loading and CLI > file > default resolution.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::batch::DEFAULT_BATCH_SIZE;
use crate::cache::CrawlOptions;
use crate::error::{Error, Result};
use crate::fetcher::{self, default_user_agent};
use crate::pagelist::{PageListOptions, PageListStrategy};
use crate::render::{OutputFormat, RenderOptions};
use crate::sanitize_filename;

pub const DEFAULT_CONFIG_PATH: &str = "wikipdf.toml";

/// Wiki used when no URL is given anywhere.
pub const DEFAULT_WIKI_URL: &str = "https://terraria.fandom.com/wiki/Terraria_Wiki";

/// Everything `wikipdf.toml` may set. All keys are optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub url: Option<String>,
    pub user_agent: Option<String>,
    pub batch_size: Option<usize>,
    pub delay_secs: Option<u64>,
    pub strategy: Option<PageListStrategy>,
    pub api_path: Option<String>,
    pub cache_dir: Option<String>,
    pub output_dir: Option<String>,
    pub weasyprint: Option<String>,
    pub format: Option<OutputFormat>,
    pub refresh_last: Option<bool>,
    pub skip_redirects: Option<bool>,
    pub toc: Option<bool>,
}

/// Values given on the command line; `None` defers to the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub delay_secs: Option<u64>,
    pub strategy: Option<PageListStrategy>,
    pub format: Option<OutputFormat>,
    pub force: bool,
    pub no_refresh_last: bool,
    pub skip_redirects: bool,
    pub skip_crawl: bool,
    pub skip_render: bool,
    pub no_toc: bool,
}

/// Read a config file. A missing file yields `Ok(None)`.
pub fn load_config_from_path(path: impl AsRef<Path>) -> Result<Option<Config>> {
    let path = expand_tilde_path(path.as_ref());
    if !path.exists() {
        debug!(path = %path.display(), "no config file");
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
    let config = toml::from_str(&content).map_err(|source| Error::Config {
        path: path.clone(),
        source,
    })?;
    debug!(path = %path.display(), "loaded config");
    Ok(Some(config))
}

/// Expand a leading `~` to `$HOME`.
pub fn expand_tilde_path(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

/// Fully resolved run settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub url: Url,
    pub root: Url,
    pub user_agent: String,
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
    pub page_list: PageListOptions,
    pub crawl: CrawlOptions,
    pub render: RenderOptions,
    pub skip_crawl: bool,
    pub skip_render: bool,
}

impl Settings {
    pub fn resolve(config: Option<Config>, cli: Overrides) -> Result<Self> {
        let file = config.unwrap_or_default();

        let raw_url = cli
            .url
            .or(file.url)
            .unwrap_or_else(|| DEFAULT_WIKI_URL.to_string());
        let url = fetcher::normalize_url(&raw_url)?;
        let root = fetcher::site_root(&url)?;
        let host = root.host_str().unwrap_or_default().to_string();

        let cache_dir = cli
            .cache_dir
            .or_else(|| file.cache_dir.map(PathBuf::from))
            .map(|p| expand_tilde_path(&p))
            .unwrap_or_else(|| PathBuf::from(sanitize_filename(&format!("{host}_wiki"))));
        let output_dir = cli
            .output_dir
            .or_else(|| file.output_dir.map(PathBuf::from))
            .map(|p| expand_tilde_path(&p))
            .unwrap_or_else(|| PathBuf::from(sanitize_filename(&format!("{host}_wiki_pdf"))));

        let settings = Settings {
            user_agent: file.user_agent.unwrap_or_else(default_user_agent),
            page_list: PageListOptions {
                strategy: cli.strategy.or(file.strategy).unwrap_or_default(),
                api_path: file.api_path.unwrap_or_else(|| PageListOptions::default().api_path),
                skip_redirects: cli.skip_redirects || file.skip_redirects.unwrap_or(false),
            },
            crawl: CrawlOptions {
                force: cli.force,
                refresh_last: !cli.no_refresh_last && file.refresh_last.unwrap_or(true),
                delay: Duration::from_secs(cli.delay_secs.or(file.delay_secs).unwrap_or(0)),
            },
            render: RenderOptions {
                batch_size: cli.batch_size.or(file.batch_size).unwrap_or(DEFAULT_BATCH_SIZE),
                format: cli.format.or(file.format).unwrap_or_default(),
                weasyprint: file.weasyprint.unwrap_or_else(|| "weasyprint".to_string()),
                toc: !cli.no_toc && file.toc.unwrap_or(true),
                site_name: host,
            },
            skip_crawl: cli.skip_crawl,
            skip_render: cli.skip_render,
            url,
            root,
            cache_dir,
            output_dir,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.render.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.render.weasyprint.trim().is_empty() {
            return Err(Error::InvalidConfig("weasyprint must name a program".into()));
        }
        if self.skip_crawl && self.skip_render {
            return Err(Error::InvalidConfig(
                "--skip-crawl and --skip-render leave nothing to do".into(),
            ));
        }
        Ok(())
    }
}
