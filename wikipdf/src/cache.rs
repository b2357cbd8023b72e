//! On-disk article cache: one UTF-8 text file per article.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use percent_encoding::percent_decode_str;
use reqwest::blocking::Client;
use tracing::{info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::pagelist::PageRef;
use crate::{extractor, fetcher, sanitize_filename};

/// An article already present in the cache folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArticle {
    /// File stem, i.e. the sanitized article title.
    pub title: String,
    pub path: PathBuf,
}

/// What [`ArticleCache::load_or_fetch`] did for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Cached,
    Downloaded(String),
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub listed: usize,
    pub cached: usize,
    pub downloaded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct CrawlOptions {
    /// Re-download every page even when cached.
    pub force: bool,
    /// Always re-download the final page of the list.
    pub refresh_last: bool,
    /// Pause between network downloads.
    pub delay: Duration,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            force: false,
            refresh_last: true,
            delay: Duration::ZERO,
        }
    }
}

/// Article title as it appears in a `/wiki/<Title>` URL.
pub fn title_from_url(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .unwrap_or_default();
    percent_decode_str(segment)
        .decode_utf8_lossy()
        .replace('_', " ")
}

pub struct ArticleCache {
    dir: PathBuf,
}

impl ArticleCache {
    /// Open the cache folder, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, title: &str) -> PathBuf {
        self.dir.join(format!("{}.txt", sanitize_filename(title)))
    }

    /// Reuse a cached page, or download and store it.
    ///
    /// A cached file counts as a hit without being read. Download, extraction
    /// and write failures are logged and leave nothing on disk, so the page is
    /// retried by the next run.
    pub fn load_or_fetch<F>(&self, page: &PageRef, force: bool, fetch: F) -> Result<Outcome>
    where
        F: FnOnce(&Url) -> Result<String>,
    {
        let path = self.path_for(&page.title);

        if !force && path.exists() {
            info!(title = %page.title, "loading from cache");
            return Ok(Outcome::Cached);
        }

        info!(url = %page.url, "downloading");
        let html = match fetch(&page.url) {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %page.url, error = %e, "error downloading page");
                return Ok(Outcome::Failed);
            }
        };

        let Some(text) = extractor::extract_text(&html) else {
            warn!(url = %page.url, "no #mw-content-text container; skipping");
            return Ok(Outcome::Failed);
        };

        if let Err(e) = fs::write(&path, &text) {
            warn!(path = %path.display(), error = %e, "error writing cache file");
            let _ = fs::remove_file(&path);
            return Ok(Outcome::Failed);
        }
        Ok(Outcome::Downloaded(text))
    }

    /// Every cached article, sorted by file name.
    pub fn list(&self) -> Result<Vec<CachedArticle>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        let mut articles = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&self.dir, e))?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let Some(title) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!(path = %path.display(), "skipping non UTF-8 file name");
                continue;
            };
            articles.push(CachedArticle {
                title: title.to_string(),
                path,
            });
        }

        articles.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
        Ok(articles)
    }

    /// Download or load every page in order.
    pub fn crawl(&self, client: &Client, pages: &[PageRef], opts: CrawlOptions) -> Result<CrawlStats> {
        self.crawl_with(pages, opts, |url| fetcher::fetch_html(client, url))
    }

    pub fn crawl_with<F>(&self, pages: &[PageRef], opts: CrawlOptions, mut fetch: F) -> Result<CrawlStats>
    where
        F: FnMut(&Url) -> Result<String>,
    {
        let mut stats = CrawlStats {
            listed: pages.len(),
            ..Default::default()
        };
        let mut downloaded_before = false;

        for (i, page) in pages.iter().enumerate() {
            let is_last = i + 1 == pages.len();
            info!("Processing page {}/{}", i + 1, pages.len());

            let force = opts.force || (opts.refresh_last && is_last);
            let outcome = self.load_or_fetch(page, force, |url| {
                if downloaded_before && !opts.delay.is_zero() {
                    thread::sleep(opts.delay);
                }
                downloaded_before = true;
                fetch(url)
            })?;

            match outcome {
                Outcome::Cached => stats.cached += 1,
                Outcome::Downloaded(_) => stats.downloaded += 1,
                Outcome::Failed => stats.failed += 1,
            }
        }

        info!(
            listed = stats.listed,
            cached = stats.cached,
            downloaded = stats.downloaded,
            failed = stats.failed,
            "crawl finished"
        );
        Ok(stats)
    }
}
