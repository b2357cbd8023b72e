//! Batch rendering: cached articles → cover + contents + one section per article.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::batch::{plan_batches, Batch, DEFAULT_BATCH_SIZE};
use crate::cache::ArticleCache;
use crate::error::{Error, Result};
use crate::{escape_html, pdf};

const BASE_CSS: &str = include_str!("../styles.css");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PDF via WeasyPrint.
    #[default]
    Pdf,
    /// The assembled HTML document, written as-is.
    Html,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Html => "html",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub batch_size: usize,
    pub format: OutputFormat,
    pub weasyprint: String,
    pub toc: bool,
    /// Shown on the cover page, usually the wiki host.
    pub site_name: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            format: OutputFormat::Pdf,
            weasyprint: "weasyprint".to_string(),
            toc: true,
            site_name: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub batches: usize,
    pub written: usize,
    pub failed: usize,
}

/// Title and text of one article inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleText {
    pub title: String,
    pub text: String,
}

/// Split article text on blank lines, dropping empty pieces.
pub fn paragraphs(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        if line.trim().is_empty() {
            if let Some(s) = start.take() {
                out.push(text[s..end].trim());
            }
        } else {
            start.get_or_insert(offset);
            end = offset + line.len();
        }
        offset += line.len();
    }
    if let Some(s) = start {
        out.push(text[s..end].trim());
    }

    out
}

/// Assemble one self-contained HTML document for a batch.
pub fn build_batch_html(articles: &[ArticleText], opts: &RenderOptions) -> String {
    let first = articles.first().map(|a| a.title.as_str()).unwrap_or_default();
    let last = articles.last().map(|a| a.title.as_str()).unwrap_or_default();

    // -------- Cover Page --------
    let today = chrono::Local::now().format("%B %e, %Y").to_string();
    let cover_html = format!(
        "<section class=\"cover-page\">
            <h1 class=\"cover-title\">{site}</h1>
            <h2 class=\"cover-subtitle\">Articles {first} to {last}</h2>
            <p class=\"cover-date\">wikipdf · {date}</p>
        </section>",
        site = escape_html(&opts.site_name),
        first = escape_html(first),
        last = escape_html(last),
        date = today.trim()
    );

    // -------- TOC --------
    let toc_html = if opts.toc {
        let mut toc_items = String::new();
        for (idx, article) in articles.iter().enumerate() {
            toc_items.push_str(&format!(
                "<li><a href=\"#article-{}\">{}</a></li>\n",
                idx + 1,
                escape_html(&article.title)
            ));
        }
        format!(
            "<section class=\"toc-page\">
            <h1 class=\"toc-title\">Contents</h1>
            <ul class=\"toc-list\">
            {toc_items}
            </ul>
        </section>"
        )
    } else {
        String::new()
    };

    // -------- Article Blocks --------
    let mut article_blocks = String::new();
    for (idx, article) in articles.iter().enumerate() {
        article_blocks.push_str(&format!(
            "<section id=\"article-{}\" class=\"article-block\">\n<h1>{}</h1>\n",
            idx + 1,
            escape_html(&article.title)
        ));
        for para in paragraphs(&article.text) {
            article_blocks.push_str(&format!("<p>{}</p>\n", escape_html(para)));
        }
        article_blocks.push_str("</section>\n");
    }

    format!(
        "<!DOCTYPE html>
<html>
<head>
<meta charset=\"utf-8\">
<title>{title}</title>
<style>
{base_css}
</style>
</head>
<body>
{cover}
{toc}
{articles}
</body>
</html>
",
        title = escape_html(&format!("{first} to {last}")),
        base_css = BASE_CSS,
        cover = cover_html,
        toc = toc_html,
        articles = article_blocks
    )
}

fn load_batch(batch: &Batch) -> Result<Vec<ArticleText>> {
    batch
        .articles
        .iter()
        .map(|a| {
            let text = fs::read_to_string(&a.path).map_err(|e| Error::io(&a.path, e))?;
            Ok(ArticleText {
                title: a.title.clone(),
                text,
            })
        })
        .collect()
}

fn render_batch(batch: &Batch, output_dir: &Path, opts: &RenderOptions) -> Result<PathBuf> {
    let articles = load_batch(batch)?;
    let html = build_batch_html(&articles, opts);
    let output = output_dir.join(format!("{}.{}", batch.file_stem(), opts.format.extension()));

    match opts.format {
        OutputFormat::Pdf => pdf::generate_pdf(&html, &output, &opts.weasyprint)?,
        OutputFormat::Html => fs::write(&output, html).map_err(|e| Error::io(&output, e))?,
    }
    Ok(output)
}

/// Render every cached article in batches of `opts.batch_size`.
///
/// A batch that fails is logged and skipped; the remaining batches still run.
pub fn render_cache(cache: &ArticleCache, output_dir: &Path, opts: &RenderOptions) -> Result<RenderStats> {
    if opts.batch_size == 0 {
        return Err(Error::InvalidConfig("batch_size must be at least 1".into()));
    }
    fs::create_dir_all(output_dir).map_err(|e| Error::io(output_dir, e))?;

    let articles = cache.list()?;
    let batches = plan_batches(&articles, opts.batch_size);
    let mut stats = RenderStats {
        batches: batches.len(),
        ..Default::default()
    };

    if batches.is_empty() {
        warn!(cache = %cache.dir().display(), "cache is empty; nothing to render");
        return Ok(stats);
    }

    for batch in &batches {
        let name = format!("{}.{}", batch.file_stem(), opts.format.extension());
        info!(batch = batch.number, of = batches.len(), articles = batch.articles.len(), "Creating {}", name);
        match render_batch(batch, output_dir, opts) {
            Ok(path) => {
                info!(path = %path.display(), "successfully created");
                stats.written += 1;
            }
            Err(e) => {
                error!(file = %name, error = %e, "error building batch");
                stats.failed += 1;
            }
        }
    }

    Ok(stats)
}
