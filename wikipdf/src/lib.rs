pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod pagelist;
pub mod pdf;
pub mod render;

use tracing::info;

pub use config::{expand_tilde_path, load_config_from_path, Config, Overrides, Settings};
pub use error::{Error, Result};

use cache::{ArticleCache, CrawlStats};
use render::RenderStats;

/// What a full run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub crawl: Option<CrawlStats>,
    pub render: Option<RenderStats>,
}

/// High-level pipeline:
///
/// wiki URL
/// → site root
/// → page list (API or Special:AllPages)
/// → cache folder (download or reuse one text file per article)
/// → batches of cached files
/// → one PDF per batch
///
/// This is the top-level API used by the CLI.
pub fn run(settings: &Settings) -> Result<Summary> {
    let cache = ArticleCache::open(&settings.cache_dir)?;
    let mut summary = Summary::default();

    if !settings.skip_crawl {
        let client = fetcher::build_client(&settings.user_agent)?;
        info!(root = %settings.root, cache = %cache.dir().display(), "crawling wiki");
        let pages = pagelist::fetch_page_list(&client, &settings.root, &settings.page_list)?;
        summary.crawl = Some(cache.crawl(&client, &pages, settings.crawl)?);
    }

    if !settings.skip_render {
        summary.render = Some(render::render_cache(&cache, &settings.output_dir, &settings.render)?);
    }

    Ok(summary)
}

/// Replace characters that are unsafe in file names with `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '\\' | '/' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_filename(r#"a\b/c*d?e"f<g>h|i"#), "a_b_c_d_e_f_g_h_i");
        assert_eq!(sanitize_filename("tab\there"), "tab_here");
        assert_eq!(sanitize_filename("Dryad's Blessing: 2"), "Dryad's Blessing: 2");
    }

    #[test]
    fn escape_html_covers_markup_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }
}
