//! Page list discovery.
//!
//! A wiki is enumerated either through the MediaWiki `list=allpages` API or,
//! when the API is unreachable, by walking the paginated `Special:AllPages`
//! listing. Parsing is kept apart from I/O so both can be tested without a
//! network; the crawl loops take any `FnMut(&Url) -> Result<String>` fetcher.

use std::collections::{BTreeMap, HashSet};

use kuchiki::traits::*;
use kuchiki::NodeRef;
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::title_from_url;
use crate::error::{Error, Result};
use crate::fetcher;

/// One article discovered on the wiki.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRef {
    pub title: String,
    pub url: Url,
}

/// How the page list is obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PageListStrategy {
    /// MediaWiki `api.php?list=allpages`.
    Api,
    /// Scrape `Special:AllPages`.
    Html,
    /// API first, HTML crawl if the API yields nothing.
    #[default]
    Auto,
}

#[derive(Debug, Clone)]
pub struct PageListOptions {
    pub strategy: PageListStrategy,
    /// API endpoint relative to the site root, e.g. `api.php` or `w/api.php`.
    pub api_path: String,
    pub skip_redirects: bool,
}

impl Default for PageListOptions {
    fn default() -> Self {
        Self {
            strategy: PageListStrategy::Auto,
            api_path: "api.php".to_string(),
            skip_redirects: false,
        }
    }
}

/// Where the API usually lives when `api_path` is wrong (Wikipedia layout).
const FALLBACK_API_PATH: &str = "w/api.php";

/// Enumerate every article on the wiki rooted at `root`.
pub fn fetch_page_list(client: &Client, root: &Url, opts: &PageListOptions) -> Result<Vec<PageRef>> {
    collect_page_list(root, opts, |url| fetcher::fetch_html(client, url))
}

/// Strategy dispatch over an arbitrary fetcher.
pub fn collect_page_list<F>(root: &Url, opts: &PageListOptions, mut fetch: F) -> Result<Vec<PageRef>>
where
    F: FnMut(&Url) -> Result<String>,
{
    let pages = match opts.strategy {
        PageListStrategy::Api => crawl_allpages_api(root, &opts.api_path, opts.skip_redirects, &mut fetch)?,
        PageListStrategy::Html => crawl_allpages_html(root, opts.skip_redirects, &mut fetch)?,
        PageListStrategy::Auto => {
            let mut found = Vec::new();
            let mut candidates = vec![opts.api_path.as_str()];
            if opts.api_path != FALLBACK_API_PATH {
                candidates.push(FALLBACK_API_PATH);
            }
            for api_path in candidates {
                match crawl_allpages_api(root, api_path, opts.skip_redirects, &mut fetch) {
                    Ok(pages) if !pages.is_empty() => {
                        found = pages;
                        break;
                    }
                    Ok(_) => debug!(api_path, "API returned no pages"),
                    Err(e) => debug!(api_path, error = %e, "API unavailable"),
                }
            }
            if found.is_empty() {
                info!("falling back to Special:AllPages crawl");
                found = crawl_allpages_html(root, opts.skip_redirects, &mut fetch)?;
            }
            found
        }
    };

    if pages.is_empty() {
        return Err(Error::NoPages);
    }
    info!(count = pages.len(), "page list complete");
    Ok(pages)
}

// ---------------------------------------------------------------------------
// API
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    query: Option<ApiQuery>,
    #[serde(default, rename = "continue")]
    continuation: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default, rename = "query-continue")]
    legacy_continuation: Option<BTreeMap<String, BTreeMap<String, serde_json::Value>>>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiQuery {
    #[serde(default)]
    allpages: Vec<ApiPage>,
}

#[derive(Debug, Deserialize)]
struct ApiPage {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    info: String,
}

/// One page of `list=allpages` results.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ApiBatch {
    pub pages: Vec<PageRef>,
    /// Query parameters to send with the next request, if any.
    pub continue_params: Option<Vec<(String, String)>>,
}

/// Parse a `list=allpages` JSON response.
pub fn parse_allpages_api(body: &str, root: &Url) -> Result<ApiBatch> {
    let resp: ApiResponse = serde_json::from_str(body)?;

    if let Some(err) = resp.error {
        return Err(Error::Api {
            code: err.code,
            info: err.info,
        });
    }

    let mut pages = Vec::new();
    for page in resp.query.map(|q| q.allpages).unwrap_or_default() {
        let url = article_url(root, &page.title)?;
        pages.push(PageRef {
            title: page.title,
            url,
        });
    }

    let continue_params = match (resp.continuation, resp.legacy_continuation) {
        (Some(map), _) => Some(value_pairs(map)),
        (None, Some(legacy)) => legacy.into_values().next().map(value_pairs),
        (None, None) => None,
    };

    Ok(ApiBatch {
        pages,
        continue_params,
    })
}

fn value_pairs(map: BTreeMap<String, serde_json::Value>) -> Vec<(String, String)> {
    map.into_iter()
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect()
}

fn api_request_url(
    root: &Url,
    api_path: &str,
    skip_redirects: bool,
    continue_params: &[(String, String)],
) -> Result<Url> {
    let mut url = root.join(api_path.trim_start_matches('/'))?;
    {
        let mut q = url.query_pairs_mut();
        q.append_pair("action", "query")
            .append_pair("list", "allpages")
            .append_pair("apnamespace", "0")
            .append_pair("aplimit", "max")
            .append_pair("format", "json");
        if skip_redirects {
            q.append_pair("apfilterredir", "nonredirects");
        }
        for (k, v) in continue_params {
            q.append_pair(k, v);
        }
    }
    Ok(url)
}

/// Follow `list=allpages` continuation until the API reports no more pages.
pub fn crawl_allpages_api<F>(root: &Url, api_path: &str, skip_redirects: bool, fetch: &mut F) -> Result<Vec<PageRef>>
where
    F: FnMut(&Url) -> Result<String>,
{
    let mut pages = Vec::new();
    let mut continue_params: Vec<(String, String)> = Vec::new();
    let mut seen_tokens = HashSet::new();

    loop {
        let url = api_request_url(root, api_path, skip_redirects, &continue_params)?;
        let body = fetch(&url)?;
        let batch = parse_allpages_api(&body, root)?;
        debug!(%url, count = batch.pages.len(), "API batch");
        pages.extend(batch.pages);

        match batch.continue_params {
            Some(next) if seen_tokens.insert(next.clone()) => {
                info!(total = pages.len(), "continuing page list");
                continue_params = next;
            }
            _ => break,
        }
    }

    Ok(pages)
}

/// `<root>wiki/<Title_with_underscores>`; subpage slashes stay literal.
pub fn article_url(root: &Url, title: &str) -> Result<Url> {
    let mut url = root.join("wiki/")?;
    let underscored = title.replace(' ', "_");
    url.path_segments_mut()
        .map_err(|_| Error::NoHost(root.to_string()))?
        .pop_if_empty()
        .extend(underscored.split('/'));
    Ok(url)
}

// ---------------------------------------------------------------------------
// Special:AllPages
// ---------------------------------------------------------------------------

/// One page of the `Special:AllPages` listing.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AllPagesListing {
    pub pages: Vec<PageRef>,
    pub next: Option<Url>,
}

/// Parse a `Special:AllPages` listing. `page_url` resolves relative links.
pub fn parse_allpages_html(html: &str, page_url: &Url, skip_redirects: bool) -> AllPagesListing {
    let document = kuchiki::parse_html().one(html);
    let mut listing = AllPagesListing::default();

    if let Ok(anchors) = document.select("div.mw-allpages-body a[href]") {
        for anchor in anchors {
            if skip_redirects && within_class(anchor.as_node(), "allpagesredirect") {
                continue;
            }
            let attrs = anchor.attributes.borrow();
            let Some(href) = attrs.get("href") else {
                continue;
            };
            let url = match page_url.join(href) {
                Ok(u) => u,
                Err(e) => {
                    warn!(href, error = %e, "skipping unresolvable link");
                    continue;
                }
            };
            let title = attrs
                .get("title")
                .map(str::to_string)
                .or_else(|| {
                    let text = anchor.as_node().text_contents();
                    let text = text.trim();
                    (!text.is_empty()).then(|| text.to_string())
                })
                .unwrap_or_else(|| title_from_url(&url));
            listing.pages.push(PageRef { title, url });
        }
    }

    if let Ok(anchors) = document.select("a[href]") {
        listing.next = anchors
            .filter(|a| a.as_node().text_contents().trim_start().starts_with("Next page"))
            .find_map(|a| {
                let attrs = a.attributes.borrow();
                let next = attrs.get("href").and_then(|href| page_url.join(href).ok());
                next
            });
    }

    listing
}

fn within_class(node: &NodeRef, class: &str) -> bool {
    node.inclusive_ancestors().any(|n| {
        n.as_element()
            .and_then(|el| {
                el.attributes
                    .borrow()
                    .get("class")
                    .map(|c| c.split_whitespace().any(|c| c == class))
            })
            .unwrap_or(false)
    })
}

/// Walk `Special:AllPages` via its "Next page" links.
///
/// A listing that fails to download ends the walk with what was collected.
pub fn crawl_allpages_html<F>(root: &Url, skip_redirects: bool, fetch: &mut F) -> Result<Vec<PageRef>>
where
    F: FnMut(&Url) -> Result<String>,
{
    let mut pages = Vec::new();
    let mut visited = HashSet::new();
    let mut next = Some(root.join("wiki/Special:AllPages")?);

    info!(start = %root, "scraping Special:AllPages");

    while let Some(url) = next.take() {
        if !visited.insert(url.clone()) {
            warn!(%url, "listing already visited; stopping");
            break;
        }

        let html = match fetch(&url) {
            Ok(body) => body,
            Err(e) => {
                warn!(%url, error = %e, "error downloading page list");
                break;
            }
        };

        let listing = parse_allpages_html(&html, &url, skip_redirects);
        debug!(%url, count = listing.pages.len(), "listing parsed");
        pages.extend(listing.pages);

        if let Some(ref n) = listing.next {
            info!(next = %n, "found next page");
        }
        next = listing.next;
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn root() -> Url {
        Url::parse("https://wiki.example.org/").unwrap()
    }

    const LISTING: &str = r#"
        <html><body>
        <div class="mw-allpages-nav"><a href="/index.php?title=Special:AllPages&amp;from=Gamma" title="Special:AllPages">Next page (Gamma)</a></div>
        <div class="mw-allpages-body">
          <ul class="mw-allpages-chunk">
            <li><a href="/wiki/Alpha" title="Alpha">Alpha</a></li>
            <li class="allpagesredirect"><a href="/wiki/Alfa" title="Alfa">Alfa</a></li>
            <li><a href="/wiki/Beta_Test">Beta Test</a></li>
            <li><a href="/wiki/Dryad%27s_Blessing"><img src="x.png"></a></li>
          </ul>
        </div>
        <a href="/wiki/Outside">Outside</a>
        </body></html>"#;

    #[test]
    fn listing_collects_body_links_and_next() {
        let page = root().join("wiki/Special:AllPages").unwrap();
        let listing = parse_allpages_html(LISTING, &page, false);

        let titles: Vec<_> = listing.pages.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["Alpha", "Alfa", "Beta Test", "Dryad's Blessing"]);
        assert_eq!(listing.pages[2].url.as_str(), "https://wiki.example.org/wiki/Beta_Test");
        assert_eq!(
            listing.next.unwrap().as_str(),
            "https://wiki.example.org/index.php?title=Special:AllPages&from=Gamma"
        );
    }

    #[test]
    fn listing_can_skip_redirects() {
        let page = root().join("wiki/Special:AllPages").unwrap();
        let listing = parse_allpages_html(LISTING, &page, true);
        let titles: Vec<_> = listing.pages.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["Alpha", "Beta Test", "Dryad's Blessing"]);
    }

    #[test]
    fn listing_without_body_is_empty() {
        let listing = parse_allpages_html("<html><body><p>nothing</p></body></html>", &root(), false);
        assert_eq!(listing, AllPagesListing::default());
    }

    #[test]
    fn html_crawl_follows_next_links_and_stops_on_cycle() {
        let first = root().join("wiki/Special:AllPages").unwrap();
        let second = root().join("index.php?title=Special:AllPages&from=Gamma").unwrap();
        let mut bodies = HashMap::new();
        bodies.insert(first.to_string(), LISTING.to_string());
        bodies.insert(
            second.to_string(),
            r#"<div class="mw-allpages-body"><a href="/wiki/Gamma" title="Gamma">Gamma</a></div>
               <a href="/wiki/Special:AllPages">Next page (loops)</a>"#
                .to_string(),
        );

        let mut fetch = |u: &Url| {
            bodies
                .get(u.as_str())
                .cloned()
                .ok_or_else(|| Error::Render(format!("unexpected {u}")))
        };
        let pages = crawl_allpages_html(&root(), false, &mut fetch).unwrap();
        let titles: Vec<_> = pages.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["Alpha", "Alfa", "Beta Test", "Dryad's Blessing", "Gamma"]);
    }

    #[test]
    fn html_crawl_keeps_partial_results_on_failure() {
        let first = root().join("wiki/Special:AllPages").unwrap();
        let mut fetch = |u: &Url| {
            if *u == first {
                Ok(LISTING.to_string())
            } else {
                Err(Error::Render("offline".into()))
            }
        };
        let pages = crawl_allpages_html(&root(), false, &mut fetch).unwrap();
        assert_eq!(pages.len(), 4);
    }

    #[test]
    fn api_batch_with_modern_continuation() {
        let body = r#"{
            "batchcomplete": "",
            "continue": {"apcontinue": "Gamma", "continue": "-||"},
            "query": {"allpages": [
                {"pageid": 1, "ns": 0, "title": "Alpha"},
                {"pageid": 2, "ns": 0, "title": "Beta Test"}
            ]}
        }"#;
        let batch = parse_allpages_api(body, &root()).unwrap();
        assert_eq!(batch.pages.len(), 2);
        assert_eq!(batch.pages[1].url.as_str(), "https://wiki.example.org/wiki/Beta_Test");
        assert_eq!(
            batch.continue_params.unwrap(),
            vec![
                ("apcontinue".to_string(), "Gamma".to_string()),
                ("continue".to_string(), "-||".to_string()),
            ]
        );
    }

    #[test]
    fn api_batch_with_legacy_continuation() {
        let body = r#"{
            "query-continue": {"allpages": {"apcontinue": "Zeta"}},
            "query": {"allpages": [{"title": "Eta"}]}
        }"#;
        let batch = parse_allpages_api(body, &root()).unwrap();
        assert_eq!(
            batch.continue_params.unwrap(),
            vec![("apcontinue".to_string(), "Zeta".to_string())]
        );
    }

    #[test]
    fn api_error_is_reported() {
        let body = r#"{"error": {"code": "readapidenied", "info": "You need read permission"}}"#;
        match parse_allpages_api(body, &root()) {
            Err(Error::Api { code, .. }) => assert_eq!(code, "readapidenied"),
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[test]
    fn article_url_encodes_title() {
        let url = article_url(&root(), "What? #1/Sub page").unwrap();
        assert_eq!(
            url.as_str(),
            "https://wiki.example.org/wiki/What%3F_%231/Sub_page"
        );
    }

    #[test]
    fn auto_falls_back_to_html_when_api_missing() {
        let listing = root().join("wiki/Special:AllPages").unwrap();
        let mut api_calls = 0;
        let fetch = |u: &Url| {
            if u.path().ends_with("api.php") {
                api_calls += 1;
                Ok("<html>not json</html>".to_string())
            } else if *u == listing {
                Ok(r#"<div class="mw-allpages-body"><a href="/wiki/Only" title="Only">Only</a></div>"#.to_string())
            } else {
                Err(Error::Render("unexpected".into()))
            }
        };
        let pages = collect_page_list(&root(), &PageListOptions::default(), fetch).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(api_calls, 2);
    }

    #[test]
    fn api_strategy_follows_continuation() {
        let fetch = |u: &Url| {
            let has_token = u.query_pairs().any(|(k, v)| k == "apcontinue" && v == "B");
            Ok(if has_token {
                r#"{"query": {"allpages": [{"title": "B"}]}}"#.to_string()
            } else {
                r#"{"continue": {"apcontinue": "B", "continue": "-||"}, "query": {"allpages": [{"title": "A"}]}}"#
                    .to_string()
            })
        };
        let opts = PageListOptions {
            strategy: PageListStrategy::Api,
            ..Default::default()
        };
        let pages = collect_page_list(&root(), &opts, fetch).unwrap();
        let titles: Vec<_> = pages.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["A", "B"]);
    }

    #[test]
    fn api_crawl_stops_on_repeated_continuation() {
        let mut calls = 0;
        let mut fetch = |_: &Url| {
            calls += 1;
            Ok(r#"{"continue": {"apcontinue": "Loop", "continue": "-||"}, "query": {"allpages": [{"title": "A"}]}}"#
                .to_string())
        };
        let pages = crawl_allpages_api(&root(), "api.php", false, &mut fetch).unwrap();
        assert_eq!(calls, 2);
        assert_eq!(pages.len(), 2);
    }

    #[test]
    fn empty_listing_is_no_pages() {
        let opts = PageListOptions {
            strategy: PageListStrategy::Html,
            ..Default::default()
        };
        let result = collect_page_list(&root(), &opts, |_| Ok(String::new()));
        assert!(matches!(result, Err(Error::NoPages)));
    }
}
