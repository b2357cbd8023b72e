use reqwest::blocking::Client;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

/// Trim and parse a URL, percent-encoding characters such as spaces.
///
/// Input without a scheme is rejected.
pub fn normalize_url(input: &str) -> Result<Url> {
    Ok(Url::parse(input.trim())?)
}

/// Reduce any URL on the wiki to `scheme://host[:port]/`.
pub fn site_root(url: &Url) -> Result<Url> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::NoHost(url.to_string()))?;
    let root = match url.port() {
        Some(port) => format!("{}://{}:{}/", url.scheme(), host, port),
        None => format!("{}://{}/", url.scheme(), host),
    };
    Ok(Url::parse(&root)?)
}

/// Blocking client shared by every request of a run.
pub fn build_client(user_agent: &str) -> Result<Client> {
    let client = Client::builder()
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()?;
    Ok(client)
}

/// Fetch a page and return the raw body. Non-2xx responses are errors.
pub fn fetch_html(client: &Client, url: &Url) -> Result<String> {
    debug!(%url, "GET");
    let resp = client.get(url.as_str()).send()?;

    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Status {
            url: url.to_string(),
            status,
        });
    }

    Ok(resp.text()?)
}

pub fn default_user_agent() -> String {
    format!(
        "wikipdf/{} (rust; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_escapes_unsafe_characters() {
        let url = normalize_url("  https://example.org/wiki/Foo (bar) ").unwrap();
        assert_eq!(url.as_str(), "https://example.org/wiki/Foo%20(bar)");
    }

    #[test]
    fn normalize_rejects_missing_scheme() {
        assert!(normalize_url("example.org/wiki/Foo").is_err());
    }

    #[test]
    fn site_root_drops_path_and_query() {
        let url = Url::parse("https://terraria.fandom.com/wiki/Terraria_Wiki?x=1#top").unwrap();
        assert_eq!(
            site_root(&url).unwrap().as_str(),
            "https://terraria.fandom.com/"
        );
    }

    #[test]
    fn site_root_keeps_port() {
        let url = Url::parse("http://127.0.0.1:8080/wiki/Main_Page").unwrap();
        assert_eq!(site_root(&url).unwrap().as_str(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn site_root_requires_host() {
        let url = Url::parse("file:///tmp/wiki.html").unwrap();
        assert!(matches!(site_root(&url), Err(Error::NoHost(_))));
    }

    #[test]
    fn user_agent_names_the_tool() {
        assert!(default_user_agent().starts_with("wikipdf/"));
    }
}
