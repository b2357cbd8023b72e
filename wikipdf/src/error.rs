use std::path::PathBuf;

/// Errors raised while crawling a wiki or rendering its cache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request to {url} failed with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("URL '{0}' has no host")]
    NoHost(String),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed API response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("wiki API error {code}: {info}")]
    Api { code: String, info: String },

    #[error("failed to parse config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("PDF rendering failed: {0}")]
    Render(String),

    #[error("no pages found")]
    NoPages,
}

impl Error {
    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
