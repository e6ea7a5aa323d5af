//! Where slide data comes from: a local directory or an HTTP(S) base URL.

use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use reqwest::{StatusCode, Url};
use tracing::debug;

use crate::error::FetchError;

/// Byte-level access to files relative to a data root.
pub trait DataSource: Send + Sync + 'static {
    fn fetch(&self, path: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

/// Reads files below a directory.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

impl DataSource for DirSource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let full = self.root.join(path.trim_start_matches('/'));
        debug!(path = %full.display(), "reading data file");
        tokio::fs::read(&full).await.map_err(|err| match err.kind() {
            ErrorKind::NotFound => FetchError::NotFound {
                path: path.to_string(),
            },
            _ => FetchError::Transport {
                path: path.to_string(),
                message: err.to_string(),
            },
        })
    }
}

/// Fetches files relative to a base URL.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base: Url,
}

impl HttpSource {
    pub fn new(base: &str) -> Result<Self> {
        let mut base = base.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base).with_context(|| format!("invalid data root URL {base}"))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base,
        })
    }
}

impl DataSource for HttpSource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let transport = |message: String| FetchError::Transport {
            path: path.to_string(),
            message,
        };
        let url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|e| transport(e.to_string()))?;
        debug!(%url, "requesting data file");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport(e.to_string()))?;
        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(FetchError::NotFound {
                    path: path.to_string(),
                });
            }
            status => {
                return Err(FetchError::Status {
                    path: path.to_string(),
                    status: status.as_u16(),
                });
            }
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| transport(e.to_string()))?;
        Ok(body.to_vec())
    }
}

/// Either source, chosen from the configured data root.
#[derive(Debug, Clone)]
pub enum AnySource {
    Dir(DirSource),
    Http(HttpSource),
}

impl AnySource {
    /// `http://` and `https://` roots are fetched over the network; anything
    /// else is treated as a directory.
    pub fn from_data_root(root: &str) -> Result<Self> {
        if root.starts_with("http://") || root.starts_with("https://") {
            Ok(Self::Http(HttpSource::new(root)?))
        } else {
            Ok(Self::Dir(DirSource::new(root)))
        }
    }
}

impl DataSource for AnySource {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        match self {
            Self::Dir(source) => source.fetch(path).await,
            Self::Http(source) => source.fetch(path).await,
        }
    }
}
