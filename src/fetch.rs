//! Bounded HTTP download of inbound images.
//!
//! Every remote fetch in the engine goes through one [`ImageFetcher`]: a
//! shared `reqwest` client with a total request timeout, so a stalled
//! provider CDN surfaces as a failure instead of an indefinite hang.

use std::time::Duration;

use reqwest::Client;

/// Default cap on a single image download.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("download error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected HTTP status {status} fetching {url}")]
    Status { status: u16, url: String },
    #[error("empty response body from {url}")]
    EmptyBody { url: String },
}

/// HTTP image downloader with a bounded per-request timeout.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: Client,
}

impl ImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Downloads `url` and returns the raw body bytes.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        log::debug!("fetching image from {url}");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(FetchError::EmptyBody {
                url: url.to_string(),
            });
        }
        log::debug!("fetched {} bytes from {url}", bytes.len());
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetcher_builds_with_default_timeout() {
        assert!(ImageFetcher::new(DEFAULT_FETCH_TIMEOUT).is_ok());
    }

    #[tokio::test]
    async fn invalid_url_is_a_fetch_error() {
        let fetcher = ImageFetcher::new(Duration::from_secs(1)).unwrap();
        let result = fetcher.fetch("http://127.0.0.1:1/nothing-here.jpg").await;
        assert!(matches!(result, Err(FetchError::Http(_))));
    }
}
