use crate::config::ListingConfig;
use anyhow::{Context, Result};
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Plain GET client for the listing site. One attempt per request; callers
/// own pacing.
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &ListingConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)
                .context("Invalid Accept-Language header")?,
        );
        headers.insert(
            REFERER,
            HeaderValue::from_str(&config.referer).context("Invalid Referer header")?,
        );

        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Accept cookies so session-based pages work
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { inner })
    }

    /// Fetch a URL as text. Non-2xx statuses are errors.
    pub async fn get_text(&self, url: &Url) -> Result<String> {
        debug!("GET {}", url);

        let resp = self
            .inner
            .get(url.as_str())
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let resp = resp
            .error_for_status()
            .with_context(|| format!("Bad status from {}", url))?;

        resp.text().await.context("Failed to read response body")
    }
}
