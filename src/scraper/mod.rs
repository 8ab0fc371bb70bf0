pub mod http_client;
pub mod parsers;

use crate::config::ListingConfig;
use crate::models::TickerRecord;
use crate::utils::Pacer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, info};
use url::Url;

use self::http_client::HttpClient;
use self::parsers::parse_listing_page;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable listing source abstraction.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Records on one listing page (1-based). Fetch errors propagate as-is.
    async fn fetch_page(&self, page: u32) -> Result<Vec<TickerRecord>>;
}

// ── kabutan scraper ───────────────────────────────────────────────────────────

pub struct KabutanScraper {
    client: HttpClient,
    config: ListingConfig,
}

impl KabutanScraper {
    pub fn new(config: &ListingConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
            config: config.clone(),
        })
    }

    /// URL for one page of the 52-week-high listing.
    pub fn listing_url(&self, page: u32) -> Result<Url> {
        let page = page.to_string();
        let pairs = self
            .config
            .query_pairs()
            .into_iter()
            .chain([("page", page.as_str())]);

        Url::parse_with_params(&self.config.base_url, pairs)
            .with_context(|| format!("Bad listing base URL {:?}", self.config.base_url))
    }
}

#[async_trait]
impl ListingSource for KabutanScraper {
    async fn fetch_page(&self, page: u32) -> Result<Vec<TickerRecord>> {
        let url = self.listing_url(page)?;
        info!("Fetching listing page {} ({})", page, url);

        let html = self
            .client
            .get_text(&url)
            .await
            .with_context(|| format!("Failed to fetch listing page {}", page))?;

        let parsed = parse_listing_page(&html)?;
        for skip in &parsed.skipped {
            debug!("page {}: skipped row: {}", page, skip);
        }

        Ok(parsed.records)
    }
}

// ── Collection ────────────────────────────────────────────────────────────────

/// Walk listing pages `1..=max_pages`, stopping at the first empty page.
///
/// Pauses after every non-empty page. The result keeps page-scan order with
/// exact duplicates removed (first occurrence wins).
pub async fn collect_listing(
    source: &dyn ListingSource,
    max_pages: u32,
    pacer: Pacer,
) -> Result<Vec<TickerRecord>> {
    let mut all_records = Vec::new();

    for page in 1..=max_pages {
        let records = source.fetch_page(page).await?;

        if records.is_empty() {
            debug!("Empty page {} — stopping pagination", page);
            break;
        }

        info!("  Page {}: {} tickers", page, records.len());
        all_records.extend(records);

        if page == max_pages {
            info!("Reached page limit ({}), stopping", max_pages);
        }
        pacer.pause().await;
    }

    let unique = dedup_records(all_records);
    info!("Total 52-week-high tickers: {}", unique.len());
    Ok(unique)
}

/// Drop exact-duplicate rows, keeping the first occurrence in place.
pub fn dedup_records(records: Vec<TickerRecord>) -> Vec<TickerRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|r| seen.insert(r.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TickerCode;
    use std::sync::Mutex;
    use std::time::Duration;

    fn rec(code: &str, name: &str) -> TickerRecord {
        TickerRecord {
            code: TickerCode::parse(code).unwrap(),
            name: name.to_string(),
            market: "東Ｐ".to_string(),
            per: "12.0".to_string(),
            pbr: "1.1".to_string(),
        }
    }

    /// Serves canned pages and records which pages were requested.
    struct FakeListing {
        pages: Vec<Vec<TickerRecord>>,
        requested: Mutex<Vec<u32>>,
    }

    impl FakeListing {
        fn new(pages: Vec<Vec<TickerRecord>>) -> Self {
            Self { pages, requested: Mutex::new(Vec::new()) }
        }

        fn requested(&self) -> Vec<u32> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ListingSource for FakeListing {
        async fn fetch_page(&self, page: u32) -> Result<Vec<TickerRecord>> {
            self.requested.lock().unwrap().push(page);
            Ok(self.pages.get(page as usize - 1).cloned().unwrap_or_default())
        }
    }

    struct FailingListing;

    #[async_trait]
    impl ListingSource for FailingListing {
        async fn fetch_page(&self, page: u32) -> Result<Vec<TickerRecord>> {
            anyhow::bail!("connection refused on page {}", page)
        }
    }

    fn no_pause() -> Pacer {
        Pacer::new(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_stops_after_first_empty_page() {
        let source = FakeListing::new(vec![
            vec![rec("1301", "極洋"), rec("1332", "ニッスイ"), rec("7203", "トヨタ")],
            vec![],
            vec![rec("9984", "never fetched")],
        ]);

        let records = collect_listing(&source, 15, no_pause()).await.unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(source.requested(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_respects_page_ceiling() {
        let pages = (0..5).map(|i| vec![rec(&format!("100{i}"), "x")]).collect();
        let source = FakeListing::new(pages);

        let records = collect_listing(&source, 3, no_pause()).await.unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(source.requested(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_duplicates_across_pages_collapse() {
        let source = FakeListing::new(vec![
            vec![rec("1301", "極洋"), rec("7203", "トヨタ")],
            vec![rec("7203", "トヨタ"), rec("6758", "ソニーG")],
        ]);

        let records = collect_listing(&source, 2, no_pause()).await.unwrap();
        let codes: Vec<&str> = records.iter().map(|r| r.code.as_str()).collect();

        assert_eq!(codes, vec!["1301", "7203", "6758"]);
    }

    #[test]
    fn test_dedup_only_removes_exact_rows() {
        let mut renamed = rec("7203", "トヨタ");
        renamed.per = "9.9".to_string();

        let out = dedup_records(vec![rec("7203", "トヨタ"), rec("7203", "トヨタ"), renamed.clone()]);

        assert_eq!(out, vec![rec("7203", "トヨタ"), renamed]);
    }

    #[tokio::test]
    async fn test_fetch_error_propagates() {
        let err = collect_listing(&FailingListing, 15, no_pause()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("connection refused on page 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pauses_after_each_non_empty_page() {
        let source = FakeListing::new(vec![vec![rec("1301", "a")], vec![rec("1332", "b")], vec![]]);
        let before = tokio::time::Instant::now();

        collect_listing(&source, 15, Pacer::new(Duration::from_millis(1500)))
            .await
            .unwrap();

        let waited = before.elapsed();
        assert!(waited >= Duration::from_millis(3000) && waited < Duration::from_millis(4500));
    }

    #[test]
    fn test_listing_url_carries_fixed_query() {
        let scraper = KabutanScraper::new(&ListingConfig::default()).unwrap();
        let url = scraper.listing_url(2).unwrap();

        assert_eq!(
            url.as_str(),
            "https://kabutan.jp/warning/?mode=3_3&market=0&capitalization=-1&dispmode=normal&stc=code&stm=0&page=2"
        );
    }
}
