use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub listing: ListingConfig,
    pub rating: RatingConfig,
    pub output: OutputConfig,
    pub drive: DriveConfig,
}

/// 52-week-high listing (kabutan) configuration.
///
/// The query fields are sent verbatim as `mode`, `market`, `capitalization`,
/// `dispmode`, `stc` and `stm`; `page` is appended per request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListingConfig {
    #[serde(default = "default_listing_url")]
    pub base_url: String,

    #[serde(default = "default_mode")]
    pub mode: String,

    #[serde(default = "default_market")]
    pub market: String,

    #[serde(default = "default_capitalization")]
    pub capitalization: String,

    #[serde(default = "default_dispmode")]
    pub dispmode: String,

    #[serde(default = "default_stc")]
    pub stc: String,

    #[serde(default = "default_stm")]
    pub stm: String,

    /// Upper bound on listing pages requested in one run.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    #[serde(default = "default_delay_ms")]
    pub page_delay_ms: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_accept_language")]
    pub accept_language: String,

    #[serde(default = "default_referer")]
    pub referer: String,
}

/// Performance rating (minkabu) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RatingConfig {
    #[serde(default = "default_rating_url")]
    pub base_url: String,

    /// Text of the element preceding the rating value.
    #[serde(default = "default_label")]
    pub label: String,

    /// WebDriver endpoint (chromedriver) the browser session is opened on.
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    #[serde(default = "default_timeout_secs")]
    pub wait_timeout_secs: u64,

    #[serde(default = "default_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_browser_args")]
    pub browser_args: Vec<String>,
}

/// Output file configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

/// Google Drive upload configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriveConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_folder_id")]
    pub folder_id: String,

    /// Name of the env var holding the service-account JSON blob.
    #[serde(default = "default_credentials_env")]
    pub credentials_env: String,

    #[serde(default = "default_upload_url")]
    pub upload_url: String,

    #[serde(default = "default_scope")]
    pub scope: String,

    #[serde(default = "default_drive_timeout_secs")]
    pub timeout_secs: u64,
}

impl ListingConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    /// Fixed query pairs, without `page`.
    pub fn query_pairs(&self) -> [(&'static str, &str); 6] {
        [
            ("mode", self.mode.as_str()),
            ("market", self.market.as_str()),
            ("capitalization", self.capitalization.as_str()),
            ("dispmode", self.dispmode.as_str()),
            ("stc", self.stc.as_str()),
            ("stm", self.stm.as_str()),
        ]
    }
}

impl RatingConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_listing_url() -> String {
    "https://kabutan.jp/warning/".to_string()
}
fn default_mode() -> String {
    "3_3".to_string()
}
fn default_market() -> String {
    "0".to_string()
}
fn default_capitalization() -> String {
    "-1".to_string()
}
fn default_dispmode() -> String {
    "normal".to_string()
}
fn default_stc() -> String {
    "code".to_string()
}
fn default_stm() -> String {
    "0".to_string()
}
fn default_max_pages() -> u32 {
    15
}
fn default_delay_ms() -> u64 {
    1500
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}
fn default_accept_language() -> String {
    "ja-JP,ja;q=0.9".to_string()
}
fn default_referer() -> String {
    "https://kabutan.jp/".to_string()
}
fn default_rating_url() -> String {
    "https://minkabu.jp/stock".to_string()
}
fn default_label() -> String {
    "業績評価".to_string()
}
fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}
fn default_browser_args() -> Vec<String> {
    ["--headless", "--disable-gpu", "--no-sandbox"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_file_prefix() -> String {
    "kabutan_52w".to_string()
}
fn default_folder_id() -> String {
    "1gfso7YvjiclmQ5OdA8w9v3SpTZjGCe_W".to_string()
}
fn default_credentials_env() -> String {
    "GDRIVE_SERVICE_ACCOUNT_JSON".to_string()
}
fn default_upload_url() -> String {
    "https://www.googleapis.com/upload/drive/v3/files".to_string()
}
fn default_scope() -> String {
    "https://www.googleapis.com/auth/drive".to_string()
}
fn default_drive_timeout_secs() -> u64 {
    60
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            base_url: default_listing_url(),
            mode: default_mode(),
            market: default_market(),
            capitalization: default_capitalization(),
            dispmode: default_dispmode(),
            stc: default_stc(),
            stm: default_stm(),
            max_pages: default_max_pages(),
            page_delay_ms: default_delay_ms(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            referer: default_referer(),
        }
    }
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            base_url: default_rating_url(),
            label: default_label(),
            webdriver_url: default_webdriver_url(),
            wait_timeout_secs: default_timeout_secs(),
            request_delay_ms: default_delay_ms(),
            browser_args: default_browser_args(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            file_prefix: default_file_prefix(),
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            folder_id: default_folder_id(),
            credentials_env: default_credentials_env(),
            upload_url: default_upload_url(),
            scope: default_scope(),
            timeout_secs: default_drive_timeout_secs(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::with_prefix("KABU")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to read configuration")?;

        cfg.try_deserialize().context("Invalid configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_listing_query() {
        let cfg = AppConfig::default();
        let pairs = cfg.listing.query_pairs();
        assert_eq!(pairs[0], ("mode", "3_3"));
        assert_eq!(pairs[2], ("capitalization", "-1"));
        assert_eq!(pairs[5], ("stm", "0"));
        assert_eq!(cfg.listing.max_pages, 15);
        assert_eq!(cfg.listing.page_delay(), Duration::from_millis(1500));
        assert_eq!(cfg.rating.wait_timeout(), Duration::from_secs(10));
        assert!(!cfg.drive.enabled);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[listing]\nmax_pages = 3\n\n[drive]\nenabled = true\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.listing.max_pages, 3);
        assert_eq!(cfg.listing.mode, "3_3");
        assert!(cfg.drive.enabled);
        assert_eq!(cfg.drive.credentials_env, "GDRIVE_SERVICE_ACCOUNT_JSON");
        assert_eq!(cfg.rating.label, "業績評価");
        assert_eq!(cfg.output.file_prefix, "kabutan_52w");
    }
}
