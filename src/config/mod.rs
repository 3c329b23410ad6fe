pub mod site;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use self::site::{
    Combine, DetailConfig, DetailStrategy, FieldSpec, Locator, Pagination, Read, SearchConfig,
    SiteConfig, Transform,
};

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

/// WebDriver session configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserConfig {
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Driver binary to spawn before connecting, e.g. `chromedriver --port=9515`.
    #[serde(default)]
    pub driver_command: Option<String>,

    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default = "default_window_size")]
    pub window_size: (u32, u32),

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub extra_args: Vec<String>,

    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
}

/// Timing, retry and bounds for one crawl run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrawlConfig {
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,

    #[serde(default = "default_detail_timeout_ms")]
    pub detail_timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause between individual interactions (typing, tab switches).
    #[serde(default = "default_action_delay_ms")]
    pub action_delay_ms: DelayRange,

    /// Pause after a page transition.
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: DelayRange,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    #[serde(default)]
    pub skip_seen: bool,
}

/// Inclusive millisecond range a randomized pause is drawn from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DelayRange {
    pub min: u64,
    pub max: u64,
}

/// Artifact placement
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// `{site}` and `{timestamp}` are substituted.
    #[serde(default = "default_file_template")]
    pub file_template: String,

    /// Fixed artifact path; repeated runs append to it.
    #[serde(default)]
    pub append_to: Option<PathBuf>,
}

/// Run ledger configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_sites_dir")]
    pub sites_dir: PathBuf,
}

/// Operational log configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_log_prefix")]
    pub file_prefix: String,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}
fn default_true() -> bool {
    true
}
fn default_window_size() -> (u32, u32) {
    (1920, 1080)
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/116.0.5845.188 Safari/537.36"
        .to_string()
}
fn default_startup_timeout_secs() -> u64 {
    30
}
fn default_wait_timeout_ms() -> u64 {
    15_000
}
fn default_detail_timeout_ms() -> u64 {
    10_000
}
fn default_poll_interval_ms() -> u64 {
    250
}
fn default_action_delay_ms() -> DelayRange {
    DelayRange { min: 500, max: 1500 }
}
fn default_page_delay_ms() -> DelayRange {
    DelayRange { min: 2000, max: 4000 }
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    2000
}
fn default_max_pages() -> u32 {
    50
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_file_template() -> String {
    "{site}_jobs_{timestamp}.csv".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/job_crawl.duckdb")
}
fn default_sites_dir() -> PathBuf {
    PathBuf::from("sites")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("log")
}
fn default_log_prefix() -> String {
    "job_crawl.log".to_string()
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            driver_command: None,
            headless: true,
            window_size: default_window_size(),
            user_agent: default_user_agent(),
            extra_args: Vec::new(),
            startup_timeout_secs: default_startup_timeout_secs(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout_ms(),
            detail_timeout_ms: default_detail_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            action_delay_ms: default_action_delay_ms(),
            page_delay_ms: default_page_delay_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_pages: default_max_pages(),
            skip_seen: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            file_template: default_file_template(),
            append_to: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: default_db_path(),
            sites_dir: default_sites_dir(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            file_prefix: default_log_prefix(),
        }
    }
}

// ── Derived values ───────────────────────────────────────────────────────────

impl CrawlConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn detail_timeout(&self) -> Duration {
        Duration::from_millis(self.detail_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Attempts including the first try.
    pub fn attempts(&self) -> usize {
        self.max_retries as usize + 1
    }

    /// No pacing and short waits, for driving the scripted browser.
    #[cfg(test)]
    pub fn instant() -> Self {
        Self {
            wait_timeout_ms: 60,
            detail_timeout_ms: 40,
            poll_interval_ms: 2,
            action_delay_ms: DelayRange::default(),
            page_delay_ms: DelayRange::default(),
            max_retries: 1,
            retry_backoff_ms: 1,
            ..Default::default()
        }
    }
}

impl OutputConfig {
    /// Deterministic artifact path for a run started at `started`.
    pub fn artifact_path(&self, site: &str, started: chrono::NaiveDateTime) -> PathBuf {
        if let Some(fixed) = &self.append_to {
            return fixed.clone();
        }
        let name = self
            .file_template
            .replace("{site}", site)
            .replace("{timestamp}", &started.format("%Y%m%d_%H%M%S").to_string());
        self.dir.join(name)
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
            .add_source(config::Environment::with_prefix("JOB_CRAWL").separator("__"))
            .build()
            .context("Failed to read configuration sources")?;

        cfg.try_deserialize().context("Invalid application configuration")
    }

    /// Resolve a site argument: an existing file path, or a name under `sites_dir`.
    pub fn site_path(&self, site: &str) -> PathBuf {
        let direct = Path::new(site);
        if direct.is_file() {
            return direct.to_path_buf();
        }
        self.storage.sites_dir.join(format!("{}.toml", site))
    }
}
