use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for ff-scrape
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub throttle: ThrottleConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Which listing is crawled and where it lives
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Scheme and host of the archive
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Category path of the listing (e.g. "anime/RWBY")
    pub category: String,

    /// Rating filter passed through to the listing (`10` means all ratings)
    pub rating: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.fanfiction.net".to_string(),
            category: "anime/RWBY".to_string(),
            rating: "10".to_string(),
        }
    }
}

/// Named delay presets for the request throttler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayProfile {
    /// Full-weight crawling: 2.5 to 5 seconds between requests
    #[default]
    Standard,
    /// Re-fetching individual pages and chapters: 0.5 to 0.75 seconds
    Light,
}

impl DelayProfile {
    /// Returns the `(min, max)` delay in milliseconds for this profile
    pub fn bounds(&self) -> (u64, u64) {
        match self {
            Self::Standard => (2500, 5000),
            Self::Light => (500, 750),
        }
    }
}

/// Request throttling and retry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Preset used for any delay bound that is not given explicitly
    pub profile: DelayProfile,

    /// Minimum delay before each request (milliseconds)
    #[serde(rename = "min-delay")]
    pub min_delay: Option<u64>,

    /// Maximum delay before each request (milliseconds)
    #[serde(rename = "max-delay")]
    pub max_delay: Option<u64>,

    /// Total attempts for a single request before it fails
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Run-wide failure count at which all retrying stops
    #[serde(rename = "failure-ceiling")]
    pub failure_ceiling: u32,
}

impl ThrottleConfig {
    /// Effective minimum delay in milliseconds
    pub fn min_delay_ms(&self) -> u64 {
        self.min_delay.unwrap_or(self.profile.bounds().0)
    }

    /// Effective maximum delay in milliseconds
    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay.unwrap_or(self.profile.bounds().1)
    }

    /// A throttle with no delay at all, for tests and local mirrors
    pub fn immediate() -> Self {
        Self {
            min_delay: Some(0),
            max_delay: Some(0),
            ..Self::default()
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            profile: DelayProfile::Standard,
            min_delay: None,
            max_delay: None,
            max_attempts: 3,
            failure_ceiling: 10,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "ff-scrape".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/ff-scrape".to_string(),
            contact_email: "crawler@example.com".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Formats the `User-Agent` header value
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory holding one subdirectory per run key
    #[serde(rename = "out-dir")]
    pub out_dir: PathBuf,

    /// Save the raw body of every response under the run's dump directory
    #[serde(rename = "dump-html")]
    pub dump_html: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from(".").join("output"),
            dump_html: false,
        }
    }
}
