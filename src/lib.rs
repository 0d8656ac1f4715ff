//! ff-scrape: a polite story archive crawler
//!
//! This crate crawls a paginated story listing, fetches every chapter of every
//! listed story through a single-flight throttled request queue, and keeps a
//! versioned JSON file tree of what it found. Incremental runs walk the
//! listing by update recency and stop once they have caught up.

pub mod config;
pub mod crawler;
pub mod model;
pub mod output;
pub mod site;
pub mod state;
pub mod storage;

use thiserror::Error;

pub use crawler::{ParseError, TransportError};

/// Main error type for crawl operations
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to parse {url}: {source}")]
    Parse { url: String, source: ParseError },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("firstPage={first} must not be greater than lastPage={last}")]
    PageOrder { first: u32, last: u32 },

    #[error("Page numbers start at 1, got {0}")]
    InvalidPage(u32),

    #[error("The `{0}` command needs the key of an existing run (--key)")]
    MissingRunKey(&'static str),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A fetch that could not be completed after all retries
#[derive(Debug, Clone, Error)]
#[error("Request to {url} failed: {cause}")]
pub struct FetchError {
    pub url: String,
    pub cause: TransportError,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, FfnParser, Parser, Priority, RequestThrottler};
pub use model::{Chapter, Story};
pub use state::ScanState;
pub use storage::ContentStore;
