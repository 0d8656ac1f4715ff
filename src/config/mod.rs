//! Configuration module for ff-scrape
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section is optional; a missing file section falls back to the defaults
//! used for crawling fanfiction.net.
//!
//! # Example
//!
//! ```no_run
//! use ff_scrape::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("ff-scrape.toml")).unwrap();
//! println!("Crawling category: {}", config.site.category);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, DelayProfile, OutputConfig, SiteConfig, ThrottleConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::{validate, validate_throttle};
