//! Crawler module for page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching behind a pluggable [`Fetch`] primitive
//! - The single-flight, retrying request queue
//! - HTML parsing of listing and chapter pages
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod parser;
mod throttle;

pub use coordinator::{ChapterOutcome, Coordinator};
pub use fetcher::{build_http_client, Fetch, HttpFetcher, TransportError};
pub use parser::{FfnParser, ParseError, Parser};
pub use throttle::{Priority, RawDump, RequestThrottler};
