//! Site addressing for ff-scrape
//!
//! This module knows how listing and chapter URLs are laid out on the archive,
//! and how a URL maps to a raw-dump file name.

use crate::config::SiteConfig;

/// Listing sort orders understood by the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingSort {
    /// Most recently updated first; used by incremental updates
    Updated,
    /// Most recently published first; stable between runs, used by full crawls
    Published,
}

impl ListingSort {
    /// The archive's `srt` query value for this sort
    pub fn query_value(&self) -> u8 {
        match self {
            Self::Updated => 1,
            Self::Published => 2,
        }
    }
}

/// URL builder for one category of the archive
#[derive(Debug, Clone)]
pub struct Site {
    base_url: String,
    category: String,
    rating: String,
}

impl Site {
    /// Creates a site from validated configuration
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            category: config.category.trim_matches('/').to_string(),
            rating: config.rating.clone(),
        }
    }

    /// URL of a 1-indexed listing page
    ///
    /// # Example
    ///
    /// ```
    /// use ff_scrape::config::SiteConfig;
    /// use ff_scrape::site::{ListingSort, Site};
    ///
    /// let site = Site::new(&SiteConfig::default());
    /// assert_eq!(
    ///     site.page_url(3, ListingSort::Published),
    ///     "https://www.fanfiction.net/anime/RWBY/?srt=2&r=10&p=3"
    /// );
    /// ```
    pub fn page_url(&self, page: u32, sort: ListingSort) -> String {
        format!(
            "{}/{}/?srt={}&r={}&p={}",
            self.base_url,
            self.category,
            sort.query_value(),
            self.rating,
            page
        )
    }

    /// URL of a 1-indexed chapter of a story
    pub fn chapter_url(&self, story_id: u64, chapter: u32) -> String {
        format!("{}/s/{}/{}", self.base_url, story_id, chapter)
    }
}

/// Filesystem-safe name for the raw dump of a URL
///
/// The scheme is dropped and path separators become dashes, so every URL
/// lands flat in the dump directory.
pub fn dump_file_name(url: &str) -> String {
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    format!("{}.html", stripped.replace('/', "-"))
}
