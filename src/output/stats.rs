//! Run statistics
//!
//! This module counts what a run did as it happens and prints the totals
//! once the run is over.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by every task of a run
#[derive(Debug, Default)]
pub struct RunStats {
    pages: AtomicU64,
    stories_written: AtomicU64,
    chapters_fetched: AtomicU64,
    chapters_skipped: AtomicU64,
    chapters_unchanged: AtomicU64,
    versions_rotated: AtomicU64,
    stories_changed: AtomicU64,
    stories_unchanged: AtomicU64,
}

/// Counter values at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Listing pages fetched and parsed
    pub pages: u64,
    /// `story.json` files written
    pub stories_written: u64,
    /// Chapter pages fetched
    pub chapters_fetched: u64,
    /// Chapters not fetched because they were already stored
    pub chapters_skipped: u64,
    /// Re-fetched chapters identical to the stored copy
    pub chapters_unchanged: u64,
    /// Stored chapters moved aside as a numbered version
    pub versions_rotated: u64,
    /// Update mode: stories that were new or had changed
    pub stories_changed: u64,
    /// Update mode: stories that had not changed
    pub stories_unchanged: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self) {
        self.pages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn story_written(&self) {
        self.stories_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chapter_fetched(&self) {
        self.chapters_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chapter_skipped(&self) {
        self.chapters_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chapter_unchanged(&self) {
        self.chapters_unchanged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn version_rotated(&self) {
        self.versions_rotated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn story_changed(&self) {
        self.stories_changed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn story_unchanged(&self) {
        self.stories_unchanged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pages: self.pages.load(Ordering::Relaxed),
            stories_written: self.stories_written.load(Ordering::Relaxed),
            chapters_fetched: self.chapters_fetched.load(Ordering::Relaxed),
            chapters_skipped: self.chapters_skipped.load(Ordering::Relaxed),
            chapters_unchanged: self.chapters_unchanged.load(Ordering::Relaxed),
            versions_rotated: self.versions_rotated.load(Ordering::Relaxed),
            stories_changed: self.stories_changed.load(Ordering::Relaxed),
            stories_unchanged: self.stories_unchanged.load(Ordering::Relaxed),
        }
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `key` - The run the statistics belong to
/// * `stats` - The statistics to display
pub fn print_statistics(key: &str, stats: &StatsSnapshot) {
    println!("=== Run Statistics ({}) ===\n", key);

    println!("Listing:");
    println!("  Pages fetched: {}", stats.pages);
    println!("  Stories written: {}", stats.stories_written);
    println!();

    println!("Chapters:");
    println!("  Fetched: {}", stats.chapters_fetched);
    println!("  Skipped (already stored): {}", stats.chapters_skipped);
    println!("  Unchanged on re-fetch: {}", stats.chapters_unchanged);
    println!("  Versions kept: {}", stats.versions_rotated);
    println!();

    if stats.stories_changed + stats.stories_unchanged > 0 {
        println!("Update:");
        println!("  Stories new or changed: {}", stats.stories_changed);
        println!("  Stories unchanged: {}", stats.stories_unchanged);
        println!();
    }
}
