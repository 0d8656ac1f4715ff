//! Crawler coordinator - main crawl orchestration logic
//!
//! This module drives the three kinds of run:
//! - Full crawls of a range of listing pages and every chapter they list
//! - Filling in missing chapters of stories already stored
//! - Incremental updates that walk the listing by update time and stop once
//!   they have caught up
//!
//! Every request goes through the [`RequestThrottler`]; the coordinator is
//! free to issue them concurrently.

use crate::config::Config;
use crate::crawler::fetcher::{Fetch, HttpFetcher};
use crate::crawler::parser::{FfnParser, Parser};
use crate::crawler::throttle::{Priority, RawDump, RequestThrottler};
use crate::model::Story;
use crate::output::{RunStats, StatsSnapshot};
use crate::site::{ListingSort, Site};
use crate::state::{ScanState, StoryUpdate};
use crate::storage::{run_root, ContentStore, DUMP_DIR};
use crate::{Result, ScrapeError};
use futures::future::try_join_all;
use std::sync::Arc;

/// What fetching one chapter did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterOutcome {
    /// Already stored; not fetched
    Skipped,
    /// Fetched, identical to the stored copy; nothing written
    Unchanged,
    /// Fetched and written to an empty slot
    Written,
    /// Fetched; the old copy was kept as this version number
    Rotated(u32),
}

/// Main crawler coordinator structure
pub struct Coordinator {
    throttler: RequestThrottler,
    parser: Arc<dyn Parser>,
    store: ContentStore,
    site: Site,
    stats: RunStats,
}

impl Coordinator {
    /// Creates a coordinator for the run `key` talking to the real site
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `key` - The run key; records live in `<out-dir>/<key>`
    pub fn new(config: &Config, key: &str) -> Result<Self> {
        let store = ContentStore::new(run_root(&config.output.out_dir, key));
        let fetcher = Arc::new(HttpFetcher::from_config(&config.user_agent)?);
        Self::with_parts(config, store, fetcher, Arc::new(FfnParser::new()))
    }

    /// Creates a coordinator from explicit collaborators
    ///
    /// Must be called inside a tokio runtime; the request queue's drain task
    /// is spawned here.
    pub fn with_parts(
        config: &Config,
        store: ContentStore,
        fetcher: Arc<dyn Fetch>,
        parser: Arc<dyn Parser>,
    ) -> Result<Self> {
        let dump = config
            .output
            .dump_html
            .then(|| RawDump::new(store.clone(), store.root().join(DUMP_DIR)));
        let throttler = RequestThrottler::new(fetcher, &config.throttle, dump)?;

        Ok(Self {
            throttler,
            parser,
            store,
            site: Site::new(&config.site),
            stats: RunStats::new(),
        })
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Counters for everything done so far
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Crawls listing pages `first..=last` and every chapter they list
    ///
    /// Without `last`, page 1 is fetched to find the last page, and its
    /// markup is reused when the range starts at page 1. Pages are queued
    /// last page first; the returned stories are in page order.
    ///
    /// # Errors
    ///
    /// Fails before any request when `first` is 0 or greater than `last`,
    /// and otherwise on the first fetch, parse or storage failure.
    pub async fn get_pages(&self, first: u32, last: Option<u32>) -> Result<Vec<Story>> {
        if first == 0 {
            return Err(ScrapeError::InvalidPage(first));
        }
        if let Some(last) = last {
            if first > last {
                return Err(ScrapeError::PageOrder { first, last });
            }
        }

        let (mut first_html, last) = match last {
            Some(last) => (None, last),
            None => {
                let (html, last) = self.last_page(ListingSort::Published).await?;
                ((first == 1).then_some(html), last)
            }
        };
        if first > last {
            return Err(ScrapeError::PageOrder { first, last });
        }

        tracing::info!("Getting pages. [{}, {}]", first, last);
        let pages = try_join_all((first..=last).rev().map(|page| {
            let html = if page == first { first_html.take() } else { None };
            self.process_page(page, ListingSort::Published, html)
        }))
        .await?;

        let stories: Vec<Story> = pages.into_iter().rev().flatten().collect();
        tracing::info!(
            "Got pages. [{}, {}] (stories={})",
            first,
            last,
            stories.len()
        );
        Ok(stories)
    }

    /// Fetches one listing page, stores its stories and fetches their
    /// missing chapters
    pub async fn get_page(&self, page: u32, sort: ListingSort) -> Result<Vec<Story>> {
        self.process_page(page, sort, None).await
    }

    /// [`Self::get_page`] on markup already fetched, when there is some
    async fn process_page(
        &self,
        page: u32,
        sort: ListingSort,
        html: Option<String>,
    ) -> Result<Vec<Story>> {
        tracing::debug!("Getting page. ({})", page);
        let (url, html) = self.page_html(page, sort, html).await?;
        let stories = self.parse_listing(&url, &html)?;

        try_join_all(stories.iter().map(|story| async move {
            self.write_story(story).await?;
            self.get_chapters(story, true).await
        }))
        .await?;

        tracing::debug!("Got page. ({} stories={})", page, stories.len());
        Ok(stories)
    }

    /// Fetches one chapter and stores it
    ///
    /// With `skip_if_exists`, a chapter already stored is not fetched at all.
    /// A fetched chapter that differs from the stored one moves the stored
    /// file aside as the next version before the new one is written. Calls
    /// for the same chapter take turns, so a story listed twice in one crawl
    /// is fetched once and then skipped.
    pub async fn get_chapter(
        &self,
        story_id: u64,
        chapter: u32,
        skip_if_exists: bool,
    ) -> Result<ChapterOutcome> {
        let _guard = self.store.lock_chapter(story_id, chapter).await;

        if skip_if_exists && self.store.chapter_exists(story_id, chapter).await? {
            tracing::trace!("Skipping stored chapter. ({}/{})", story_id, chapter);
            self.stats.chapter_skipped();
            return Ok(ChapterOutcome::Skipped);
        }

        let url = self.site.chapter_url(story_id, chapter);
        tracing::debug!("Getting chapter. ({}/{})", story_id, chapter);
        let html = self.throttler.fetch(url.as_str(), Priority::Urgent).await?;
        self.stats.chapter_fetched();

        let content = self
            .parser
            .parse_chapter(&html)
            .map_err(|source| ScrapeError::Parse { url, source })?;

        let outcome = match self.store.read_chapter(story_id, chapter).await? {
            Some(stored) if stored == content => {
                self.stats.chapter_unchanged();
                return Ok(ChapterOutcome::Unchanged);
            }
            Some(_) => {
                let version = self.store.rotate_chapter(story_id, chapter).await?;
                self.stats.version_rotated();
                ChapterOutcome::Rotated(version)
            }
            None => ChapterOutcome::Written,
        };

        self.store.write_chapter(story_id, chapter, &content).await?;
        tracing::debug!("Got chapter. ({}/{} {:?})", story_id, chapter, outcome);
        Ok(outcome)
    }

    /// Fetches every chapter missing from the stories already stored
    pub async fn get_chapters_from_existing(&self) -> Result<usize> {
        let stories = self.store.read_all_stories().await?;
        tracing::info!(
            "Getting missing chapters. (stories={} chapters={})",
            stories.len(),
            stories.iter().map(|s| s.last_chapter as u64).sum::<u64>()
        );

        try_join_all(stories.iter().map(|story| self.get_chapters(story, true))).await?;
        Ok(stories.len())
    }

    /// Walks the listing newest-update first and refreshes what changed
    ///
    /// Stops after two unchanged pages in a row, or at the last page.
    /// Returns the number of listing pages processed.
    pub async fn update_existing(&self) -> Result<u32> {
        let (first_html, last_page) = self.last_page(ListingSort::Updated).await?;
        tracing::info!("Updating stories. (lastPage={})", last_page);

        let mut state = ScanState::Scanning;
        let mut pending_html = Some(first_html);
        let mut page = 1;

        loop {
            let changed = self.update_page(page, pending_html.take()).await?;
            state = state.advance(changed);
            tracing::info!(
                "Updated page. (page={} changed={} state={})",
                page,
                changed,
                state
            );

            if state.is_done() || page >= last_page {
                break;
            }
            page += 1;
        }

        Ok(page)
    }

    /// Fetches page 1 in `sort` order, returning its markup and the last page
    async fn last_page(&self, sort: ListingSort) -> Result<(String, u32)> {
        let url = self.site.page_url(1, sort);
        let html = self.throttler.fetch(url.as_str(), Priority::Normal).await?;
        let last = self
            .parser
            .parse_last_page(&html)
            .map_err(|source| ScrapeError::Parse { url, source })?;
        tracing::debug!("Resolved last page. ({})", last);
        Ok((html, last))
    }

    /// URL of a listing page and its markup, fetched unless already given
    async fn page_html(
        &self,
        page: u32,
        sort: ListingSort,
        html: Option<String>,
    ) -> Result<(String, String)> {
        let url = self.site.page_url(page, sort);
        let html = match html {
            Some(html) => html,
            None => self.throttler.fetch(url.as_str(), Priority::Normal).await?,
        };
        Ok((url, html))
    }

    /// Processes one page of an update run; true when any story on it changed
    async fn update_page(&self, page: u32, html: Option<String>) -> Result<bool> {
        let (url, html) = self.page_html(page, ListingSort::Updated, html).await?;
        let stories = self.parse_listing(&url, &html)?;

        let updates = try_join_all(stories.iter().map(|story| self.update_story(story))).await?;
        Ok(updates.iter().any(StoryUpdate::is_change))
    }

    async fn update_story(&self, fresh: &Story) -> Result<StoryUpdate> {
        let stored = self.store.read_story(fresh.id).await?;
        let update = StoryUpdate::classify(stored.as_ref(), fresh);
        tracing::debug!("Classified story. ({} {:?})", fresh.id, update);

        self.write_story(fresh).await?;
        match update {
            StoryUpdate::New => {
                self.stats.story_changed();
                self.get_chapters(fresh, true).await?;
            }
            StoryUpdate::Unchanged => self.stats.story_unchanged(),
            StoryUpdate::Changed { refetch_all } => {
                self.stats.story_changed();
                self.get_chapters(fresh, !refetch_all).await?;
            }
        }

        Ok(update)
    }

    async fn get_chapters(&self, story: &Story, skip_if_exists: bool) -> Result<()> {
        try_join_all(
            story
                .chapter_ordinals()
                .map(|chapter| self.get_chapter(story.id, chapter, skip_if_exists)),
        )
        .await?;
        Ok(())
    }

    async fn write_story(&self, story: &Story) -> Result<()> {
        self.store.write_story(story).await?;
        self.stats.story_written();
        Ok(())
    }

    fn parse_listing(&self, url: &str, html: &str) -> Result<Vec<Story>> {
        let stories = self
            .parser
            .parse_listing_page(html)
            .map_err(|source| ScrapeError::Parse {
                url: url.to_string(),
                source,
            })?;
        self.stats.page();
        Ok(stories)
    }
}
