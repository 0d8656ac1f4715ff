//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the archive and drive full
//! crawls, chapter fills and incremental updates end-to-end through the
//! real HTTP fetcher and markup parser.

use ff_scrape::config::{Config, ThrottleConfig};
use ff_scrape::crawler::{ChapterOutcome, HttpFetcher};
use ff_scrape::{ContentStore, Coordinator, FfnParser, ScrapeError, Story};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server, with no delays
fn create_test_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.site.base_url = server.uri();
    config.throttle = ThrottleConfig::immediate();
    config
}

fn create_coordinator(config: &Config, temp: &TempDir) -> Coordinator {
    let fetcher = HttpFetcher::from_config(&config.user_agent).expect("Failed to build client");
    Coordinator::with_parts(
        config,
        ContentStore::new(temp.path()),
        Arc::new(fetcher),
        Arc::new(FfnParser::new()),
    )
    .expect("Failed to create coordinator")
}

/// One listing row as the archive renders it
fn story_row(id: u64, chapters: u32, updated: i64, words: u64) -> String {
    format!(
        r#"<div class="z-list zhover zpointer">
            <a class="stitle" href="/s/{id}/1/Story-{id}">Story {id}</a>
            by <a href="/u/1/author">author</a>
            <div class="z-indent z-padtop">Summary of {id}.
                <div class="z-padtop2 xgray">Rated: T - English - Drama - Chapters: {chapters} - Words: {words} - Reviews: 1 - Updated: <span data-xutime="{updated}">Jan 2</span> - Published: <span data-xutime="1400000000">Jan 1</span> - Ruby R.</div>
            </div>
        </div>"#
    )
}

fn listing_page(rows: &[String], last_page: u32) -> String {
    format!(
        r#"<html><body><div id="content">{}</div>
        <center><a href="/anime/RWBY/?srt=1&amp;r=10&amp;p=2">2</a>
        <a href="/anime/RWBY/?srt=1&amp;r=10&amp;p={last_page}">Last</a></center>
        </body></html>"#,
        rows.concat()
    )
}

fn chapter_page(text: &str) -> String {
    format!(
        r#"<html><body>
        <select id="chap_select"><option value="1" selected>1. Chapter</option></select>
        <div class="storytext"><p>{text}</p></div>
        </body></html>"#
    )
}

fn stored_story(id: u64, chapters: u32, updated: i64, words: u64) -> Story {
    let mut story = Story::new(id, 0);
    story.last_chapter = chapters;
    story.updated = Some(updated);
    story.words = Some(words);
    story
}

async fn mount_listing(server: &MockServer, sort: &str, page: u32, body: String, times: u64) {
    Mock::given(method("GET"))
        .and(path("/anime/RWBY/"))
        .and(query_param("srt", sort))
        .and(query_param("p", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(times)
        .mount(server)
        .await;
}

async fn mount_chapter(server: &MockServer, id: u64, chapter: u32, body: String, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/s/{}/{}", id, chapter)))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(times)
        .mount(server)
        .await;
}

async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .expect("Request recording is disabled")
        .len()
}

#[tokio::test]
async fn test_single_page_crawl() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    mount_listing(
        &server,
        "2",
        5,
        listing_page(&[story_row(11, 1, 1600000000, 100), story_row(22, 1, 1600000001, 200)], 9),
        1,
    )
    .await;
    mount_chapter(&server, 11, 1, chapter_page("eleven"), 1).await;
    mount_chapter(&server, 22, 1, chapter_page("twenty-two"), 1).await;

    let config = create_test_config(&server);
    let coordinator = create_coordinator(&config, &temp);
    let stories = coordinator
        .get_pages(5, Some(5))
        .await
        .expect("Crawl failed");

    assert_eq!(stories.len(), 2);
    assert_eq!(request_count(&server).await, 3);
    for id in [11, 22] {
        assert!(temp.path().join(format!("story.{id}/story.json")).is_file());
        assert!(temp
            .path()
            .join(format!("story.{id}/chapter.0001.json"))
            .is_file());
    }

    let stored = coordinator
        .store()
        .read_story(22)
        .await
        .expect("Failed to read story")
        .expect("Story was not stored");
    assert_eq!(stored.words, Some(200));
    assert_eq!(stored.title.as_deref(), Some("Story 22"));
}

#[tokio::test]
async fn test_inverted_range_makes_no_requests() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    let config = create_test_config(&server);
    let coordinator = create_coordinator(&config, &temp);
    let result = coordinator.get_pages(6, Some(3)).await;

    assert!(matches!(
        result,
        Err(ScrapeError::PageOrder { first: 6, last: 3 })
    ));
    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn test_skip_if_exists_fetches_once() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");
    mount_chapter(&server, 7, 3, chapter_page("three"), 1).await;

    let config = create_test_config(&server);
    let coordinator = create_coordinator(&config, &temp);

    let first = coordinator.get_chapter(7, 3, true).await.expect("Fetch failed");
    let second = coordinator.get_chapter(7, 3, true).await.expect("Fetch failed");

    assert_eq!(first, ChapterOutcome::Written);
    assert_eq!(second, ChapterOutcome::Skipped);
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn test_changed_refetches_keep_every_version() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&server);
    let coordinator = create_coordinator(&config, &temp);

    for (i, text) in ["draft", "edit", "final"].iter().enumerate() {
        server.reset().await;
        mount_chapter(&server, 4, 1, chapter_page(text), 1).await;
        let outcome = coordinator.get_chapter(4, 1, false).await.expect("Fetch failed");
        if i == 0 {
            assert_eq!(outcome, ChapterOutcome::Written);
        } else {
            assert_eq!(outcome, ChapterOutcome::Rotated(i as u32));
        }
    }

    let dir = temp.path().join("story.4");
    let mut files: Vec<_> = std::fs::read_dir(&dir)
        .expect("Failed to list story dir")
        .map(|e| e.expect("Bad entry").file_name().into_string().expect("Bad name"))
        .collect();
    files.sort();
    assert_eq!(
        files,
        vec!["chapter.0001.json", "chapter.0001.v1.json", "chapter.0001.v2.json"]
    );

    let canonical = std::fs::read_to_string(dir.join("chapter.0001.json")).expect("Missing file");
    assert!(canonical.contains("final"));
    let oldest = std::fs::read_to_string(dir.join("chapter.0001.v1.json")).expect("Missing file");
    assert!(oldest.contains("draft"));
}

#[tokio::test]
async fn test_update_stops_after_lookahead() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");
    let store = ContentStore::new(temp.path());

    // Stories already on disk from an earlier run
    for story in [
        stored_story(201, 1, 1500000200, 2000),
        stored_story(301, 2, 1500000300, 3000),
        stored_story(401, 1, 1500000400, 4000),
        stored_story(501, 1, 1500000500, 5000),
    ] {
        store.write_story(&story).await.expect("Failed to seed story");
    }
    store
        .write_chapter(301, 1, &Default::default())
        .await
        .expect("Failed to seed chapter");

    // changed, unchanged, changed, unchanged, unchanged
    mount_listing(&server, "1", 1, listing_page(&[story_row(101, 1, 1600000100, 1000)], 8), 1)
        .await;
    mount_listing(&server, "1", 2, listing_page(&[story_row(201, 1, 1500000200, 2000)], 8), 1)
        .await;
    mount_listing(&server, "1", 3, listing_page(&[story_row(301, 2, 1600000300, 3500)], 8), 1)
        .await;
    mount_listing(&server, "1", 4, listing_page(&[story_row(401, 1, 1500000400, 4000)], 8), 1)
        .await;
    mount_listing(&server, "1", 5, listing_page(&[story_row(501, 1, 1500000500, 5000)], 8), 1)
        .await;
    mount_listing(&server, "1", 6, listing_page(&[], 8), 0).await;

    mount_chapter(&server, 101, 1, chapter_page("new story"), 1).await;
    mount_chapter(&server, 301, 1, chapter_page("unchanged count"), 0).await;
    mount_chapter(&server, 301, 2, chapter_page("new chapter"), 1).await;

    let config = create_test_config(&server);
    let coordinator = create_coordinator(&config, &temp);
    let pages = coordinator.update_existing().await.expect("Update failed");

    assert_eq!(pages, 5);
    let stats = coordinator.stats();
    assert_eq!(stats.stories_changed, 2);
    assert_eq!(stats.stories_unchanged, 3);
    assert_eq!(stats.chapters_fetched, 2);

    let updated = store
        .read_story(301)
        .await
        .expect("Failed to read story")
        .expect("Story was not stored");
    assert_eq!(updated.words, Some(3500));
    // Wiremock verifies the page 6 and chapter expectations on drop
}

#[tokio::test]
async fn test_update_with_new_chapter_refetches_all() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");
    let store = ContentStore::new(temp.path());

    store
        .write_story(&stored_story(71, 1, 1500000000, 700))
        .await
        .expect("Failed to seed story");
    store
        .write_chapter(71, 1, &Default::default())
        .await
        .expect("Failed to seed chapter");

    mount_listing(&server, "1", 1, listing_page(&[story_row(71, 2, 1600000000, 900)], 1), 1)
        .await;
    mount_chapter(&server, 71, 1, chapter_page("rewritten"), 1).await;
    mount_chapter(&server, 71, 2, chapter_page("brand new"), 1).await;

    let config = create_test_config(&server);
    let coordinator = create_coordinator(&config, &temp);
    assert_eq!(coordinator.update_existing().await.expect("Update failed"), 1);

    let stats = coordinator.stats();
    assert_eq!(stats.stories_changed, 1);
    assert_eq!(stats.chapters_fetched, 2);
    assert_eq!(stats.versions_rotated, 1);

    let dir = temp.path().join("story.71");
    let canonical = std::fs::read_to_string(dir.join("chapter.0001.json")).expect("Missing file");
    assert!(canonical.contains("rewritten"));
    assert!(dir.join("chapter.0001.v1.json").is_file());
    let second = std::fs::read_to_string(dir.join("chapter.0002.json")).expect("Missing file");
    assert!(second.contains("brand new"));
    assert_eq!(store.list_chapters(71).await.expect("Failed to list"), vec![1, 2]);
}

#[tokio::test]
async fn test_update_stops_at_last_page() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    mount_listing(&server, "1", 1, listing_page(&[story_row(1, 1, 1600000000, 10)], 2), 1).await;
    mount_listing(&server, "1", 2, listing_page(&[story_row(2, 1, 1600000000, 10)], 2), 1).await;
    mount_listing(&server, "1", 3, listing_page(&[], 2), 0).await;
    mount_chapter(&server, 1, 1, chapter_page("one"), 1).await;
    mount_chapter(&server, 2, 1, chapter_page("two"), 1).await;

    let config = create_test_config(&server);
    let coordinator = create_coordinator(&config, &temp);

    assert_eq!(coordinator.update_existing().await.expect("Update failed"), 2);
}

#[tokio::test]
async fn test_flaky_server_is_retried() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/s/8/1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_chapter(&server, 8, 1, chapter_page("eventually"), 1).await;

    let config = create_test_config(&server);
    let coordinator = create_coordinator(&config, &temp);
    let outcome = coordinator.get_chapter(8, 1, true).await.expect("Fetch failed");

    assert_eq!(outcome, ChapterOutcome::Written);
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn test_failure_ceiling_stops_all_requests() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&server)
        .await;

    let mut config = create_test_config(&server);
    config.throttle.failure_ceiling = 3;
    let coordinator = create_coordinator(&config, &temp);

    // The second failure reaches the ceiling before the third attempt
    let first = coordinator.get_chapter(1, 1, true).await;
    assert!(matches!(first, Err(ScrapeError::Fetch(_))));
    assert_eq!(request_count(&server).await, 2);

    let second = coordinator.get_chapter(1, 2, true).await;
    match second {
        Err(ScrapeError::Fetch(e)) => assert!(e.url.ends_with("/s/1/2")),
        other => panic!("expected a fetch error, got {:?}", other.map(|_| ())),
    }
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn test_dump_mode_keeps_raw_responses() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    mount_listing(&server, "2", 1, listing_page(&[story_row(3, 1, 1600000000, 10)], 1), 1).await;
    mount_chapter(&server, 3, 1, chapter_page("dumped"), 1).await;

    let mut config = create_test_config(&server);
    config.output.dump_html = true;
    let coordinator = create_coordinator(&config, &temp);
    coordinator
        .get_pages(1, Some(1))
        .await
        .expect("Crawl failed");

    let dump_dir = temp.path().join("dump");
    let chapter_dump = dump_dir.join(ff_scrape::site::dump_file_name(&format!(
        "{}/s/3/1",
        server.uri()
    )));
    let body = std::fs::read_to_string(chapter_dump).expect("Chapter was not dumped");
    assert_eq!(body, chapter_page("dumped"));
    assert_eq!(
        std::fs::read_dir(&dump_dir).expect("No dump dir").count(),
        2
    );
}

#[tokio::test]
async fn test_chapters_from_existing_run() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");
    let store = ContentStore::new(temp.path());
    store
        .write_story(&stored_story(12, 2, 1600000000, 10))
        .await
        .expect("Failed to seed story");
    store
        .write_chapter(12, 1, &Default::default())
        .await
        .expect("Failed to seed chapter");

    mount_chapter(&server, 12, 1, chapter_page("one"), 0).await;
    mount_chapter(&server, 12, 2, chapter_page("two"), 1).await;

    let config = create_test_config(&server);
    let coordinator = create_coordinator(&config, &temp);
    let stories = coordinator
        .get_chapters_from_existing()
        .await
        .expect("Chapter fill failed");

    assert_eq!(stories, 1);
    assert_eq!(
        store.list_chapters(12).await.expect("Failed to list"),
        vec![1, 2]
    );
}
