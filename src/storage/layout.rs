//! File naming inside a run directory
//!
//! ```text
//! <root>/story.<id>/story.json              story metadata
//! <root>/story.<id>/chapter.0001.json       latest chapter content
//! <root>/story.<id>/chapter.0001.v1.json    older chapter versions
//! ```

use std::path::PathBuf;

/// Name of the story metadata file inside a story directory
pub const STORY_FILE: &str = "story.json";

/// Directory holding everything for one story, relative to the run root
pub fn story_dir(story_id: u64) -> PathBuf {
    PathBuf::from(format!("story.{}", story_id))
}

/// Relative path of a story's metadata file
pub fn story_file(story_id: u64) -> PathBuf {
    story_dir(story_id).join(STORY_FILE)
}

/// Canonical file name of a chapter
pub fn chapter_file_name(chapter: u32) -> String {
    format!("chapter.{:04}.json", chapter)
}

/// Relative path of a chapter's canonical file
pub fn chapter_file(story_id: u64, chapter: u32) -> PathBuf {
    story_dir(story_id).join(chapter_file_name(chapter))
}

/// Relative path of a rotated chapter version
pub fn chapter_version_file(story_id: u64, chapter: u32, version: u32) -> PathBuf {
    story_dir(story_id).join(format!("chapter.{:04}.v{}.json", chapter, version))
}

/// Version number of `file_name` if it is a rotated version of `chapter`
pub fn parse_version(file_name: &str, chapter: u32) -> Option<u32> {
    let prefix = format!("chapter.{:04}.v", chapter);
    file_name
        .strip_prefix(&prefix)?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

/// Chapter ordinal of `file_name` if it is a canonical chapter file
pub fn parse_canonical_chapter(file_name: &str) -> Option<u32> {
    let digits = file_name.strip_prefix("chapter.")?.strip_suffix(".json")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
