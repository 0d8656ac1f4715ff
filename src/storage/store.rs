//! Filesystem content store
//!
//! All records are pretty-printed UTF-8 JSON with a trailing newline. Writes
//! go to a sibling temporary file first and are renamed into place, so a
//! canonical file is always either the old record or the new one. Every write
//! gets its own temporary name, so writers of the same record never share one.

use crate::model::{Chapter, Story};
use crate::storage::dirs::DirCache;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::layout;
use crate::storage::locks::PathLocks;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::OwnedMutexGuard;

/// JSON file tree rooted at one run's directory
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
    dirs: Arc<DirCache>,
    locks: Arc<PathLocks>,
    temp_seq: Arc<AtomicU64>,
}

impl ContentStore {
    /// Creates a store rooted at `root`; nothing is created until the first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dirs: Arc::new(DirCache::new()),
            locks: Arc::new(PathLocks::new()),
            temp_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The run directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory memo shared with anything else writing under this run
    pub fn dirs(&self) -> Arc<DirCache> {
        Arc::clone(&self.dirs)
    }

    fn absolute(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    /// Sibling of `path` no other write of this store will use
    fn temp_path(&self, path: &Path) -> PathBuf {
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        let mut temp = path.as_os_str().to_owned();
        temp.push(format!(".{}.tmp", seq));
        PathBuf::from(temp)
    }

    async fn write_whole(&self, path: &Path, body: &[u8]) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            self.dirs
                .ensure(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }

        let temp = self.temp_path(path);
        fs::write(&temp, body)
            .await
            .map_err(|e| StorageError::io(&temp, e))?;
        if let Err(e) = fs::rename(&temp, path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(StorageError::io(path, e));
        }
        tracing::trace!("Wrote file. (file={} length={})", path.display(), body.len());
        Ok(())
    }

    // ===== Generic records =====

    /// Writes `value` as JSON to `relative`, replacing any previous file whole
    pub async fn write_json<T: Serialize>(&self, relative: &Path, value: &T) -> StorageResult<()> {
        let path = self.absolute(relative);
        let mut body =
            serde_json::to_string_pretty(value).map_err(|e| StorageError::json(&path, e))?;
        body.push('\n');
        self.write_whole(&path, body.as_bytes()).await
    }

    /// Reads the JSON record at `relative`, or `None` if there is no such file
    pub async fn read_json<T: DeserializeOwned>(&self, relative: &Path) -> StorageResult<Option<T>> {
        let path = self.absolute(relative);
        let body = match fs::read_to_string(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(&path, e)),
        };
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| StorageError::json(&path, e))
    }

    /// Whether a file exists at `relative`
    pub async fn exists(&self, relative: &Path) -> StorageResult<bool> {
        let path = self.absolute(relative);
        fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))
    }

    // ===== Stories =====

    pub async fn write_story(&self, story: &Story) -> StorageResult<()> {
        self.write_json(&layout::story_file(story.id), story).await
    }

    pub async fn read_story(&self, story_id: u64) -> StorageResult<Option<Story>> {
        self.read_json(&layout::story_file(story_id)).await
    }

    /// Relative paths of every stored `story.json`, sorted
    pub async fn list_story_files(&self) -> StorageResult<Vec<PathBuf>> {
        let mut files = self
            .walk(|name| name == layout::STORY_FILE)
            .await?;
        files.sort();
        Ok(files)
    }

    /// Every stored story, in sorted path order
    pub async fn read_all_stories(&self) -> StorageResult<Vec<Story>> {
        let mut stories = Vec::new();
        for file in self.list_story_files().await? {
            if let Some(story) = self.read_json(&file).await? {
                stories.push(story);
            }
        }
        Ok(stories)
    }

    // ===== Chapters =====

    /// Holds the canonical file of one chapter for the caller alone
    ///
    /// Readers and writers that compare, rotate and rewrite a chapter take
    /// this first so two of them never interleave.
    pub async fn lock_chapter(&self, story_id: u64, chapter: u32) -> OwnedMutexGuard<()> {
        self.locks
            .lock(&layout::chapter_file(story_id, chapter))
            .await
    }

    pub async fn chapter_exists(&self, story_id: u64, chapter: u32) -> StorageResult<bool> {
        self.exists(&layout::chapter_file(story_id, chapter)).await
    }

    pub async fn read_chapter(&self, story_id: u64, chapter: u32) -> StorageResult<Option<Chapter>> {
        self.read_json(&layout::chapter_file(story_id, chapter)).await
    }

    pub async fn write_chapter(&self, story_id: u64, chapter: u32, content: &Chapter) -> StorageResult<()> {
        self.write_json(&layout::chapter_file(story_id, chapter), content)
            .await
    }

    /// Canonical chapter ordinals stored for a story, ascending
    pub async fn list_chapters(&self, story_id: u64) -> StorageResult<Vec<u32>> {
        let dir = self.absolute(&layout::story_dir(story_id));
        let mut chapters: Vec<u32> = file_names(&dir)
            .await?
            .iter()
            .filter_map(|name| layout::parse_canonical_chapter(name))
            .collect();
        chapters.sort_unstable();
        Ok(chapters)
    }

    /// Version number the next rotation of a chapter will use
    ///
    /// One more than the highest existing version, so versions only ever grow
    /// even if an older version file was removed by hand.
    pub async fn next_chapter_version(&self, story_id: u64, chapter: u32) -> StorageResult<u32> {
        let dir = self.absolute(&layout::story_dir(story_id));
        let highest = file_names(&dir)
            .await?
            .iter()
            .filter_map(|name| layout::parse_version(name, chapter))
            .max()
            .unwrap_or(0);
        Ok(highest + 1)
    }

    /// Moves the canonical chapter file aside as the next version
    ///
    /// Returns the version number it was stored under.
    pub async fn rotate_chapter(&self, story_id: u64, chapter: u32) -> StorageResult<u32> {
        let version = self.next_chapter_version(story_id, chapter).await?;
        let from = self.absolute(&layout::chapter_file(story_id, chapter));
        let to = self.absolute(&layout::chapter_version_file(story_id, chapter, version));
        tracing::debug!(
            "Rotating chapter. (from={} to={})",
            from.display(),
            to.display()
        );
        fs::rename(&from, &to)
            .await
            .map_err(|e| StorageError::io(&from, e))?;
        Ok(version)
    }

    // ===== Raw files =====

    /// Writes raw bytes to an absolute path, creating its directory once
    pub async fn write_raw(&self, path: &Path, body: &[u8]) -> StorageResult<()> {
        self.write_whole(path, body).await
    }

    /// Recursive walk of the run directory, keeping files whose name matches
    async fn walk(&self, keep: impl Fn(&str) -> bool) -> StorageResult<Vec<PathBuf>> {
        let mut found = Vec::new();
        let mut stack = vec![self.root.clone()];

        while let Some(current) = stack.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                // A run that has not written anything yet is simply empty
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::io(&current, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::io(&current, e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StorageError::io(&path, e))?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file() && entry.file_name().to_str().is_some_and(&keep) {
                    if let Ok(relative) = path.strip_prefix(&self.root) {
                        found.push(relative.to_path_buf());
                    }
                }
            }
        }

        Ok(found)
    }
}

/// File names directly inside `dir`; a missing directory has none
async fn file_names(dir: &Path) -> StorageResult<Vec<String>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::io(dir, e)),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageError::io(dir, e))?
    {
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}
