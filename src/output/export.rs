//! Export of a run into flat files
//!
//! An export turns a run's story tree into:
//! - `stories.json`: every stored story, one JSON record per line
//! - `chapters/<id>.json`: the canonical chapters of one story, in order
//!
//! Older chapter versions are left out.

use crate::storage::{ContentStore, StorageError, StorageResult};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Totals of a finished export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub stories: usize,
    pub chapters: usize,
    pub bytes: u64,
}

/// Exports the run stored in `source` into `dest`
///
/// # Arguments
///
/// * `source` - The run's content store
/// * `dest` - Directory receiving `stories.json` and `chapters/`
///
/// # Returns
///
/// * `Ok(ExportSummary)` - Counts of what was written
/// * `Err(StorageError)` - A record could not be read or a file written
pub async fn export_run(source: &ContentStore, dest: &Path) -> StorageResult<ExportSummary> {
    let out = ContentStore::new(dest);
    let mut summary = ExportSummary::default();

    let stories = source.read_all_stories().await?;
    tracing::info!("Exporting stories. (stories={})", stories.len());

    let stories_file = dest.join("stories.json");
    summary.bytes += write_records(&out, &stories_file, &stories).await?;
    summary.stories = stories.len();
    tracing::info!(
        "Wrote {} ({})",
        stories_file.display(),
        human_size(summary.bytes)
    );

    for (i, story) in stories.iter().enumerate() {
        let mut chapters = Vec::new();
        for ordinal in source.list_chapters(story.id).await? {
            if let Some(chapter) = source.read_chapter(story.id, ordinal).await? {
                chapters.push(chapter);
            }
        }

        let file = chapters_file(dest, story.id);
        let bytes = write_records(&out, &file, &chapters).await?;
        tracing::debug!(
            "Exported chapters. ({} {}/{} chapters={} size={})",
            story.id,
            i + 1,
            stories.len(),
            chapters.len(),
            human_size(bytes)
        );
        summary.chapters += chapters.len();
        summary.bytes += bytes;
    }

    tracing::info!(
        "Export finished. (stories={} chapters={} size={})",
        summary.stories,
        summary.chapters,
        human_size(summary.bytes)
    );
    Ok(summary)
}

fn chapters_file(dest: &Path, story_id: u64) -> PathBuf {
    dest.join("chapters").join(format!("{}.json", story_id))
}

/// Writes a JSON array with one compact record per line
async fn write_records<T: Serialize>(
    out: &ContentStore,
    path: &Path,
    records: &[T],
) -> StorageResult<u64> {
    let body = format_records(records).map_err(|e| StorageError::json(path, e))?;
    out.write_raw(path, body.as_bytes()).await?;
    Ok(body.len() as u64)
}

fn format_records<T: Serialize>(records: &[T]) -> serde_json::Result<String> {
    let lines = records
        .iter()
        .map(serde_json::to_string)
        .collect::<serde_json::Result<Vec<_>>>()?;
    Ok(format!("[{}]\n", lines.join(",\n")))
}

/// Formats a byte count with binary multiples: `512B`, `1.5K`, `3.0M`
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["K", "M", "G", "T"];

    if bytes < 1024 {
        return format!("{}B", bytes);
    }

    let mut size = bytes as f64;
    let mut unit = UNITS[0];
    for next in UNITS {
        size /= 1024.0;
        unit = next;
        if size < 1024.0 {
            break;
        }
    }
    format!("{:.1}{}", size, unit)
}
