//! Run-scoped memo of directory creation
//!
//! Many chapter writes for the same story land at once. The first writer to a
//! directory creates it and every concurrent writer awaits that same creation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Single-flight `create_dir_all` keyed by path
#[derive(Debug, Default)]
pub struct DirCache {
    dirs: Mutex<HashMap<PathBuf, Arc<OnceCell<()>>>>,
    created: AtomicUsize,
}

impl DirCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures `dir` exists, creating it at most once per run
    ///
    /// A failed creation leaves the entry uninitialized so a later caller can
    /// try again.
    pub async fn ensure(&self, dir: &Path) -> std::io::Result<()> {
        let cell = {
            let mut dirs = self.dirs.lock().await;
            dirs.entry(dir.to_path_buf()).or_default().clone()
        };

        cell.get_or_try_init(|| async {
            tracing::debug!("Creating directory. (dir={})", dir.display());
            tokio::fs::create_dir_all(dir).await?;
            self.created.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Created directory. (dir={})", dir.display());
            Ok::<(), std::io::Error>(())
        })
        .await?;

        Ok(())
    }

    /// Number of directories this cache has created
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}
