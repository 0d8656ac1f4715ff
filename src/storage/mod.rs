//! Storage module for persisting crawl data
//!
//! This module handles the run's JSON file tree, including:
//! - Story and chapter records in a fixed layout
//! - Version rotation of changed chapters
//! - Memoized directory creation shared by concurrent writers
//! - Per-path locks so concurrent writers of one chapter take turns
//! - Sorted recursive listing of stored stories

mod dirs;
mod error;
pub mod layout;
mod locks;
mod store;

pub use dirs::DirCache;
pub use error::{StorageError, StorageResult};
pub use locks::PathLocks;
pub use store::ContentStore;

use std::path::{Path, PathBuf};

/// Name of the raw-dump directory inside a run directory
pub const DUMP_DIR: &str = "dump";

/// Directory holding one run's records
pub fn run_root(out_dir: &Path, key: &str) -> PathBuf {
    out_dir.join(key)
}

/// Generates a fresh run key
pub fn new_run_key() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_keys_are_unique() {
        let a = new_run_key();
        let b = new_run_key();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_run_root() {
        assert_eq!(
            run_root(Path::new("./output"), "abc"),
            PathBuf::from("./output/abc")
        );
    }
}
