//! State module for incremental update runs
//!
//! # Components
//!
//! - `ScanState`: where an update scan is (scanning, looking ahead, done)
//! - `StoryUpdate`: what an update does with one listed story

mod scan_state;
mod story_update;

// Re-export main types
pub use scan_state::ScanState;
pub use story_update::StoryUpdate;
