/// Incremental update scan states
///
/// Listing pages sorted by update recency are walked from page 1. Once a page
/// brings nothing new the scan could stop, but stories updated mid-scan can
/// shift across a page boundary, so one more page is read before stopping.
use std::fmt;

/// Represents where an incremental update scan is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanState {
    /// Pages are still yielding new or changed stories
    Scanning,

    /// The last page was unchanged; reading one more page to confirm
    LookingAhead,

    /// The scan has caught up (or ran out of pages)
    Done,
}

impl ScanState {
    /// Moves the scan forward after a page has been processed
    ///
    /// | State | Page | Next |
    /// |-------|------|------|
    /// | Scanning | changed | Scanning |
    /// | Scanning | unchanged | LookingAhead |
    /// | LookingAhead | changed | Scanning |
    /// | LookingAhead | unchanged | Done |
    /// | Done | any | Done |
    pub fn advance(self, page_changed: bool) -> Self {
        match (self, page_changed) {
            (Self::Done, _) => Self::Done,
            (_, true) => Self::Scanning,
            (Self::Scanning, false) => Self::LookingAhead,
            (Self::LookingAhead, false) => Self::Done,
        }
    }

    /// Returns true once no further pages should be read
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Short lowercase name for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scanning => "scanning",
            Self::LookingAhead => "looking_ahead",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
