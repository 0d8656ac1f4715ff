use crate::model::Story;

/// How a freshly listed story relates to what is already stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoryUpdate {
    /// Not on disk yet: store it and fetch every chapter
    New,

    /// Same update time and word count: rewrite metadata only
    Unchanged,

    /// Content moved on; `refetch_all` is set when the chapter count changed,
    /// otherwise only missing chapters are fetched
    Changed { refetch_all: bool },
}

impl StoryUpdate {
    /// Decides what an update run does with a listed story
    pub fn classify(stored: Option<&Story>, fresh: &Story) -> Self {
        match stored {
            None => Self::New,
            Some(stored) if !stored.content_differs(fresh) => Self::Unchanged,
            Some(stored) => Self::Changed {
                refetch_all: stored.last_chapter != fresh.last_chapter,
            },
        }
    }

    /// Whether this story makes its listing page count as changed
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}
