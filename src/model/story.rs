use serde::{Deserialize, Serialize};

/// Story author as shown on the listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: Option<u64>,
    pub username: Option<String>,
}

/// A field that could not be extracted from a listing row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Story metadata parsed from one listing row
///
/// Stored whole as `story.<id>/story.json`; a re-fetch always replaces the
/// previous record rather than patching it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: u64,
    pub title: Option<String>,
    pub author: Author,
    pub summary: Option<String>,
    pub rating: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<Vec<String>>,
    pub words: Option<u64>,
    pub reviews: Option<u64>,
    pub faves: Option<u64>,
    pub follows: Option<u64>,
    /// Unix seconds
    pub published: Option<i64>,
    /// Unix seconds; listing pages sorted by update order on this
    pub updated: Option<i64>,
    /// Unix seconds at which the listing row was parsed
    pub cached: i64,
    #[serde(default)]
    pub complete: bool,
    pub last_chapter: u32,
    #[serde(default)]
    pub errors: Vec<FieldError>,
}

impl Story {
    /// A story with only identity filled in
    pub fn new(id: u64, cached: i64) -> Self {
        Self {
            id,
            title: None,
            author: Author::default(),
            summary: None,
            rating: None,
            language: None,
            genres: Vec::new(),
            characters: Vec::new(),
            relationships: Vec::new(),
            words: None,
            reviews: None,
            faves: None,
            follows: None,
            published: None,
            updated: None,
            cached,
            complete: false,
            last_chapter: 1,
            errors: Vec::new(),
        }
    }

    /// Whether a freshly parsed row describes new content compared to this one
    ///
    /// Only the update time and word count matter; review and favourite
    /// counters move constantly without the text changing.
    pub fn content_differs(&self, fresh: &Story) -> bool {
        self.updated != fresh.updated || self.words != fresh.words
    }

    /// Ordinals of every chapter, `1..=last_chapter`
    pub fn chapter_ordinals(&self) -> std::ops::RangeInclusive<u32> {
        1..=self.last_chapter
    }
}
