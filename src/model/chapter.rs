use serde::{Deserialize, Serialize};

/// Horizontal alignment of a text fragment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

impl Align {
    fn is_left(&self) -> bool {
        matches!(self, Self::Left)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A run of text sharing the same formatting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub value: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub strike: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub underline: bool,
    #[serde(default, skip_serializing_if = "Align::is_left")]
    pub align: Align,
}

impl Fragment {
    /// Unformatted, left-aligned text
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }
}

/// One line of chapter content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Line {
    /// A paragraph of text fragments
    Text { fragments: Vec<Fragment> },
    /// A horizontal rule separating scenes
    HorizontalRule,
    /// Markup the parser does not model (lists, tables, ...)
    Unknown,
}

/// Parsed content of one chapter page
///
/// Stored as `story.<id>/chapter.<NNNN>.json`. Older versions of the same
/// chapter are kept beside it as `chapter.<NNNN>.v<N>.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: Option<String>,
    pub content: Vec<Line>,
}
