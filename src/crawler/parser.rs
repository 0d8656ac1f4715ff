//! HTML parser for listing and chapter pages
//!
//! This module turns archive markup into records:
//! - Story rows from a listing page, one [`Story`] per `.z-list` row
//! - Formatted text lines from a chapter page
//! - The last page number from a listing page's pagination

use crate::model::{Align, Author, Chapter, FieldError, Fragment, Line, Story};
use regex::Regex;
use scraper::node::Element;
use scraper::{ElementRef, Html, Selector};
use std::str::FromStr;
use thiserror::Error;

/// Why markup could not be turned into a record
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("missing element `{0}`")]
    MissingElement(&'static str),

    #[error("invalid {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },

    #[error("invalid pattern `{pattern}`: {message}")]
    Pattern {
        pattern: &'static str,
        message: String,
    },
}

/// Markup parser the coordinator drives
///
/// Implementations are pure: the same markup always yields the same records,
/// apart from each story's `cached` time.
pub trait Parser: Send + Sync {
    /// Parses every story row of a listing page
    fn parse_listing_page(&self, html: &str) -> Result<Vec<Story>, ParseError>;

    /// Parses one chapter page
    fn parse_chapter(&self, html: &str) -> Result<Chapter, ParseError>;

    /// Finds the number of the last listing page
    fn parse_last_page(&self, html: &str) -> Result<u32, ParseError>;
}

/// Parser for FanFiction.net markup
#[derive(Debug, Clone, Copy, Default)]
pub struct FfnParser;

impl FfnParser {
    pub fn new() -> Self {
        Self
    }
}

impl Parser for FfnParser {
    fn parse_listing_page(&self, html: &str) -> Result<Vec<Story>, ParseError> {
        let document = Html::parse_document(html);
        let rows = selector(".z-list")?;
        let cached = chrono::Utc::now().timestamp();

        let mut stories = Vec::new();
        for row in document.select(&rows) {
            match parse_row(row, cached) {
                Ok(story) => stories.push(story),
                Err(e) => tracing::warn!("Dropping listing row: {}", e),
            }
        }

        tracing::debug!(
            "Parsed stories. (stories={} chapters={})",
            stories.len(),
            stories.iter().map(|s| s.last_chapter as u64).sum::<u64>()
        );
        Ok(stories)
    }

    fn parse_chapter(&self, html: &str) -> Result<Chapter, ParseError> {
        let document = Html::parse_document(html);

        let title = match document.select(&selector("#chap_select > option[selected]")?).next() {
            Some(option) => {
                let text = collapse(&option.text().collect::<String>());
                let ordinal = pattern(r"^\d+\.\s*")?;
                Some(ordinal.replace(&text, "").into_owned()).filter(|t| !t.is_empty())
            }
            None => None,
        };

        let body = document
            .select(&selector(".storytext")?)
            .next()
            .ok_or(ParseError::MissingElement(".storytext"))?;

        let content = body
            .children()
            .filter_map(ElementRef::wrap)
            .map(parse_line)
            .collect();

        Ok(Chapter { title, content })
    }

    fn parse_last_page(&self, html: &str) -> Result<u32, ParseError> {
        let document = Html::parse_document(html);
        let links = selector("a[href*=\"p=\"]")?;
        let page_param = pattern(r"[?&]p=(\d+)")?;

        let mut highest = None;
        for link in document.select(&links) {
            let Some(page) = link
                .value()
                .attr("href")
                .and_then(|href| page_param.captures(href))
                .and_then(|c| c[1].parse::<u32>().ok())
            else {
                continue;
            };

            if link.text().collect::<String>().trim() == "Last" {
                return Ok(page);
            }
            highest = highest.max(Some(page));
        }

        Ok(highest.unwrap_or(1))
    }
}

fn selector(css: &'static str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::Pattern {
        pattern: css,
        message: e.to_string(),
    })
}

fn pattern(re: &'static str) -> Result<Regex, ParseError> {
    Regex::new(re).map_err(|e| ParseError::Pattern {
        pattern: re,
        message: e.to_string(),
    })
}

/// Collects the outcome of each field extraction
///
/// A failed field is left at its default and recorded in the story's
/// `errors`, so one malformed field never loses the whole row.
struct StoryBuilder {
    story: Story,
}

impl StoryBuilder {
    fn new(id: u64, cached: i64) -> Self {
        Self {
            story: Story::new(id, cached),
        }
    }

    fn field<T>(&mut self, field: &str, value: Result<T, ParseError>) -> Option<T> {
        match value {
            Ok(value) => Some(value),
            Err(e) => {
                self.story.errors.push(FieldError {
                    field: field.to_string(),
                    message: e.to_string(),
                });
                None
            }
        }
    }

    fn build(self) -> Story {
        self.story
    }
}

fn parse_row(row: ElementRef<'_>, cached: i64) -> Result<Story, ParseError> {
    let title_link = row
        .select(&selector(".stitle")?)
        .next()
        .ok_or(ParseError::MissingElement(".stitle"))?;
    let href = title_link.value().attr("href").unwrap_or_default();
    let id = pattern(r"^/s/(\d+)/")?
        .captures(href)
        .and_then(|c| c[1].parse::<u64>().ok())
        .ok_or_else(|| ParseError::InvalidValue {
            field: "id",
            value: href.to_string(),
        })?;

    let mut builder = StoryBuilder::new(id, cached);

    let title = collapse(&title_link.text().collect::<String>());
    builder.story.title = Some(title).filter(|t| !t.is_empty());

    if let Some(author) = builder.field("author", parse_author(row)) {
        builder.story.author = author;
    }
    builder.story.summary = builder.field("summary", parse_summary(row));

    match row.select(&selector(".z-padtop2.xgray")?).next() {
        Some(stats) => parse_stats(&mut builder, stats)?,
        None => {
            builder.field::<()>("stats", Err(ParseError::MissingElement(".z-padtop2.xgray")));
        }
    }

    Ok(builder.build())
}

fn parse_author(row: ElementRef<'_>) -> Result<Author, ParseError> {
    let link = row
        .select(&selector("a[href^=\"/u/\"]")?)
        .next()
        .ok_or(ParseError::MissingElement("a[href^=\"/u/\"]"))?;
    let href = link.value().attr("href").unwrap_or_default();
    let id = pattern(r"^/u/(\d+)")?
        .captures(href)
        .and_then(|c| c[1].parse::<u64>().ok())
        .ok_or_else(|| ParseError::InvalidValue {
            field: "author.id",
            value: href.to_string(),
        })?;

    Ok(Author {
        id: Some(id),
        username: Some(collapse(&link.text().collect::<String>())),
    })
}

/// The summary is the text directly inside the indent block; the stats line
/// is a child element and is left out
fn parse_summary(row: ElementRef<'_>) -> Result<String, ParseError> {
    let block = row
        .select(&selector(".z-indent.z-padtop")?)
        .next()
        .ok_or(ParseError::MissingElement(".z-indent.z-padtop"))?;

    let own_text: String = block
        .children()
        .filter_map(|node| node.value().as_text().map(|t| t.to_string()))
        .collect();
    Ok(collapse(&own_text))
}

fn parse_stats(builder: &mut StoryBuilder, stats: ElementRef<'_>) -> Result<(), ParseError> {
    let dates: Vec<_> = stats
        .select(&selector("span[data-xutime]")?)
        .map(|span| span.value().attr("data-xutime").unwrap_or_default().to_string())
        .collect();
    let updated = dates.first().map(|d| parse_number::<i64>("updated", d));
    let published = dates
        .get(1)
        .or(dates.first())
        .map(|d| parse_number::<i64>("published", d));
    builder.story.updated = match updated {
        Some(value) => builder.field("updated", value),
        None => builder.field("updated", Err(ParseError::MissingElement("span[data-xutime]"))),
    };
    builder.story.published = match published {
        Some(value) => builder.field("published", value),
        None => builder.field("published", Err(ParseError::MissingElement("span[data-xutime]"))),
    };

    let key_value = pattern(r"^(\w+): (.+)$")?;
    let text = collapse(&stats.text().collect::<String>());

    // Segments without a key are positional: language, genres, then the
    // character list once the counters have started
    let mut counters_seen = false;
    for (i, segment) in text.split(" - ").enumerate() {
        if let Some(captures) = key_value.captures(segment) {
            let value = &captures[2];
            match &captures[1] {
                "Rated" => builder.story.rating = Some(value.to_string()),
                "Chapters" => {
                    if let Some(n) = builder.field("lastChapter", parse_number("lastChapter", value)) {
                        builder.story.last_chapter = n;
                    }
                }
                "Words" => builder.story.words = builder.field("words", parse_number("words", value)),
                "Reviews" => {
                    builder.story.reviews = builder.field("reviews", parse_number("reviews", value))
                }
                "Favs" => builder.story.faves = builder.field("faves", parse_number("faves", value)),
                "Follows" => {
                    builder.story.follows = builder.field("follows", parse_number("follows", value))
                }
                _ => {}
            }
            if &captures[1] != "Rated" {
                counters_seen = true;
            }
            continue;
        }

        if segment == "Complete" {
            builder.story.complete = true;
        } else if i == 1 {
            builder.story.language = Some(segment.to_string());
        } else if !counters_seen {
            builder.story.genres = split_genres(segment);
        } else {
            let (characters, relationships) = split_characters(segment);
            builder.story.characters = characters;
            builder.story.relationships = relationships;
        }
    }

    Ok(())
}

/// Parses a counter such as `12,345`; a value out of range for `T` is invalid
fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T, ParseError> {
    value
        .replace(',', "")
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidValue {
            field,
            value: value.to_string(),
        })
}

/// Splits `Adventure/Hurt/Comfort` into `["Adventure", "Hurt/Comfort"]`
fn split_genres(segment: &str) -> Vec<String> {
    const HURT_COMFORT: &str = "Hurt/Comfort";
    segment
        .replace(HURT_COMFORT, "\u{0}")
        .split('/')
        .map(|g| g.replace('\u{0}', HURT_COMFORT).trim().to_string())
        .filter(|g| !g.is_empty())
        .collect()
}

/// Splits `[Ruby R., Weiss S.] Blake B.` into the sorted character list and
/// the bracketed pairings
fn split_characters(segment: &str) -> (Vec<String>, Vec<Vec<String>>) {
    let mut characters: Vec<String> = segment
        .split(['[', ']', ','])
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    characters.sort();

    let mut relationships = Vec::new();
    let mut rest = segment;
    while let Some(open) = rest.find('[') {
        let Some(len) = rest[open..].find(']') else {
            break;
        };
        let mut pairing: Vec<String> = rest[open + 1..open + len]
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        pairing.sort();
        relationships.push(pairing);
        rest = &rest[open + len + 1..];
    }

    (characters, relationships)
}

fn parse_line(element: ElementRef<'_>) -> Line {
    match element.value().name() {
        "p" => Line::Text {
            fragments: parse_paragraph(element),
        },
        "hr" => Line::HorizontalRule,
        _ => Line::Unknown,
    }
}

fn parse_paragraph(paragraph: ElementRef<'_>) -> Vec<Fragment> {
    let align = match style_value(paragraph.value(), "text-align").as_deref() {
        Some("center") => Align::Center,
        Some("right") => Align::Right,
        _ => Align::Left,
    };

    paragraph
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            if text.is_empty() {
                return None;
            }
            let mut fragment = Fragment {
                align,
                ..Fragment::plain(text.to_string())
            };
            // Every element between the text and its paragraph adds formatting
            for ancestor in node.ancestors() {
                if ancestor.id() == paragraph.id() {
                    break;
                }
                if let Some(element) = ancestor.value().as_element() {
                    apply_formatting(&mut fragment, element);
                }
            }
            Some(fragment)
        })
        .collect()
}

fn apply_formatting(fragment: &mut Fragment, element: &Element) {
    match element.name() {
        "strong" | "b" => fragment.bold = true,
        "em" | "i" => fragment.italic = true,
        "s" | "strike" | "del" => fragment.strike = true,
        "u" => fragment.underline = true,
        "span" => match style_value(element, "text-decoration").as_deref() {
            Some("line-through") => fragment.strike = true,
            Some("underline") => fragment.underline = true,
            _ => {}
        },
        _ => {}
    }
}

fn style_value(element: &Element, property: &str) -> Option<String> {
    element.attr("style")?.split(';').find_map(|declaration| {
        let (name, value) = declaration.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case(property)
            .then(|| value.trim().to_ascii_lowercase())
    })
}

/// Trims and collapses runs of whitespace to one space
fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
