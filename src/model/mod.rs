//! Record types persisted by the crawler
//!
//! A [`Story`] is one listing row; a [`Chapter`] is one parsed chapter page.
//! Both serialize to pretty-printed JSON files in the run's content store.

mod chapter;
mod story;

pub use chapter::{Align, Chapter, Fragment, Line};
pub use story::{Author, FieldError, Story};
